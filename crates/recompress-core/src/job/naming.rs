//! Destination naming convention for compressed assets.

use std::path::{Path, PathBuf};

/// Prefix shared by every generated asset.
pub const COMPRESSED_PREFIX: &str = "compressed_";

/// Derive the conventional destination for `source` with the given extension.
///
/// `"dir/understairs carousel 2 image 1.jpeg"` becomes
/// `"dir/compressed_understairs_carousel_2_image_1.<extension>"`.
pub fn compressed_name(source: &Path, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let name = format!("{COMPRESSED_PREFIX}{}.{extension}", slug(&stem));

    match source.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Destination JPEG for an image source.
pub fn destination_for(source: &Path) -> PathBuf {
    compressed_name(source, "jpg")
}

fn slug(stem: &str) -> String {
    stem.replace(' ', "_")
}
