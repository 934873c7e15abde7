//! Logging setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter for a verbosity level. `RUST_LOG` overrides it.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber. Logs go to stderr so stdout only carries
/// the per-job status lines.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use recompress_core::{run, CompressionJob};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run a skipped and a failing job under the filter for `verbose` and
    /// return everything logged.
    fn logged_batch(verbose: u8) -> String {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = dir.path().join("corrupt.png");
        std::fs::write(&corrupt, b"not a png").unwrap();
        let jobs = vec![
            CompressionJob::new(dir.path().join("missing.png")),
            CompressionJob::new(&corrupt),
        ];

        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new(default_directive(verbose)))
            .with(
                fmt::layer()
                    .with_writer(move || writer.clone())
                    .with_ansi(false)
                    .with_target(false),
            );

        let report = tracing::subscriber::with_default(subscriber, || run(&jobs));
        assert_eq!((report.skipped(), report.failed()), (1, 1));

        buffer.contents()
    }

    #[test]
    fn test_default_filter_leaves_job_lines_alone() {
        assert_eq!(logged_batch(0), "");
    }

    #[test]
    fn test_verbose_filter_shows_job_events() {
        let info = logged_batch(1);
        assert!(info.contains("source not found, skipping"));
        assert!(!info.contains("job failed"));

        let debug = logged_batch(2);
        assert!(debug.contains("job failed"));
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(0), "warn");
        assert_eq!(default_directive(1), "info");
        assert_eq!(default_directive(2), "debug");
        assert_eq!(default_directive(9), "debug");
    }
}
