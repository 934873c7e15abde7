//! In-process fallback encoder linked against the FFmpeg libraries.
//!
//! Runs without any `ffmpeg` executable on `PATH`. Video is scaled into the
//! configured box and re-encoded as bitrate-capped H.264; the best audio
//! stream is re-encoded as AAC. Other streams are dropped.

use ffmpeg_next as ffmpeg;

use ffmpeg::codec::{self, Context as CodecContext};
use ffmpeg::format::{self, Pixel};
use ffmpeg::software::scaling::{context::Context as ScaleContext, flag::Flags};
use ffmpeg::util::frame::{audio::Audio as AudioFrame, video::Video as VideoFrame};
use ffmpeg::{decoder, encoder, filter, media, Dictionary, Packet, Rational};
use tracing::debug;

use super::{VideoEncoder, VideoError, VideoJob, VideoSettings};

/// Fallback backend: the bitrate-capped settings of the command-line
/// fallback, encoded through libavcodec.
#[derive(Debug, Clone)]
pub struct LibavEncoder {
    settings: VideoSettings,
}

impl LibavEncoder {
    pub fn new(settings: VideoSettings) -> Self {
        Self { settings }
    }

    fn transcode(&self, job: &VideoJob) -> Result<(), ffmpeg::Error> {
        ffmpeg::init()?;

        let mut ictx = format::input(&job.input)?;
        let mut octx = format::output(&job.output)?;

        let video_index = ictx
            .streams()
            .best(media::Type::Video)
            .map(|stream| stream.index())
            .ok_or(ffmpeg::Error::StreamNotFound)?;
        let audio_index = ictx
            .streams()
            .best(media::Type::Audio)
            .map(|stream| stream.index());

        let mut video = {
            let ist = ictx
                .stream(video_index)
                .ok_or(ffmpeg::Error::StreamNotFound)?;
            VideoLane::new(&ist, &mut octx, 0, &self.settings)?
        };
        let mut audio = match audio_index.and_then(|index| ictx.stream(index)) {
            Some(ist) => Some(AudioLane::new(&ist, &mut octx, 1, &self.settings)?),
            None => None,
        };

        octx.set_metadata(ictx.metadata().to_owned());
        let mut muxer_options = Dictionary::new();
        muxer_options.set("movflags", "+faststart");
        octx.write_header_with(muxer_options)?;

        // The muxer may pick its own time bases while writing the header.
        let video_time_base = stream_time_base(&octx, 0)?;
        let audio_time_base = if audio.is_some() {
            Some(stream_time_base(&octx, 1)?)
        } else {
            None
        };

        for (stream, packet) in ictx.packets() {
            let index = stream.index();
            if index == video_index {
                video.decode(&packet, &mut octx, video_time_base)?;
            } else if Some(index) == audio_index {
                if let (Some(lane), Some(time_base)) = (audio.as_mut(), audio_time_base) {
                    lane.decode(&packet, &mut octx, time_base)?;
                }
            }
        }

        video.finish(&mut octx, video_time_base)?;
        if let (Some(lane), Some(time_base)) = (audio.as_mut(), audio_time_base) {
            lane.finish(&mut octx, time_base)?;
        }

        octx.write_trailer()?;
        debug!(frames = video.frames, output = %job.output.display(), "libav encode finished");
        Ok(())
    }
}

impl VideoEncoder for LibavEncoder {
    fn name(&self) -> &str {
        "libav (bitrate-capped)"
    }

    fn is_available(&self) -> bool {
        ffmpeg::init().is_ok() && encoder::find(codec::Id::H264).is_some()
    }

    fn encode(&self, job: &VideoJob) -> Result<(), VideoError> {
        self.transcode(job).map_err(|e| VideoError::Backend {
            backend: self.name().to_string(),
            message: e.to_string(),
        })
    }
}

fn stream_time_base(
    octx: &format::context::Output,
    index: usize,
) -> Result<Rational, ffmpeg::Error> {
    octx.stream(index)
        .map(|stream| stream.time_base())
        .ok_or(ffmpeg::Error::StreamNotFound)
}

/// Largest even size that fits in `max_width`×`max_height` without
/// upscaling or changing the aspect ratio.
fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }

    let scale = (max_width as f64 / width as f64)
        .min(max_height as f64 / height as f64)
        .min(1.0);
    let even = |side: u32| {
        let scaled = (side as f64 * scale).round() as u32;
        (scaled & !1).max(2)
    };

    (even(width), even(height))
}

/// Decode, scale and re-encode the video stream.
struct VideoLane {
    ost_index: usize,
    input_time_base: Rational,
    decoder: decoder::Video,
    scaler: ScaleContext,
    encoder: encoder::Video,
    frames: u64,
}

impl VideoLane {
    fn new(
        ist: &format::stream::Stream,
        octx: &mut format::context::Output,
        ost_index: usize,
        settings: &VideoSettings,
    ) -> Result<Self, ffmpeg::Error> {
        let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);
        let decoder = CodecContext::from_parameters(ist.parameters())?
            .decoder()
            .video()?;

        let (width, height) = fit_within(
            decoder.width(),
            decoder.height(),
            settings.max_width,
            settings.max_height,
        );

        let codec = encoder::find(codec::Id::H264).ok_or(ffmpeg::Error::EncoderNotFound)?;
        let mut ost = octx.add_stream(codec)?;
        let mut video = CodecContext::new_with_codec(codec).encoder().video()?;

        let bit_rate = kbps(settings.fallback_video_bitrate_kbps);
        video.set_width(width);
        video.set_height(height);
        video.set_aspect_ratio(decoder.aspect_ratio());
        video.set_format(Pixel::YUV420P);
        video.set_frame_rate(decoder.frame_rate());
        video.set_time_base(ist.time_base());
        video.set_bit_rate(bit_rate);
        video.set_max_bit_rate(bit_rate);
        if global_header {
            video.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut options = Dictionary::new();
        options.set("preset", &settings.preset);
        options.set("crf", &settings.crf.to_string());
        options.set("threads", &settings.fallback_threads.to_string());
        let encoder = video.open_with(options)?;
        ost.set_parameters(&encoder);

        let scaler = ScaleContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::YUV420P,
            width,
            height,
            Flags::BICUBIC,
        )?;

        debug!(
            from = ?(decoder.width(), decoder.height()),
            to = ?(width, height),
            "libav video stream"
        );

        Ok(Self {
            ost_index,
            input_time_base: ist.time_base(),
            decoder,
            scaler,
            encoder,
            frames: 0,
        })
    }

    fn decode(
        &mut self,
        packet: &Packet,
        octx: &mut format::context::Output,
        ost_time_base: Rational,
    ) -> Result<(), ffmpeg::Error> {
        self.decoder.send_packet(packet)?;
        self.drain_decoder(octx, ost_time_base)
    }

    fn finish(
        &mut self,
        octx: &mut format::context::Output,
        ost_time_base: Rational,
    ) -> Result<(), ffmpeg::Error> {
        self.decoder.send_eof()?;
        self.drain_decoder(octx, ost_time_base)?;
        self.encoder.send_eof()?;
        self.drain_encoder(octx, ost_time_base)
    }

    fn drain_decoder(
        &mut self,
        octx: &mut format::context::Output,
        ost_time_base: Rational,
    ) -> Result<(), ffmpeg::Error> {
        let mut decoded = VideoFrame::empty();
        let mut scaled = VideoFrame::empty();

        while self.decoder.receive_frame(&mut decoded).is_ok() {
            self.scaler.run(&decoded, &mut scaled)?;
            scaled.set_pts(decoded.timestamp());
            scaled.set_kind(ffmpeg::picture::Type::None);
            self.encoder.send_frame(&scaled)?;
            self.frames += 1;
            self.drain_encoder(octx, ost_time_base)?;
        }
        Ok(())
    }

    fn drain_encoder(
        &mut self,
        octx: &mut format::context::Output,
        ost_time_base: Rational,
    ) -> Result<(), ffmpeg::Error> {
        let mut encoded = Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.ost_index);
            encoded.rescale_ts(self.input_time_base, ost_time_base);
            encoded.write_interleaved(octx)?;
        }
        Ok(())
    }
}

/// Decode the audio stream, resample it for AAC and re-encode it.
struct AudioLane {
    ost_index: usize,
    input_time_base: Rational,
    decoder: decoder::Audio,
    graph: filter::Graph,
    encoder: encoder::Audio,
}

impl AudioLane {
    fn new(
        ist: &format::stream::Stream,
        octx: &mut format::context::Output,
        ost_index: usize,
        settings: &VideoSettings,
    ) -> Result<Self, ffmpeg::Error> {
        let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);
        let decoder = CodecContext::from_parameters(ist.parameters())?
            .decoder()
            .audio()?;

        let codec = encoder::find(codec::Id::AAC).ok_or(ffmpeg::Error::EncoderNotFound)?;
        let capabilities = codec.audio()?;
        let mut ost = octx.add_stream(codec)?;
        let mut audio = CodecContext::new_with_codec(codec).encoder().audio()?;

        let channel_layout = capabilities
            .channel_layouts()
            .map(|layouts| layouts.best(decoder.channel_layout().channels()))
            .unwrap_or(ffmpeg::ChannelLayout::STEREO);
        let sample_format = capabilities
            .formats()
            .and_then(|mut formats| formats.next())
            .unwrap_or(format::Sample::F32(format::sample::Type::Planar));

        audio.set_rate(decoder.rate() as i32);
        audio.set_channel_layout(channel_layout);
        audio.set_format(sample_format);
        audio.set_bit_rate(kbps(settings.fallback_audio_bitrate_kbps));
        audio.set_time_base((1, decoder.rate() as i32));
        ost.set_time_base((1, decoder.rate() as i32));
        if global_header {
            audio.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let encoder = audio.open_as(codec)?;
        ost.set_parameters(&encoder);

        let graph = audio_graph(ist.time_base(), &decoder, &encoder)?;

        Ok(Self {
            ost_index,
            input_time_base: ist.time_base(),
            decoder,
            graph,
            encoder,
        })
    }

    fn decode(
        &mut self,
        packet: &Packet,
        octx: &mut format::context::Output,
        ost_time_base: Rational,
    ) -> Result<(), ffmpeg::Error> {
        self.decoder.send_packet(packet)?;
        self.drain_decoder(octx, ost_time_base)
    }

    fn finish(
        &mut self,
        octx: &mut format::context::Output,
        ost_time_base: Rational,
    ) -> Result<(), ffmpeg::Error> {
        self.decoder.send_eof()?;
        self.drain_decoder(octx, ost_time_base)?;
        self.graph
            .get("in")
            .ok_or(ffmpeg::Error::FilterNotFound)?
            .source()
            .flush()?;
        self.drain_graph(octx, ost_time_base)?;
        self.encoder.send_eof()?;
        self.drain_encoder(octx, ost_time_base)
    }

    fn drain_decoder(
        &mut self,
        octx: &mut format::context::Output,
        ost_time_base: Rational,
    ) -> Result<(), ffmpeg::Error> {
        let mut decoded = AudioFrame::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let timestamp = decoded.timestamp();
            decoded.set_pts(timestamp);
            self.graph
                .get("in")
                .ok_or(ffmpeg::Error::FilterNotFound)?
                .source()
                .add(&decoded)?;
            self.drain_graph(octx, ost_time_base)?;
        }
        Ok(())
    }

    fn drain_graph(
        &mut self,
        octx: &mut format::context::Output,
        ost_time_base: Rational,
    ) -> Result<(), ffmpeg::Error> {
        let mut filtered = AudioFrame::empty();
        loop {
            let received = self
                .graph
                .get("out")
                .ok_or(ffmpeg::Error::FilterNotFound)?
                .sink()
                .frame(&mut filtered);
            if received.is_err() {
                return Ok(());
            }
            self.encoder.send_frame(&filtered)?;
            self.drain_encoder(octx, ost_time_base)?;
        }
    }

    fn drain_encoder(
        &mut self,
        octx: &mut format::context::Output,
        ost_time_base: Rational,
    ) -> Result<(), ffmpeg::Error> {
        let mut encoded = Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.ost_index);
            encoded.rescale_ts(self.input_time_base, ost_time_base);
            encoded.write_interleaved(octx)?;
        }
        Ok(())
    }
}

/// `abuffer -> abuffersink` graph converting decoded samples to the
/// encoder's format, layout, rate and frame size.
fn audio_graph(
    time_base: Rational,
    decoder: &decoder::Audio,
    encoder: &encoder::Audio,
) -> Result<filter::Graph, ffmpeg::Error> {
    let mut graph = filter::Graph::new();

    let args = format!(
        "time_base={}:sample_rate={}:sample_fmt={}:channel_layout=0x{:x}",
        time_base,
        decoder.rate(),
        decoder.format().name(),
        decoder.channel_layout().bits()
    );
    let abuffer = filter::find("abuffer").ok_or(ffmpeg::Error::FilterNotFound)?;
    let abuffersink = filter::find("abuffersink").ok_or(ffmpeg::Error::FilterNotFound)?;
    graph.add(&abuffer, "in", &args)?;
    graph.add(&abuffersink, "out", "")?;

    {
        let mut out = graph.get("out").ok_or(ffmpeg::Error::FilterNotFound)?;
        out.set_sample_format(encoder.format());
        out.set_channel_layout(encoder.channel_layout());
        out.set_sample_rate(encoder.rate());
    }

    graph.output("in", 0)?.input("out", 0)?.parse("anull")?;
    graph.validate()?;

    graph
        .get("out")
        .ok_or(ffmpeg::Error::FilterNotFound)?
        .sink()
        .set_frame_size(encoder.frame_size());

    Ok(graph)
}

fn kbps(value: u32) -> usize {
    value as usize * 1000
}
