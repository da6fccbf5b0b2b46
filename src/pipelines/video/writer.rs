// SPDX-License-Identifier: GPL-3.0-only

//! Temporary recording writer
//!
//! Receives raw samples from a live capture session through two appsrcs and
//! encodes them into a file. Timestamps are rebased so the file starts at
//! zero; buffers captured before the first accepted one are dropped so the
//! streams stay aligned.
//!
//! ```text
//! appsrc(video) ! queue ! videoconvert ! encoder ! parser ─┐
//!                                                           ├─ muxer ! filesink
//! appsrc(audio) ! queue ! audioconvert ! audioresample ! encoder ─┘
//! ```

use super::encoder_selection::{EncoderConfig, select_recording_encoders};
use super::muxer::{create_muxer, link_muxer_to_sink, link_to_muxer};
use crate::constants::timing;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Which input a sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Video,
    Audio,
}

pub struct RecordingWriter {
    pipeline: gst::Pipeline,
    video_src: gst_app::AppSrc,
    audio_src: Option<gst_app::AppSrc>,
    output_path: PathBuf,
    base_pts: Option<gst::ClockTime>,
    video_caps_set: bool,
    audio_caps_set: bool,
    video_frames: u64,
}

impl RecordingWriter {
    /// Build and start a writer for `path`
    ///
    /// The extension of `path` is replaced by the selected container's.
    pub fn create(path: &Path, config: &EncoderConfig, with_audio: bool) -> Result<Self, String> {
        let encoders = select_recording_encoders(config, with_audio)?;
        let output_path = path.with_extension(encoders.video.extension);

        let pipeline = gst::Pipeline::with_name("storycam-writer");

        let video_src = gst_app::AppSrc::builder()
            .name("record-video-src")
            .format(gst::Format::Time)
            .is_live(true)
            .build();
        let video_queue = make("queue", "record-video-queue")?;
        let video_convert = make("videoconvert", "record-video-convert")?;

        let mux = create_muxer(encoders.video.muxer, &output_path, false)?;

        let mut elements: Vec<&gst::Element> = vec![
            video_src.upcast_ref(),
            &video_queue,
            &video_convert,
            &encoders.video.encoder,
            &mux.muxer,
            &mux.filesink,
        ];
        if let Some(parser) = &encoders.video.parser {
            elements.push(parser);
        }

        let audio_chain = match &encoders.audio {
            Some(audio) => {
                let src = gst_app::AppSrc::builder()
                    .name("record-audio-src")
                    .format(gst::Format::Time)
                    .is_live(true)
                    .build();
                let queue = make("queue", "record-audio-queue")?;
                let convert = make("audioconvert", "record-audio-convert")?;
                let resample = make("audioresample", "record-audio-resample")?;
                Some((src, queue, convert, resample, audio.encoder.clone()))
            }
            None => None,
        };
        if let Some((src, queue, convert, resample, encoder)) = &audio_chain {
            elements.extend([src.upcast_ref(), queue, convert, resample, encoder]);
        }

        pipeline
            .add_many(elements)
            .map_err(|e| format!("Failed to add writer elements: {}", e))?;

        gst::Element::link_many([
            video_src.upcast_ref(),
            &video_queue,
            &video_convert,
            &encoders.video.encoder,
        ])
        .map_err(|_| "Failed to link video recording chain".to_string())?;
        match &encoders.video.parser {
            Some(parser) => {
                encoders
                    .video
                    .encoder
                    .link(parser)
                    .map_err(|_| "Failed to link encoder to parser".to_string())?;
                link_to_muxer(parser, &mux.muxer, "video parser")?;
            }
            None => link_to_muxer(&encoders.video.encoder, &mux.muxer, "video encoder")?,
        }

        let audio_src = match audio_chain {
            Some((src, queue, convert, resample, encoder)) => {
                gst::Element::link_many([src.upcast_ref(), &queue, &convert, &resample, &encoder])
                    .map_err(|_| "Failed to link audio recording chain".to_string())?;
                link_to_muxer(&encoder, &mux.muxer, "audio encoder")?;
                Some(src)
            }
            None => None,
        };

        link_muxer_to_sink(&mux.muxer, &mux.filesink)?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| format!("Failed to start recording writer: {}", e))?;

        info!(
            path = %output_path.display(),
            codec = ?encoders.video.codec,
            audio = audio_src.is_some(),
            "Recording writer started"
        );

        Ok(Self {
            pipeline,
            video_src,
            audio_src,
            output_path,
            base_pts: None,
            video_caps_set: false,
            audio_caps_set: false,
            video_frames: 0,
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Forward one raw video sample
    pub fn push_video(&mut self, sample: &gst::Sample) {
        self.push(Stream::Video, sample);
    }

    /// Forward one raw audio sample
    pub fn push_audio(&mut self, sample: &gst::Sample) {
        self.push(Stream::Audio, sample);
    }

    fn push(&mut self, stream: Stream, sample: &gst::Sample) {
        let Some(buffer) = sample.buffer() else {
            return;
        };
        let Some(pts) = buffer.pts() else {
            return;
        };

        // The file starts with the first video frame
        let base = match self.base_pts {
            Some(base) => base,
            None if stream == Stream::Video => {
                self.base_pts = Some(pts);
                pts
            }
            None => return,
        };
        let Some(relative) = pts.checked_sub(base) else {
            return;
        };

        let (src, caps_set) = match stream {
            Stream::Video => (&self.video_src, &mut self.video_caps_set),
            Stream::Audio => match &self.audio_src {
                Some(src) => (src, &mut self.audio_caps_set),
                None => return,
            },
        };

        if !*caps_set {
            src.set_caps(sample.caps_owned().as_ref());
            *caps_set = true;
        }

        let mut retimed = buffer.copy();
        {
            let retimed = retimed.make_mut();
            retimed.set_pts(relative);
            retimed.set_dts(gst::ClockTime::NONE);
        }

        if let Err(e) = src.push_buffer(retimed) {
            warn!(stream = ?stream, error = ?e, "Recording writer refused buffer");
            return;
        }

        if stream == Stream::Video {
            self.video_frames += 1;
            if self.video_frames % timing::FRAME_LOG_INTERVAL == 0 {
                debug!(frames = self.video_frames, "Recording progress");
            }
        }
    }

    /// Send EOS, wait for the muxer to finalize and release the pipeline
    pub fn finish(self) -> Result<PathBuf, String> {
        info!(frames = self.video_frames, "Finishing recording");

        let _ = self.video_src.end_of_stream();
        if let Some(audio_src) = &self.audio_src {
            let _ = audio_src.end_of_stream();
        }

        let bus = self.pipeline.bus().ok_or("No bus available")?;
        let outcome = match bus.timed_pop_filtered(
            gst::ClockTime::from_seconds(timing::EOS_TIMEOUT_SECS),
            &[gst::MessageType::Eos, gst::MessageType::Error],
        ) {
            Some(msg) => match msg.view() {
                gst::MessageView::Eos(..) => Ok(()),
                gst::MessageView::Error(err) => {
                    error!(
                        error = %err.error(),
                        debug = ?err.debug(),
                        source = ?err.src().map(|s| s.name()),
                        "Recording writer error"
                    );
                    Err(format!("Recording failed: {}", err.error()))
                }
                _ => Ok(()),
            },
            None => {
                warn!("Timed out waiting for recording EOS");
                Ok(())
            }
        };

        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| format!("Failed to stop recording writer: {}", e))?;
        outcome?;

        if self.video_frames == 0 {
            let _ = std::fs::remove_file(&self.output_path);
            return Err("No video frames were recorded".to_string());
        }

        info!(path = %self.output_path.display(), "Recording saved");
        Ok(self.output_path.clone())
    }
}

impl Drop for RecordingWriter {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

fn make(factory: &str, name: &str) -> Result<gst::Element, String> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|e| format!("Failed to create {}: {}", factory, e))
}
