// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture session
//!
//! ```text
//! camera ! queue ! videoconvert ! tee ─┬─ queue(leaky) ! videoflip ! videoscale ! videoconvert ! appsink(RGBA preview)
//!                                      └─ queue ! videoflip(horiz) ! videoconvert ! appsink(record)
//! microphone ! queue ! audioconvert ! audioresample ! capsfilter(F32LE) ! appsink(record + meter)
//! ```
//!
//! The preview is mirrored with an explicit flip method so device orientation
//! tags never rotate it: the preview stays portrait-locked. The recording is
//! always mirrored like the preview; the export flips it back.

use super::enumeration::create_source;
use super::output::FileOutput;
use super::types::{Device, FrameReceiver, PreviewFrame};
use super::{CaptureBackend, LevelSource, LiveSession, RecordingSink};
use crate::backends::audio::LevelMeter;
use crate::config::Config;
use crate::constants::{pipeline as consts, timing};
use crate::errors::DeviceError;
use crate::media::encoders::AudioQuality;
use crate::pipelines::transcode::FlipMethod;
use crate::pipelines::video::EncoderConfig;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video::VideoInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Flip applied to the recorded frames, undone by the story export
pub const RECORD_FLIP: FlipMethod = FlipMethod::Horizontal;

/// Builds GStreamer sessions
#[derive(Debug, Clone)]
pub struct GstCaptureBackend {
    mirror_preview: bool,
    encoder_config: EncoderConfig,
}

impl GstCaptureBackend {
    pub fn new(config: &Config) -> Self {
        Self {
            mirror_preview: config.mirror_preview,
            encoder_config: EncoderConfig {
                video_quality: config.recording_quality,
                audio_quality: AudioQuality::High,
                ..EncoderConfig::default()
            },
        }
    }
}

impl CaptureBackend for GstCaptureBackend {
    fn build(&self, video: &Device, audio: &Device) -> Result<Box<dyn LiveSession>, DeviceError> {
        gst::init().map_err(|e| DeviceError::StartFailed(format!("GStreamer init failed: {}", e)))?;

        info!(camera = %video.name, microphone = %audio.name, "Building capture session");

        let pipeline = gst::Pipeline::with_name("storycam-session");
        match wire(&pipeline, video, audio, self.mirror_preview, &self.encoder_config) {
            Ok(wired) => Ok(Box::new(CaptureSession {
                pipeline,
                wired: Some(wired),
            })),
            Err(e) => {
                // Never leave a half-built graph holding a device
                let _ = pipeline.set_state(gst::State::Null);
                for child in pipeline.children() {
                    let _ = pipeline.remove(&child);
                }
                error!(error = %e, "Capture session construction failed");
                Err(e)
            }
        }
    }
}

/// Elements that must be reachable after construction
struct Wired {
    preview_sink: gst_app::AppSink,
    record_video_sink: gst_app::AppSink,
    record_audio_sink: gst_app::AppSink,
    output: Arc<FileOutput>,
    meter: LevelMeter,
}

fn make(factory: &str, name: &str) -> Result<gst::Element, String> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|e| format!("Failed to create {}: {}", factory, e))
}

fn record_flip() -> Result<gst::Element, String> {
    let flip = make("videoflip", "record-flip")?;
    flip.set_property_from_str("video-direction", RECORD_FLIP.nick());
    Ok(flip)
}

fn appsink(name: &str, caps: gst::Caps, low_latency: bool) -> gst_app::AppSink {
    let sink = gst_app::AppSink::builder()
        .name(name)
        .caps(&caps)
        .sync(false)
        .build();
    sink.set_property("enable-last-sample", false);
    if low_latency {
        sink.set_property("max-buffers", consts::MAX_BUFFERS);
        sink.set_property("drop", true);
    }
    sink
}

fn wire(
    pipeline: &gst::Pipeline,
    video: &Device,
    audio: &Device,
    mirror: bool,
    encoder_config: &EncoderConfig,
) -> Result<Wired, DeviceError> {
    // Video input
    let camera = create_source(video, "camera").map_err(DeviceError::InputRejected)?;
    let video_queue = make("queue", "camera-queue").map_err(DeviceError::InputRejected)?;
    let video_convert = make("videoconvert", "camera-convert").map_err(DeviceError::InputRejected)?;
    video_convert.set_property("n-threads", consts::videoconvert_threads());
    let tee = make("tee", "camera-tee").map_err(DeviceError::InputRejected)?;

    // Preview branch
    let preview_queue = make("queue", "preview-queue").map_err(DeviceError::InputRejected)?;
    preview_queue.set_property_from_str("leaky", "downstream");
    preview_queue.set_property("max-size-buffers", consts::MAX_BUFFERS);
    let flip = make("videoflip", "preview-flip").map_err(DeviceError::InputRejected)?;
    flip.set_property_from_str("video-direction", if mirror { "horiz" } else { "identity" });
    let preview_scale = make("videoscale", "preview-scale").map_err(DeviceError::InputRejected)?;
    let preview_convert = make("videoconvert", "preview-convert").map_err(DeviceError::InputRejected)?;
    let preview_sink = appsink(
        "preview-sink",
        gst::Caps::builder("video/x-raw")
            .field("format", consts::OUTPUT_FORMAT)
            .field("width", consts::PREVIEW_WIDTH)
            .build(),
        true,
    );

    // File output video branch
    let record_queue = make("queue", "record-queue").map_err(DeviceError::OutputRejected)?;
    let record_flip = record_flip().map_err(DeviceError::OutputRejected)?;
    let record_convert = make("videoconvert", "record-convert").map_err(DeviceError::OutputRejected)?;
    let record_video_sink = appsink(
        "record-video-sink",
        gst::Caps::builder("video/x-raw").field("format", "I420").build(),
        false,
    );

    // Audio input and file output audio branch
    let microphone = create_source(audio, "microphone").map_err(DeviceError::InputRejected)?;
    let audio_queue = make("queue", "microphone-queue").map_err(DeviceError::InputRejected)?;
    let audio_convert = make("audioconvert", "microphone-convert").map_err(DeviceError::InputRejected)?;
    let audio_resample = make("audioresample", "microphone-resample").map_err(DeviceError::InputRejected)?;
    let record_audio_sink = appsink(
        "record-audio-sink",
        gst::Caps::builder("audio/x-raw")
            .field("format", consts::AUDIO_FORMAT)
            .field("layout", "interleaved")
            .build(),
        false,
    );

    pipeline
        .add_many([
            &camera,
            &video_queue,
            &video_convert,
            &tee,
            &preview_queue,
            &flip,
            &preview_scale,
            &preview_convert,
            preview_sink.upcast_ref(),
        ])
        .map_err(|e| DeviceError::InputRejected(format!("Camera could not be added: {}", e)))?;
    gst::Element::link_many([&camera, &video_queue, &video_convert, &tee])
        .map_err(|_| DeviceError::InputRejected(format!("Camera '{}' could not be linked", video.name)))?;
    gst::Element::link_many([
        &tee,
        &preview_queue,
        &flip,
        &preview_scale,
        &preview_convert,
        preview_sink.upcast_ref(),
    ])
    .map_err(|_| DeviceError::InputRejected("Preview branch could not be linked".into()))?;

    pipeline
        .add_many([&microphone, &audio_queue, &audio_convert, &audio_resample])
        .map_err(|e| DeviceError::InputRejected(format!("Microphone could not be added: {}", e)))?;

    pipeline
        .add_many([
            &record_queue,
            &record_flip,
            &record_convert,
            record_video_sink.upcast_ref(),
            record_audio_sink.upcast_ref(),
        ])
        .map_err(|e| DeviceError::OutputRejected(format!("File output could not be added: {}", e)))?;
    gst::Element::link_many([
        &tee,
        &record_queue,
        &record_flip,
        &record_convert,
        record_video_sink.upcast_ref(),
    ])
    .map_err(|_| DeviceError::OutputRejected("Video file output could not be linked".into()))?;
    gst::Element::link_many([
        &microphone,
        &audio_queue,
        &audio_convert,
        &audio_resample,
        record_audio_sink.upcast_ref(),
    ])
    .map_err(|_| DeviceError::InputRejected(format!("Microphone '{}' could not be linked", audio.name)))?;

    let meter = LevelMeter::default();
    let output = Arc::new(FileOutput::new(encoder_config.clone()));
    output.attach(&record_video_sink, &record_audio_sink, meter.clone());

    debug!("Capture session wired");

    Ok(Wired {
        preview_sink,
        record_video_sink,
        record_audio_sink,
        output,
        meter,
    })
}

/// A running (or runnable) GStreamer capture graph
pub struct CaptureSession {
    pipeline: gst::Pipeline,
    wired: Option<Wired>,
}

impl CaptureSession {
    fn install_preview(sink: &gst_app::AppSink) -> FrameReceiver {
        let (tx, rx) = watch::channel(None);
        let frames = Arc::new(AtomicU64::new(0));

        sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                    let info = VideoInfo::from_caps(caps).map_err(|_| gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

                    let count = frames.fetch_add(1, Ordering::Relaxed);
                    if count % timing::FRAME_LOG_INTERVAL == 0 {
                        debug!(frame = count, width = info.width(), height = info.height(), "Preview frame");
                    }

                    tx.send_replace(Some(Arc::new(PreviewFrame {
                        width: info.width(),
                        height: info.height(),
                        stride: info.stride()[0] as u32,
                        data: Arc::from(map.as_slice()),
                        captured_at: Instant::now(),
                    })));
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );
        rx
    }

    /// First error already waiting on the bus, if any
    fn pending_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.timed_pop_filtered(gst::ClockTime::ZERO, &[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => {
                error!(
                    error = %err.error(),
                    debug = ?err.debug(),
                    source = ?err.src().map(|s| s.name()),
                    "GStreamer error during session start"
                );
                Some(err.error().to_string())
            }
            _ => None,
        }
    }
}

impl LiveSession for CaptureSession {
    fn start(&mut self) -> Result<FrameReceiver, DeviceError> {
        let wired = self
            .wired
            .as_ref()
            .ok_or_else(|| DeviceError::StartFailed("Session was unwired".into()))?;
        let frames = Self::install_preview(&wired.preview_sink);

        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| DeviceError::StartFailed(format!("Failed to start session: {}", e)))?;

        let (result, state, pending) = self
            .pipeline
            .state(gst::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
        if let Some(message) = self.pending_error() {
            return Err(DeviceError::StartFailed(message));
        }
        match result {
            Ok(_) if state == gst::State::Playing => {
                info!("Capture session playing");
                Ok(frames)
            }
            _ => Err(DeviceError::StartFailed(format!(
                "Session stuck in {:?} (pending {:?})",
                state, pending
            ))),
        }
    }

    fn stop(&mut self) {
        if let Some(wired) = &self.wired {
            wired.output.abandon();
            wired
                .preview_sink
                .set_callbacks(gst_app::AppSinkCallbacks::builder().build());
        }

        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = %e, "Failed to stop capture session");
        }
        let (result, state, _) = self
            .pipeline
            .state(gst::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));
        match result {
            Ok(_) => info!(state = ?state, "Capture session stopped"),
            Err(e) => debug!(error = ?e, state = ?state, "Session state change had issues"),
        }
    }

    fn unwire(&mut self) {
        if let Some(wired) = self.wired.take() {
            FileOutput::detach(&wired.record_video_sink, &wired.record_audio_sink);
            wired.meter.reset();
        }
        // Removing an element from a bin unlinks all of its pads
        for child in self.pipeline.children() {
            if let Err(e) = self.pipeline.remove(&child) {
                warn!(element = %child.name(), error = %e, "Failed to remove element");
            }
        }
        debug!("Capture session unwired");
    }

    fn output(&self) -> Arc<dyn RecordingSink> {
        match &self.wired {
            Some(wired) => wired.output.clone(),
            None => Arc::new(FileOutput::new(EncoderConfig::default())),
        }
    }

    fn level(&self) -> Arc<dyn LevelSource> {
        match &self.wired {
            Some(wired) => Arc::new(wired.meter.clone()),
            None => Arc::new(LevelMeter::default()),
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameSize;
    use crate::pipelines::transcode::{Affine, Orientation, compute_transform};

    #[test]
    fn test_export_undoes_recorded_mirror() {
        let story = FrameSize::new(1080, 1920);
        let plan = compute_transform(story, Orientation::UPRIGHT, story);
        assert_eq!(plan.flip, RECORD_FLIP);

        let recorded = Affine::mirror(1080.0);
        let exported = recorded.then(plan.transform);
        assert_eq!(FlipMethod::from_affine(&exported), FlipMethod::Identity);
        assert_eq!(exported.apply(100.0, 200.0), (100.0, 200.0));
    }

    #[test]
    fn test_record_flip_mirrors_horizontally() {
        if gst::init().is_err() {
            return;
        }
        // Needs the base plugins
        let Ok(flip) = record_flip() else {
            return;
        };
        assert_eq!(
            flip.property::<gstreamer_video::VideoOrientationMethod>("video-direction"),
            gstreamer_video::VideoOrientationMethod::Horiz
        );
    }
}
