// SPDX-License-Identifier: GPL-3.0-only

//! Offline export of a raw recording to the story format
//!
//! ```text
//! filesrc ─▶ decodebin ─┬─▶ queue ─▶ videoconvert ─▶ videoflip ─▶ videoscale ─▶ videocrop
//!                       │     ─▶ videorate ─▶ videoconvert ─▶ capsfilter ─▶ h264 ─┐
//!                       │                                                         ├─▶ mp4mux ─▶ filesink
//!                       └─▶ queue ─▶ audioconvert ─▶ audioresample ─▶ aac ────────┘
//! ```

use super::inspect::SourceInfo;
use super::transform::{RenderPlan, compute_transform};
use crate::config::FrameSize;
use crate::constants::timing;
use crate::errors::TranscodeError;
use crate::pipelines::video::muxer::{create_muxer, link_muxer_to_sink, link_to_muxer};
use crate::pipelines::video::{EncoderConfig, select_export_encoders};
use gstreamer as gst;
use gstreamer::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How an export ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed(PathBuf),
    Failed(String),
    Cancelled,
}

/// Everything decided before the export graph is built
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPlan {
    pub raw_file: PathBuf,
    pub output: PathBuf,
    pub render: RenderPlan,
    pub framerate: u32,
    /// Route the source audio into the output
    pub include_audio: bool,
}

impl ExportPlan {
    pub fn new(raw_file: &Path, output: &Path, source: &SourceInfo, target: FrameSize, framerate: u32) -> Self {
        Self {
            raw_file: raw_file.to_path_buf(),
            output: output.to_path_buf(),
            render: compute_transform(source.natural, source.orientation, target),
            framerate,
            include_audio: source.has_audio,
        }
    }
}

/// Handle to an export running on a blocking thread
pub struct ExportJob {
    output: PathBuf,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<ExportOutcome>,
}

impl ExportJob {
    /// Run `work` on the blocking pool; it should return `Cancelled`
    /// soon after the flag it is given turns true
    pub fn spawn<F>(output: PathBuf, work: F) -> Self
    where
        F: FnOnce(&AtomicBool) -> ExportOutcome + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let handle = tokio::task::spawn_blocking(move || work(&flag));
        Self {
            output,
            cancel,
            handle,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Flag that cancels this job, for callers that no longer hold it
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub async fn wait(self) -> ExportOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => ExportOutcome::Failed(format!("Export task failed: {}", e)),
        }
    }
}

fn make(factory: &str, name: &str) -> Result<gst::Element, TranscodeError> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|e| TranscodeError::ExportSession(format!("Failed to create {}: {}", factory, e)))
}

fn capsfilter(name: &str, caps: gst::Caps) -> Result<gst::Element, TranscodeError> {
    gst::ElementFactory::make("capsfilter")
        .name(name)
        .property("caps", &caps)
        .build()
        .map_err(|e| TranscodeError::ExportSession(format!("Failed to create capsfilter: {}", e)))
}

fn session_error(message: String) -> TranscodeError {
    TranscodeError::ExportSession(message)
}

/// Build the export graph for `plan`
///
/// The graph is returned in the `Null` state.
pub fn build_export_pipeline(
    plan: &ExportPlan,
    encoder_config: &EncoderConfig,
) -> Result<gst::Pipeline, TranscodeError> {
    let encoders = select_export_encoders(encoder_config, plan.include_audio).map_err(session_error)?;
    let render = &plan.render;

    let pipeline = gst::Pipeline::with_name("storycam-export");

    let location = plan
        .raw_file
        .to_str()
        .ok_or_else(|| session_error(format!("Path is not valid UTF-8: {}", plan.raw_file.display())))?;
    let filesrc = gst::ElementFactory::make("filesrc")
        .name("export-src")
        .property("location", location)
        .build()
        .map_err(|e| session_error(format!("Failed to create filesrc: {}", e)))?;
    let decode = make("decodebin", "export-decode")?;

    let video_queue = make("queue", "export-video-queue")?;
    let convert_in = make("videoconvert", "export-convert-in")?;
    let flip = make("videoflip", "export-flip")?;
    flip.set_property_from_str("video-direction", render.flip.nick());
    let scale = make("videoscale", "export-scale")?;
    let scaled_caps = capsfilter(
        "export-scaled-caps",
        gst::Caps::builder("video/x-raw")
            .field("width", render.scaled.width as i32)
            .field("height", render.scaled.height as i32)
            .field("pixel-aspect-ratio", gst::Fraction::new(1, 1))
            .build(),
    )?;
    let crop = gst::ElementFactory::make("videocrop")
        .name("export-crop")
        .property("left", render.crop.left as i32)
        .property("right", render.crop.right as i32)
        .property("top", render.crop.top as i32)
        .property("bottom", render.crop.bottom as i32)
        .build()
        .map_err(|e| session_error(format!("Failed to create videocrop: {}", e)))?;
    let rate = make("videorate", "export-rate")?;
    let convert_out = make("videoconvert", "export-convert-out")?;
    let target_caps = capsfilter(
        "export-target-caps",
        gst::Caps::builder("video/x-raw")
            .field("width", render.target.width as i32)
            .field("height", render.target.height as i32)
            .field("framerate", gst::Fraction::new(plan.framerate as i32, 1))
            .field("pixel-aspect-ratio", gst::Fraction::new(1, 1))
            .build(),
    )?;

    let mux = create_muxer(encoders.video.muxer, &plan.output, true).map_err(session_error)?;

    let mut elements: Vec<&gst::Element> = vec![
        &filesrc,
        &decode,
        &video_queue,
        &convert_in,
        &flip,
        &scale,
        &scaled_caps,
        &crop,
        &rate,
        &convert_out,
        &target_caps,
        &encoders.video.encoder,
        &mux.muxer,
        &mux.filesink,
    ];
    if let Some(parser) = &encoders.video.parser {
        elements.push(parser);
    }

    let audio_chain = match &encoders.audio {
        Some(audio) => Some((
            make("queue", "export-audio-queue")?,
            make("audioconvert", "export-audio-convert")?,
            make("audioresample", "export-audio-resample")?,
            audio.encoder.clone(),
        )),
        None => None,
    };
    if let Some((queue, convert, resample, encoder)) = &audio_chain {
        elements.extend([queue, convert, resample, encoder]);
    }

    pipeline
        .add_many(elements)
        .map_err(|e| session_error(format!("Failed to add export elements: {}", e)))?;

    filesrc
        .link(&decode)
        .map_err(|_| session_error("Failed to link filesrc to decodebin".into()))?;
    gst::Element::link_many([
        &video_queue,
        &convert_in,
        &flip,
        &scale,
        &scaled_caps,
        &crop,
        &rate,
        &convert_out,
        &target_caps,
        &encoders.video.encoder,
    ])
    .map_err(|_| session_error("Failed to link export video chain".into()))?;
    match &encoders.video.parser {
        Some(parser) => {
            encoders
                .video
                .encoder
                .link(parser)
                .map_err(|_| session_error("Failed to link encoder to parser".into()))?;
            link_to_muxer(parser, &mux.muxer, "video parser").map_err(session_error)?;
        }
        None => link_to_muxer(&encoders.video.encoder, &mux.muxer, "video encoder").map_err(session_error)?,
    }

    let audio_queue = match &audio_chain {
        Some((queue, convert, resample, encoder)) => {
            gst::Element::link_many([queue, convert, resample, encoder])
                .map_err(|_| session_error("Failed to link export audio chain".into()))?;
            link_to_muxer(encoder, &mux.muxer, "audio encoder").map_err(session_error)?;
            Some(queue.clone())
        }
        None => None,
    };
    link_muxer_to_sink(&mux.muxer, &mux.filesink).map_err(session_error)?;

    // Rotation is baked into the pixels, keep the muxer from writing it again
    if let Some(pad) = video_queue.static_pad("sink") {
        pad.add_probe(gst::PadProbeType::EVENT_DOWNSTREAM, |_, info| {
            if let Some(gst::PadProbeData::Event(event)) = &info.data
                && event.type_() == gst::EventType::Tag
            {
                return gst::PadProbeReturn::Drop;
            }
            gst::PadProbeReturn::Ok
        });
    }

    let video_weak = video_queue.downgrade();
    let audio_weak = audio_queue.map(|q| q.downgrade());
    decode.connect_pad_added(move |_decode, src_pad| {
        let caps = src_pad
            .current_caps()
            .unwrap_or_else(|| src_pad.query_caps(None));
        let Some(media) = caps.structure(0).map(|s| s.name().to_string()) else {
            return;
        };

        let target = if media.starts_with("video/") {
            video_weak.upgrade()
        } else if media.starts_with("audio/") {
            audio_weak.as_ref().and_then(|weak| weak.upgrade())
        } else {
            None
        };

        let Some(sink_pad) = target.and_then(|queue| queue.static_pad("sink")) else {
            debug!(caps = %media, "Ignoring decoded stream");
            return;
        };
        if sink_pad.is_linked() {
            return;
        }
        if let Err(e) = src_pad.link(&sink_pad) {
            warn!(caps = %media, error = ?e, "Failed to link decoded stream");
        }
    });

    info!(
        output = %plan.output.display(),
        flip = render.flip.nick(),
        scaled = %render.scaled,
        crop = ?render.crop,
        audio = plan.include_audio,
        "Export pipeline built"
    );
    Ok(pipeline)
}

/// Drive `pipeline` to completion, polling `cancel`
///
/// Partial output is removed unless the export completes.
pub fn run_export(pipeline: gst::Pipeline, output: &Path, cancel: &AtomicBool) -> ExportOutcome {
    let discard = |outcome: ExportOutcome| {
        let _ = pipeline.set_state(gst::State::Null);
        if output.exists()
            && let Err(e) = std::fs::remove_file(output)
        {
            warn!(path = %output.display(), error = %e, "Failed to remove partial export");
        }
        outcome
    };

    let Some(bus) = pipeline.bus() else {
        return discard(ExportOutcome::Failed("Export pipeline has no bus".into()));
    };
    if let Err(e) = pipeline.set_state(gst::State::Playing) {
        return discard(ExportOutcome::Failed(format!("Failed to start export: {}", e)));
    }

    loop {
        if cancel.load(Ordering::SeqCst) {
            info!("Export cancelled");
            return discard(ExportOutcome::Cancelled);
        }

        let Some(msg) = bus.timed_pop_filtered(
            gst::ClockTime::from_mseconds(timing::EXPORT_POLL_MS),
            &[gst::MessageType::Eos, gst::MessageType::Error],
        ) else {
            continue;
        };

        match msg.view() {
            gst::MessageView::Eos(..) => break,
            gst::MessageView::Error(err) => {
                let message = format!(
                    "{} ({})",
                    err.error(),
                    err.debug().map(|d| d.to_string()).unwrap_or_default()
                );
                error!(error = %message, "Export failed");
                return discard(ExportOutcome::Failed(message));
            }
            _ => {}
        }
    }

    let _ = pipeline.set_state(gst::State::Null);
    info!(path = %output.display(), "Export completed");
    ExportOutcome::Completed(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::transcode::transform::Orientation;

    fn source(has_audio: bool) -> SourceInfo {
        SourceInfo {
            natural: FrameSize::new(1920, 1080),
            orientation: Orientation::rotated(90),
            has_audio,
            duration: None,
        }
    }

    fn plan(has_audio: bool) -> ExportPlan {
        ExportPlan::new(
            Path::new("/tmp/raw.mkv"),
            Path::new("/tmp/story.mp4"),
            &source(has_audio),
            FrameSize::new(1080, 1920),
            30,
        )
    }

    #[test]
    fn test_silent_source_has_no_audio_branch() {
        assert!(!plan(false).include_audio);
        assert!(plan(true).include_audio);
    }

    #[test]
    fn test_silent_export_graph_has_no_audio_elements() {
        if gst::init().is_err() {
            return;
        }
        // Needs an H.264 encoder and the base plugins
        let Ok(pipeline) = build_export_pipeline(&plan(false), &EncoderConfig::default()) else {
            return;
        };
        assert!(pipeline.by_name("export-video-queue").is_some());
        assert!(pipeline.by_name("export-audio-queue").is_none());
    }

    #[test]
    fn test_plan_uses_render_geometry() {
        let plan = plan(true);
        assert_eq!(plan.render.target, FrameSize::new(1080, 1920));
        assert_eq!(plan.render.scaled, FrameSize::new(1080, 1920));
        assert_eq!(plan.framerate, 30);
    }

    #[tokio::test]
    async fn test_cancelled_job_reports_cancelled() {
        let job = ExportJob::spawn(PathBuf::from("/tmp/never.mp4"), |cancel| {
            while !cancel.load(Ordering::SeqCst) {
                std::thread::sleep(std::time::Duration::from_millis(5));
            }
            ExportOutcome::Cancelled
        });
        assert_eq!(job.output(), Path::new("/tmp/never.mp4"));
        job.cancel();
        assert_eq!(job.wait().await, ExportOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_panicking_job_reports_failure() {
        let job = ExportJob::spawn(PathBuf::from("/tmp/x.mp4"), |_| panic!("boom"));
        assert!(matches!(job.wait().await, ExportOutcome::Failed(_)));
    }
}
