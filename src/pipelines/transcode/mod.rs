// SPDX-License-Identifier: GPL-3.0-only

//! Story export
//!
//! Turns the raw recording into a 1080x1920, 30 fps H.264/AAC MP4:
//!
//! - [`inspect`]: reads size, orientation and streams of the raw file
//! - [`transform`]: fits the upright, un-mirrored source onto the target
//! - [`export`]: builds and runs the export graph off the async runtime

pub mod export;
pub mod inspect;
pub mod transform;

pub use export::{ExportJob, ExportOutcome, ExportPlan};
pub use inspect::SourceInfo;
pub use transform::{Affine, FlipMethod, Orientation, RenderPlan, compute_transform};

use crate::config::{Config, FrameSize};
use crate::errors::TranscodeError;
use crate::media::encoders::AudioQuality;
use crate::pipelines::video::EncoderConfig;
use futures::future::BoxFuture;
use std::path::PathBuf;
use tracing::info;

/// Starts exports of finished recordings
pub trait StoryTranscoder: Send + Sync {
    /// Inspect `raw_file` and start exporting it to `output`
    ///
    /// Errors are returned before any export work begins; the outcome of
    /// the export itself is reported by the returned job.
    fn transcode(&self, raw_file: PathBuf, output: PathBuf) -> BoxFuture<'_, Result<ExportJob, TranscodeError>>;
}

/// GStreamer implementation of [`StoryTranscoder`]
#[derive(Debug, Clone)]
pub struct Transcoder {
    target: FrameSize,
    framerate: u32,
    encoder_config: EncoderConfig,
}

impl Transcoder {
    pub fn new(config: &Config) -> Self {
        Self {
            target: config.target,
            framerate: config.framerate,
            encoder_config: EncoderConfig {
                video_quality: config.export_quality,
                audio_quality: AudioQuality::Maximum,
                size: config.target,
            },
        }
    }

    pub fn target(&self) -> FrameSize {
        self.target
    }
}

impl StoryTranscoder for Transcoder {
    fn transcode(&self, raw_file: PathBuf, output: PathBuf) -> BoxFuture<'_, Result<ExportJob, TranscodeError>> {
        let target = self.target;
        let framerate = self.framerate;
        let encoder_config = self.encoder_config.clone();
        Box::pin(async move {
            let prepare_output = output.clone();
            let pipeline = tokio::task::spawn_blocking(move || {
                let source = inspect::inspect(&raw_file)?;
                let plan = ExportPlan::new(&raw_file, &prepare_output, &source, target, framerate);
                export::build_export_pipeline(&plan, &encoder_config)
            })
            .await
            .map_err(|e| TranscodeError::ExportSession(format!("Export setup task failed: {}", e)))??;

            info!(output = %output.display(), "Starting export");
            let job_output = output.clone();
            Ok(ExportJob::spawn(output, move |cancel| {
                export::run_export(pipeline, &job_output, cancel)
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcoder_targets_story_frame() {
        let transcoder = Transcoder::new(&Config::default());
        assert_eq!(transcoder.target(), FrameSize::new(1080, 1920));
        assert_eq!(transcoder.framerate, 30);
        assert_eq!(transcoder.encoder_config.size, FrameSize::new(1080, 1920));
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_export() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Transcoder::new(&Config::default());
        let result = transcoder
            .transcode(dir.path().join("absent.mkv"), dir.path().join("out.mp4"))
            .await;
        assert!(result.is_err());
        assert!(!dir.path().join("out.mp4").exists());
    }
}
