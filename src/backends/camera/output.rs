// SPDX-License-Identifier: GPL-3.0-only

//! File output of a capture session
//!
//! The session's record appsinks always run. Their callbacks forward samples
//! to a writer only while one sits in the shared slot, so starting and
//! stopping a recording never touches the live graph.

use super::{Finalize, RecordingSink};
use crate::backends::audio::LevelMeter;
use crate::errors::RecordingError;
use crate::pipelines::video::{EncoderConfig, RecordingWriter};
use gstreamer as gst;
use gstreamer_app as gst_app;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Destination of recorded samples
pub trait SampleWriter: Send {
    fn output_path(&self) -> &Path;

    fn push_video(&mut self, sample: &gst::Sample);

    fn push_audio(&mut self, sample: &gst::Sample);

    /// Flush and close the file
    fn finish(self: Box<Self>) -> Result<PathBuf, String>;
}

impl SampleWriter for RecordingWriter {
    fn output_path(&self) -> &Path {
        RecordingWriter::output_path(self)
    }

    fn push_video(&mut self, sample: &gst::Sample) {
        RecordingWriter::push_video(self, sample)
    }

    fn push_audio(&mut self, sample: &gst::Sample) {
        RecordingWriter::push_audio(self, sample)
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, String> {
        RecordingWriter::finish(*self)
    }
}

type OpenWriter = Box<dyn Fn(&Path) -> Result<Box<dyn SampleWriter>, String> + Send + Sync>;

/// Writer slot shared between the streaming threads and the recorder
type WriterSlot = Arc<Mutex<Option<Box<dyn SampleWriter>>>>;

pub struct FileOutput {
    slot: WriterSlot,
    open: OpenWriter,
}

impl FileOutput {
    pub fn new(encoder_config: EncoderConfig) -> Self {
        Self::with_opener(move |path| {
            RecordingWriter::create(path, &encoder_config, true)
                .map(|writer| Box::new(writer) as Box<dyn SampleWriter>)
        })
    }

    /// File output whose writers come from `open`
    pub fn with_opener<F>(open: F) -> Self
    where
        F: Fn(&Path) -> Result<Box<dyn SampleWriter>, String> + Send + Sync + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(None)),
            open: Box::new(open),
        }
    }

    /// Install streaming callbacks on the record sinks
    ///
    /// Every audio buffer also feeds `meter`, recording or not.
    pub fn attach(&self, video_sink: &gst_app::AppSink, audio_sink: &gst_app::AppSink, meter: LevelMeter) {
        let slot = Arc::clone(&self.slot);
        video_sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    if let Ok(mut guard) = slot.lock()
                        && let Some(writer) = guard.as_mut()
                    {
                        writer.push_video(&sample);
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        let slot = Arc::clone(&self.slot);
        audio_sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    if let Some(buffer) = sample.buffer()
                        && let Ok(map) = buffer.map_readable()
                    {
                        meter.observe(map.as_slice());
                    }
                    if let Ok(mut guard) = slot.lock()
                        && let Some(writer) = guard.as_mut()
                    {
                        writer.push_audio(&sample);
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );
    }

    /// Drop callbacks from the record sinks
    pub fn detach(video_sink: &gst_app::AppSink, audio_sink: &gst_app::AppSink) {
        video_sink.set_callbacks(gst_app::AppSinkCallbacks::builder().build());
        audio_sink.set_callbacks(gst_app::AppSinkCallbacks::builder().build());
    }

    /// Finish a recording left running when the session goes away
    pub fn abandon(&self) {
        if self.is_recording() {
            warn!("Session closing while recording, finalizing file");
            if let Err(e) = self.end().and_then(|finalize| finalize()) {
                warn!(error = %e, "Abandoned recording could not be finalized");
            }
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Box<dyn SampleWriter>>>, RecordingError> {
        self.slot
            .lock()
            .map_err(|_| RecordingError::PipelineError("Recording writer lock poisoned".into()))
    }
}

impl RecordingSink for FileOutput {
    fn begin(&self, path: &Path) -> Result<PathBuf, RecordingError> {
        let mut slot = self.lock()?;
        if let Some(writer) = slot.as_ref() {
            return Ok(writer.output_path().to_path_buf());
        }
        let writer = (self.open)(path).map_err(RecordingError::StartFailed)?;
        let actual = writer.output_path().to_path_buf();
        info!(path = %actual.display(), "File output recording");
        *slot = Some(writer);
        Ok(actual)
    }

    fn end(&self) -> Result<Finalize, RecordingError> {
        // Streaming threads stop feeding the writer once it leaves the slot
        let writer = self.lock()?.take().ok_or_else(|| {
            RecordingError::StopFailed("File output is not recording".into())
        })?;
        Ok(Box::new(move || writer.finish().map_err(RecordingError::StopFailed)))
    }

    fn is_recording(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writer that only remembers where it would write
    pub(crate) struct PathWriter {
        path: PathBuf,
        finished: Arc<AtomicUsize>,
    }

    impl SampleWriter for PathWriter {
        fn output_path(&self) -> &Path {
            &self.path
        }
        fn push_video(&mut self, _: &gst::Sample) {}
        fn push_audio(&mut self, _: &gst::Sample) {}
        fn finish(self: Box<Self>) -> Result<PathBuf, String> {
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(self.path)
        }
    }

    /// File output over [`PathWriter`]s, plus a count of finished files
    pub(crate) fn path_output() -> (FileOutput, Arc<AtomicUsize>) {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);
        let output = FileOutput::with_opener(move |path| {
            Ok(Box::new(PathWriter {
                path: path.to_path_buf(),
                finished: Arc::clone(&counter),
            }) as Box<dyn SampleWriter>)
        });
        (output, finished)
    }

    #[test]
    fn test_begin_twice_keeps_first_file() {
        let (output, _) = path_output();
        assert_eq!(output.begin(Path::new("/tmp/a.mp4")).unwrap(), PathBuf::from("/tmp/a.mp4"));
        assert_eq!(output.begin(Path::new("/tmp/b.mp4")).unwrap(), PathBuf::from("/tmp/a.mp4"));
        assert!(output.is_recording());
    }

    #[test]
    fn test_restart_before_finalize_opens_new_file() {
        let (output, finished) = path_output();
        output.begin(Path::new("/tmp/first.mp4")).unwrap();
        let finalize_first = output.end().unwrap();
        assert!(!output.is_recording());

        let second = output.begin(Path::new("/tmp/second.mp4")).unwrap();
        assert_eq!(second, PathBuf::from("/tmp/second.mp4"));

        assert_eq!(finalize_first().unwrap(), PathBuf::from("/tmp/first.mp4"));
        assert!(output.is_recording());
        let finalize_second = output.end().unwrap();
        assert_eq!(finalize_second().unwrap(), second);
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_end_without_recording_fails() {
        let (output, _) = path_output();
        assert!(matches!(output.end(), Err(RecordingError::StopFailed(_))));
    }

    #[test]
    fn test_open_failure_leaves_slot_empty() {
        let output = FileOutput::with_opener(|_| Err("no encoder".into()));
        let err = output.begin(Path::new("/tmp/x.mp4")).unwrap_err();
        assert!(matches!(err, RecordingError::StartFailed(_)));
        assert!(!output.is_recording());
    }

    #[test]
    fn test_abandon_finalizes_running_file() {
        let (output, finished) = path_output();
        output.begin(Path::new("/tmp/left.mp4")).unwrap();
        output.abandon();
        assert!(!output.is_recording());
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
