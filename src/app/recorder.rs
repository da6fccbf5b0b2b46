// SPDX-License-Identifier: GPL-3.0-only

//! Bounded recording with countdown and live audio level
//!
//! A recording lasts at most `max_duration`. While active, two tasks run:
//! a 1 Hz countdown that stops the recording when it reaches zero and a
//! 10 Hz sampler that publishes the microphone level. The recorder never
//! reads the file it produces; it hands the path on via [`RecorderEvent`].

use crate::backends::camera::{LevelSource, RecordingSink};
use crate::constants::{audio_level, timing};
use crate::errors::RecordingError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Published recorder state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecorderStatus {
    pub is_recording: bool,
    pub time_remaining: Duration,
    /// Normalized microphone level in `[0, 1]`
    pub audio_level: f32,
}

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called
    Explicit,
    /// The countdown reached zero
    Timeout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    /// The raw file is complete and can be transcoded
    Finished { raw_file: PathBuf, reason: StopReason },
    /// The output could not be finalized
    Failed(RecordingError),
}

/// Identifies one recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingHandle {
    pub id: u64,
    pub raw_file: PathBuf,
}

struct ActiveRecording {
    handle: RecordingHandle,
    sink: Arc<dyn RecordingSink>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Recorder {
    max_duration: Duration,
    runtime: Handle,
    active: Mutex<Option<ActiveRecording>>,
    /// Finalizers of stopped recordings still running
    finishing: Mutex<Vec<JoinHandle<()>>>,
    status: watch::Sender<RecorderStatus>,
    events: mpsc::UnboundedSender<RecorderEvent>,
    next_id: AtomicU64,
}

/// Map peak power in dB to a `[0, 1]` meter level
///
/// -160 dB maps to 0 and 0 dB to 1; values outside are clamped.
pub fn normalize_level(peak_db: f64) -> f32 {
    if peak_db.is_nan() {
        return 0.0;
    }
    let span = audio_level::MAX_DB - audio_level::MIN_DB;
    ((peak_db - audio_level::MIN_DB) / span).clamp(0.0, 1.0) as f32
}

/// Remaining time after `elapsed`, never below zero
pub fn time_remaining(max_duration: Duration, elapsed: Duration) -> Duration {
    max_duration.saturating_sub(elapsed)
}

impl Recorder {
    /// Create a recorder bound to the current Tokio runtime
    ///
    /// Its timers and finalizers run on that runtime, so `stop` may be
    /// called from any thread afterwards.
    pub fn new(max_duration: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<RecorderEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(Self::idle_status(max_duration));
        let recorder = Arc::new(Self {
            max_duration,
            runtime: Handle::current(),
            active: Mutex::new(None),
            finishing: Mutex::new(Vec::new()),
            status,
            events,
            next_id: AtomicU64::new(1),
        });
        (recorder, events_rx)
    }

    fn idle_status(max_duration: Duration) -> RecorderStatus {
        RecorderStatus {
            is_recording: false,
            time_remaining: max_duration,
            audio_level: 0.0,
        }
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderStatus> {
        self.status.subscribe()
    }

    pub fn is_recording(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    /// Start recording into `path` through `sink`
    ///
    /// Calling this while a recording is active returns the active handle and
    /// changes nothing.
    pub fn start(
        self: &Arc<Self>,
        sink: Arc<dyn RecordingSink>,
        level: Arc<dyn LevelSource>,
        path: &Path,
    ) -> Result<RecordingHandle, RecordingError> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| RecordingError::StartFailed("Recorder state poisoned".into()))?;

        if let Some(current) = active.as_ref() {
            debug!(id = current.handle.id, "Recording already active");
            return Ok(current.handle.clone());
        }

        let raw_file = sink.begin(path)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = RecordingHandle { id, raw_file };

        self.status.send_replace(RecorderStatus {
            is_recording: true,
            time_remaining: self.max_duration,
            audio_level: 0.0,
        });

        let tasks = vec![self.spawn_countdown(id), self.spawn_level_sampler(level)];

        info!(
            id,
            path = %handle.raw_file.display(),
            max_secs = self.max_duration.as_secs(),
            "Recording started"
        );

        *active = Some(ActiveRecording {
            handle: handle.clone(),
            sink,
            tasks,
        });
        Ok(handle)
    }

    /// Stop the active recording; a no-op when nothing is recording
    pub fn stop(&self) -> bool {
        self.stop_matching(None, StopReason::Explicit)
    }

    fn stop_matching(&self, id: Option<u64>, reason: StopReason) -> bool {
        let Ok(mut active) = self.active.lock() else {
            return false;
        };
        let matches = match (active.as_ref(), id) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(current), Some(id)) => current.handle.id == id,
        };
        if !matches {
            return false;
        }
        let Some(recording) = active.take() else {
            return false;
        };
        // Detach the file before a new start can reach the sink
        let ended = recording.sink.end();
        drop(active);

        for task in &recording.tasks {
            task.abort();
        }
        self.status.send_replace(Self::idle_status(self.max_duration));

        info!(id = recording.handle.id, reason = ?reason, "Recording stopped");

        let finalize = match ended {
            Ok(finalize) => finalize,
            Err(e) => {
                warn!(error = %e, "Recording could not be stopped");
                let _ = self.events.send(RecorderEvent::Failed(e));
                return true;
            }
        };

        let events = self.events.clone();
        let task = self.runtime.spawn_blocking(move || {
            let event = match finalize() {
                Ok(raw_file) => RecorderEvent::Finished { raw_file, reason },
                Err(e) => {
                    warn!(error = %e, "Recording could not be finalized");
                    RecorderEvent::Failed(e)
                }
            };
            let _ = events.send(event);
        });
        if let Ok(mut finishing) = self.finishing.lock() {
            finishing.retain(|t| !t.is_finished());
            finishing.push(task);
        }
        true
    }

    /// Wait until every stopped recording has been finalized
    ///
    /// Their events are queued by the time this returns.
    pub async fn settle(&self) {
        let pending: Vec<_> = match self.finishing.lock() {
            Ok(mut finishing) => finishing.drain(..).collect(),
            Err(_) => return,
        };
        for task in pending {
            let _ = task.await;
        }
    }

    fn spawn_countdown(self: &Arc<Self>, id: u64) -> JoinHandle<()> {
        let recorder = Arc::downgrade(self);
        let total = self.max_duration;
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(timing::COUNTDOWN_TICK);
            // First tick completes immediately
            ticker.tick().await;
            let mut elapsed = Duration::ZERO;
            loop {
                ticker.tick().await;
                elapsed += timing::COUNTDOWN_TICK;
                let remaining = time_remaining(total, elapsed);

                let Some(recorder) = recorder.upgrade() else {
                    return;
                };
                recorder.status.send_modify(|s| s.time_remaining = remaining);

                if remaining.is_zero() {
                    recorder.stop_matching(Some(id), StopReason::Timeout);
                    return;
                }
            }
        })
    }

    fn spawn_level_sampler(self: &Arc<Self>, level: Arc<dyn LevelSource>) -> JoinHandle<()> {
        let recorder = Arc::downgrade(self);
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(timing::LEVEL_TICK);
            loop {
                ticker.tick().await;
                let Some(recorder) = recorder.upgrade() else {
                    return;
                };
                let value = normalize_level(level.peak_db());
                recorder.status.send_modify(|s| s.audio_level = value);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::Finalize;
    use crate::backends::camera::output::tests::path_output;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSink {
        begins: AtomicUsize,
        finishes: AtomicUsize,
        fail_finish: bool,
    }

    impl RecordingSink for CountingSink {
        fn begin(&self, path: &Path) -> Result<PathBuf, RecordingError> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            Ok(path.with_extension("webm"))
        }
        fn end(&self) -> Result<Finalize, RecordingError> {
            self.finishes.fetch_add(1, Ordering::SeqCst);
            if self.fail_finish {
                Ok(Box::new(|| Err(RecordingError::StopFailed("muxer died".into()))))
            } else {
                Ok(Box::new(|| Ok(PathBuf::from("/tmp/raw.webm"))))
            }
        }
        fn is_recording(&self) -> bool {
            self.begins.load(Ordering::SeqCst) > self.finishes.load(Ordering::SeqCst)
        }
    }

    struct FixedLevel(f64);

    impl LevelSource for FixedLevel {
        fn peak_db(&self) -> f64 {
            self.0
        }
    }

    fn start(recorder: &Arc<Recorder>, sink: &Arc<CountingSink>) -> RecordingHandle {
        recorder
            .start(sink.clone(), Arc::new(FixedLevel(-40.0)), Path::new("/tmp/raw"))
            .unwrap()
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(normalize_level(-160.0), 0.0);
        assert_eq!(normalize_level(0.0), 1.0);
        assert_eq!(normalize_level(-80.0), 0.5);
        assert_eq!(normalize_level(-200.0), 0.0);
        assert_eq!(normalize_level(12.0), 1.0);
        assert_eq!(normalize_level(f64::NAN), 0.0);
    }

    #[test]
    fn test_time_remaining_never_negative() {
        let max = Duration::from_secs(60);
        assert_eq!(time_remaining(max, Duration::ZERO), max);
        assert_eq!(time_remaining(max, Duration::from_secs(59)), Duration::from_secs(1));
        assert_eq!(time_remaining(max, Duration::from_secs(75)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_recording_is_noop() {
        let (recorder, mut events) = Recorder::new(Duration::from_secs(60));
        assert!(!recorder.stop());
        assert!(!recorder.stop());
        assert!(events.try_recv().is_err());
        assert!(!recorder.subscribe().borrow().is_recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_returns_active_handle() {
        let (recorder, _events) = Recorder::new(Duration::from_secs(60));
        let sink = Arc::new(CountingSink::default());

        let first = start(&recorder, &sink);
        let second = start(&recorder, &sink);

        assert_eq!(first, second);
        assert_eq!(sink.begins.load(Ordering::SeqCst), 1);
        assert_eq!(first.raw_file, PathBuf::from("/tmp/raw.webm"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_publishes_remaining_time() {
        let (recorder, _events) = Recorder::new(Duration::from_secs(60));
        let sink = Arc::new(CountingSink::default());
        let status = recorder.subscribe();

        start(&recorder, &sink);
        tokio::time::sleep(Duration::from_millis(3500)).await;

        let now = *status.borrow();
        assert!(now.is_recording);
        assert_eq!(now.time_remaining, Duration::from_secs(57));
        assert!((now.audio_level - 0.75).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_stops_exactly_once() {
        let (recorder, mut events) = Recorder::new(Duration::from_secs(3));
        let sink = Arc::new(CountingSink::default());
        start(&recorder, &sink);

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            RecorderEvent::Finished {
                raw_file: PathBuf::from("/tmp/raw.webm"),
                reason: StopReason::Timeout
            }
        );

        // A late explicit stop and more ticks change nothing
        assert!(!recorder.stop());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(sink.finishes.load(Ordering::SeqCst), 1);

        let idle = *recorder.subscribe().borrow();
        assert!(!idle.is_recording);
        assert_eq!(idle.time_remaining, Duration::from_secs(3));
        assert_eq!(idle.audio_level, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop_then_restart() {
        let (recorder, mut events) = Recorder::new(Duration::from_secs(60));
        let sink = Arc::new(CountingSink::default());

        let first = start(&recorder, &sink);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(recorder.stop());
        assert!(matches!(
            events.recv().await,
            Some(RecorderEvent::Finished { reason: StopReason::Explicit, .. })
        ));

        let second = start(&recorder, &sink);
        assert_ne!(first.id, second.id);
        assert_eq!(recorder.subscribe().borrow().time_remaining, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_failure_is_reported() {
        let (recorder, mut events) = Recorder::new(Duration::from_secs(60));
        let sink = Arc::new(CountingSink {
            fail_finish: true,
            ..Default::default()
        });
        start(&recorder, &sink);
        recorder.stop();

        assert!(matches!(events.recv().await, Some(RecorderEvent::Failed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_restart_records_to_new_file() {
        let (recorder, mut events) = Recorder::new(Duration::from_secs(60));
        let (output, finished) = path_output();
        let output = Arc::new(output);
        let level: Arc<dyn LevelSource> = Arc::new(FixedLevel(-160.0));

        let first = recorder
            .start(output.clone(), level.clone(), Path::new("/tmp/first.mp4"))
            .unwrap();
        assert!(recorder.stop());
        let second = recorder
            .start(output.clone(), level, Path::new("/tmp/second.mp4"))
            .unwrap();
        assert_eq!(second.raw_file, PathBuf::from("/tmp/second.mp4"));
        assert!(recorder.is_recording());
        assert!(recorder.stop());

        let mut files = Vec::new();
        for _ in 0..2 {
            match events.recv().await {
                Some(RecorderEvent::Finished { raw_file, .. }) => files.push(raw_file),
                other => panic!("unexpected event {:?}", other),
            }
        }
        files.sort();
        assert_eq!(files, vec![first.raw_file, second.raw_file]);
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stop_from_thread_outside_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (recorder, mut events) = {
            let _guard = runtime.enter();
            Recorder::new(Duration::from_secs(60))
        };
        let sink = Arc::new(CountingSink::default());
        runtime.block_on(async { start(&recorder, &sink) });

        assert!(recorder.stop());
        assert!(!recorder.is_recording());

        let event = runtime.block_on(events.recv());
        assert!(matches!(
            event,
            Some(RecorderEvent::Finished { reason: StopReason::Explicit, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_waits_for_finalize() {
        let (recorder, mut events) = Recorder::new(Duration::from_secs(60));
        let sink = Arc::new(CountingSink::default());
        start(&recorder, &sink);
        recorder.stop();

        recorder.settle().await;
        assert!(matches!(events.try_recv(), Ok(RecorderEvent::Finished { .. })));
    }
}
