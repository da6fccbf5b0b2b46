// SPDX-License-Identifier: GPL-3.0-only

//! Story recorder application core
//!
//! [`StoryApp`] ties the pieces together:
//!
//! - `CaptureSessionManager`: live camera + microphone session and preview
//! - [`recorder::Recorder`]: bounded recording with countdown and level
//! - [`save::SaveStage`]: export of each finished recording and the save
//!
//! Front ends drive it through a handful of async calls and observe it
//! through watch channels plus a stream of [`AppNotice`]s.

pub mod recorder;
pub mod save;

use crate::backends::camera::{
    CaptureSessionManager, Device, DeviceList, GstCaptureBackend, MediaKind, PreviewHandle,
    SessionInfo,
};
use crate::backends::permissions::{Permissions, PortalPermissions};
use crate::config::Config;
use crate::errors::{AppError, AppResult, DeviceError, RecordingError};
use crate::pipelines::transcode::{StoryTranscoder, Transcoder};
use crate::storage;
use recorder::{Recorder, RecorderStatus, RecordingHandle};
pub use save::PickerFactory;
use save::{LazyPicker, SaveStage};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Outcome of a save, shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppNotice {
    Saved(PathBuf),
    SaveCancelled,
    Error(String),
}

pub struct StoryApp {
    config: Config,
    manager: CaptureSessionManager,
    recorder: Arc<Recorder>,
    save: SaveStage,
    save_task: Mutex<Option<JoinHandle<()>>>,
    devices: Mutex<DeviceList>,
}

impl StoryApp {
    /// Create the app and spawn its save loop
    ///
    /// `picker` runs the first time a completed export needs a destination.
    pub fn new(
        config: Config,
        manager: CaptureSessionManager,
        transcoder: Arc<dyn StoryTranscoder>,
        picker: PickerFactory,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<AppNotice>) {
        let (recorder, events) = Recorder::new(config.max_duration());
        let (notices, notices_rx) = mpsc::unbounded_channel();
        let save = SaveStage::new(transcoder, Arc::new(LazyPicker::new(picker)), notices);

        let save_task = tokio::spawn(save.clone().run(events));

        let app = Arc::new(Self {
            config,
            manager,
            recorder,
            save,
            save_task: Mutex::new(Some(save_task)),
            devices: Mutex::new(DeviceList::default()),
        });
        (app, notices_rx)
    }

    /// App on the GStreamer capture backend, portal permissions and the
    /// GStreamer transcoder
    pub fn with_gstreamer(
        config: Config,
        picker: PickerFactory,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<AppNotice>) {
        let permissions = Arc::new(Permissions::new(Arc::new(PortalPermissions)));
        let backend = Arc::new(GstCaptureBackend::new(&config));
        let manager = CaptureSessionManager::new(backend, permissions);
        let transcoder = Arc::new(Transcoder::new(&config));
        Self::new(config, manager, transcoder, picker)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn subscribe_preview(&self) -> watch::Receiver<Option<PreviewHandle>> {
        self.manager.subscribe_preview()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RecorderStatus> {
        self.recorder.subscribe()
    }

    pub fn subscribe_saving(&self) -> watch::Receiver<bool> {
        self.save.subscribe_saving()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub async fn devices(&self) -> DeviceList {
        self.devices.lock().await.clone()
    }

    /// Open a session on the default (or previously chosen) devices
    pub async fn open(&self, devices: DeviceList) -> AppResult<SessionInfo> {
        let mut selection = self.manager.selection().await;
        selection.apply_defaults(&devices);
        *self.devices.lock().await = devices;

        let video = selection.video.ok_or(DeviceError::NoVideoDevice)?;
        let audio = selection.audio.ok_or(DeviceError::NoAudioDevice)?;
        self.manager.open(video, audio).await
    }

    /// Open a session on explicitly chosen devices
    pub async fn open_with(&self, devices: DeviceList, video: usize, audio: usize) -> AppResult<SessionInfo> {
        let camera = devices.video.get(video).cloned().ok_or(DeviceError::NoVideoDevice)?;
        let microphone = devices.audio.get(audio).cloned().ok_or(DeviceError::NoAudioDevice)?;
        *self.devices.lock().await = devices;
        self.manager.open(camera, microphone).await
    }

    pub async fn start_recording(&self) -> AppResult<RecordingHandle> {
        let (sink, level) = self
            .manager
            .recording_endpoints()
            .await
            .ok_or(RecordingError::NoActiveSession)?;
        Ok(self
            .recorder
            .start(sink, level, &storage::temp_recording_path())?)
    }

    /// Stop recording; the save flow continues in the background
    pub fn stop_recording(&self) -> bool {
        self.recorder.stop()
    }

    pub async fn toggle_recording(&self) -> AppResult<()> {
        if self.recorder.is_recording() {
            self.stop_recording();
        } else {
            self.start_recording().await?;
        }
        Ok(())
    }

    /// Switch one device; refused while recording
    pub async fn switch_device(&self, device: Device) -> AppResult<SessionInfo> {
        if self.recorder.is_recording() {
            return Err(DeviceError::RecordingActive.into());
        }
        self.manager
            .swap(device)
            .await
            .map_err(|e| AppError::Other(format!("Swap task failed: {}", e)))?
    }

    /// Switch to the next device of `kind`, wrapping around
    pub async fn cycle_device(&self, kind: MediaKind) -> AppResult<Option<SessionInfo>> {
        let devices = self.devices.lock().await.clone();
        let candidates = devices.of_kind(kind);
        if candidates.len() < 2 {
            return Ok(None);
        }
        let selection = self.manager.selection().await;
        let current = match kind {
            MediaKind::Video => selection.video,
            MediaKind::Audio => selection.audio,
        };
        let index = current
            .and_then(|c| candidates.iter().position(|d| *d == c))
            .map(|i| (i + 1) % candidates.len())
            .unwrap_or(0);
        info!(kind = %kind, device = %candidates[index].name, "Cycling device");
        self.switch_device(candidates[index].clone())
            .await
            .map(Some)
    }

    /// Cancel a running export
    pub fn cancel_export(&self) -> bool {
        self.save.cancel_export()
    }

    /// Stop everything and release the devices
    ///
    /// A recording still running is stopped and its raw file deleted; a
    /// running export is cancelled. Returns once the save loop has ended.
    pub async fn shutdown(&self) {
        self.recorder.stop();
        self.recorder.settle().await;
        self.save.close();
        if let Some(task) = self.save_task.lock().await.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Save loop ended abnormally");
        }
        self.manager.close().await;
    }
}
