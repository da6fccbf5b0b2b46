// SPDX-License-Identifier: GPL-3.0-only

//! Capture session lifecycle manager
//!
//! The manager owns at most one live session. Opening or swapping always:
//! 1. clears the published preview
//! 2. stops and unwires the old session (devices released)
//! 3. builds and starts the new one on the blocking pool
//! 4. publishes the new preview only after the session reports playing
//!
//! All four steps run under one async mutex so two sessions never coexist.

use super::types::*;
use super::{CaptureBackend, LevelSource, LiveSession, RecordingSink};
use crate::backends::permissions::Permissions;
use crate::errors::{AppError, AppResult, DeviceError};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Devices of the session that is live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: u64,
    pub video: Device,
    pub audio: Device,
}

struct ActiveSession {
    info: SessionInfo,
    session: Box<dyn LiveSession>,
}

/// Internal manager state
#[derive(Default)]
struct ManagerState {
    active: Option<ActiveSession>,
    selection: DeviceSelection,
    next_id: u64,
}

#[derive(Clone)]
pub struct CaptureSessionManager {
    backend: Arc<dyn CaptureBackend>,
    permissions: Arc<Permissions>,
    state: Arc<Mutex<ManagerState>>,
    preview: Arc<watch::Sender<Option<PreviewHandle>>>,
}

impl CaptureSessionManager {
    pub fn new(backend: Arc<dyn CaptureBackend>, permissions: Arc<Permissions>) -> Self {
        let (preview, _) = watch::channel(None);
        Self {
            backend,
            permissions,
            state: Arc::new(Mutex::new(ManagerState::default())),
            preview: Arc::new(preview),
        }
    }

    /// Preview of the live session; `None` while no session runs
    pub fn subscribe_preview(&self) -> watch::Receiver<Option<PreviewHandle>> {
        self.preview.subscribe()
    }

    /// Authorize, then open a session on `video` + `audio`
    ///
    /// Any session already open is torn down first.
    pub async fn open(&self, video: Device, audio: Device) -> AppResult<SessionInfo> {
        self.permissions.ensure().await?;

        let mut state = self.state.lock().await;
        self.rebuild(&mut state, video, audio).await
    }

    /// Release the session and its devices
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        self.preview.send_replace(None);

        if let Some(mut active) = state.active.take() {
            info!(session = active.info.session_id, "Closing capture session");
            let result = tokio::task::spawn_blocking(move || {
                active.session.stop();
                active.session.unwire();
            })
            .await;
            if let Err(e) = result {
                warn!(error = %e, "Session teardown task failed");
            }
        }
    }

    /// Replace the device of `device.kind` and rebuild the session
    ///
    /// Returns immediately; the outcome is observable through the preview
    /// channel or by awaiting the handle.
    pub fn swap(&self, device: Device) -> JoinHandle<AppResult<SessionInfo>> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut state = manager.state.lock().await;
            info!(kind = %device.kind, device = %device.name, "Swapping device");

            let mut selection = state.selection.clone();
            selection.replace(device);
            let (video, audio) = match selection.complete() {
                Some((video, audio)) => (video.clone(), audio.clone()),
                None if selection.video.is_none() => return Err(DeviceError::NoVideoDevice.into()),
                None => return Err(DeviceError::NoAudioDevice.into()),
            };

            manager.rebuild(&mut state, video, audio).await
        })
    }

    /// Current device choice
    pub async fn selection(&self) -> DeviceSelection {
        self.state.lock().await.selection.clone()
    }

    pub async fn current(&self) -> Option<SessionInfo> {
        self.state.lock().await.active.as_ref().map(|a| a.info.clone())
    }

    /// File output and level source of the live session
    pub async fn recording_endpoints(&self) -> Option<(Arc<dyn RecordingSink>, Arc<dyn LevelSource>)> {
        let state = self.state.lock().await;
        state
            .active
            .as_ref()
            .map(|a| (a.session.output(), a.session.level()))
    }

    async fn rebuild(
        &self,
        state: &mut ManagerState,
        video: Device,
        audio: Device,
    ) -> AppResult<SessionInfo> {
        // The old preview must disappear before anything new is built
        self.preview.send_replace(None);

        let previous = state.active.take();
        state.next_id += 1;
        let session_id = state.next_id;

        let backend = Arc::clone(&self.backend);
        let (v, a) = (video.clone(), audio.clone());
        let built = tokio::task::spawn_blocking(move || -> Result<_, DeviceError> {
            if let Some(mut old) = previous {
                info!(session = old.info.session_id, "Tearing down previous session");
                old.session.stop();
                old.session.unwire();
                drop(old);
            }

            let mut session = backend.build(&v, &a)?;
            match session.start() {
                Ok(frames) => Ok((session, frames)),
                Err(e) => {
                    session.stop();
                    session.unwire();
                    Err(e)
                }
            }
        })
        .await
        .map_err(|e| AppError::Other(format!("Session task failed: {}", e)))?;

        let (session, frames) = built?;

        let info = SessionInfo {
            session_id,
            video: video.clone(),
            audio: audio.clone(),
        };
        state.selection = DeviceSelection {
            video: Some(video),
            audio: Some(audio),
        };
        state.active = Some(ActiveSession {
            info: info.clone(),
            session,
        });

        self.preview.send_replace(Some(PreviewHandle {
            session_id,
            camera: info.video.name.clone(),
            microphone: info.audio.name.clone(),
            frames,
        }));
        info!(session = session_id, camera = %info.video.name, microphone = %info.audio.name, "Capture session live");

        Ok(info)
    }
}
