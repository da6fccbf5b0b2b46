// SPDX-License-Identifier: GPL-3.0-only

//! Camera and microphone access
//!
//! Each media kind has a [`PermissionGate`] that leaves `Unknown` exactly once.
//! The platform is only asked while a gate is `Unknown`, so a denial is sticky
//! for the life of the process and prompts never stack.

use super::camera::MediaKind;
use crate::errors::PermissionError;
use futures::StreamExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

/// Authorization state of one media kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Single-transition permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionGate {
    state: PermissionState,
}

impl PermissionGate {
    pub fn state(&self) -> PermissionState {
        self.state
    }

    /// Record the platform's answer; only the first answer counts
    pub fn transition(&mut self, answer: PermissionState) -> PermissionState {
        if self.state == PermissionState::Unknown && answer != PermissionState::Unknown {
            self.state = answer;
        }
        self.state
    }
}

/// Something that can ask the platform for access
pub trait PermissionProvider: Send + Sync {
    fn request(&self, kind: MediaKind) -> BoxFuture<'_, PermissionState>;
}

/// Ordered camera-then-microphone authorization
pub struct Permissions {
    provider: Arc<dyn PermissionProvider>,
    gates: Mutex<(PermissionGate, PermissionGate)>,
}

impl Permissions {
    pub fn new(provider: Arc<dyn PermissionProvider>) -> Self {
        Self {
            provider,
            gates: Mutex::new(Default::default()),
        }
    }

    /// Ensure both kinds are granted, asking camera first
    ///
    /// A denied camera short-circuits: the microphone is never asked.
    pub async fn ensure(&self) -> Result<(), PermissionError> {
        let mut gates = self.gates.lock().await;
        let (camera, microphone) = &mut *gates;

        if camera.state() == PermissionState::Unknown {
            let answer = self.provider.request(MediaKind::Video).await;
            camera.transition(answer);
            info!(answer = ?camera.state(), "Camera permission");
        }
        if camera.state() != PermissionState::Granted {
            return Err(PermissionError::CameraDenied);
        }

        if microphone.state() == PermissionState::Unknown {
            let answer = self.provider.request(MediaKind::Audio).await;
            microphone.transition(answer);
            info!(answer = ?microphone.state(), "Microphone permission");
        }
        if microphone.state() != PermissionState::Granted {
            return Err(PermissionError::MicrophoneDenied);
        }

        Ok(())
    }

    pub async fn state(&self, kind: MediaKind) -> PermissionState {
        let gates = self.gates.lock().await;
        match kind {
            MediaKind::Video => gates.0.state(),
            MediaKind::Audio => gates.1.state(),
        }
    }
}

/// Permissions through the XDG desktop portal
///
/// The Camera portal gates video. Audio access is mediated by PipeWire itself,
/// so the microphone is granted here. Without a portal (unsandboxed desktop
/// sessions) access is granted.
#[derive(Debug, Default)]
pub struct PortalPermissions;

impl PermissionProvider for PortalPermissions {
    fn request(&self, kind: MediaKind) -> BoxFuture<'_, PermissionState> {
        Box::pin(async move {
            match kind {
                MediaKind::Video => match access_camera().await {
                    Ok(state) => state,
                    Err(e) => {
                        debug!(error = %e, "Camera portal unavailable, assuming access");
                        PermissionState::Granted
                    }
                },
                MediaKind::Audio => PermissionState::Granted,
            }
        })
    }
}

/// Fixed answers, for headless use
#[derive(Debug, Clone, Copy)]
pub struct StaticPermissions {
    pub camera: PermissionState,
    pub microphone: PermissionState,
}

impl PermissionProvider for StaticPermissions {
    fn request(&self, kind: MediaKind) -> BoxFuture<'_, PermissionState> {
        let answer = match kind {
            MediaKind::Video => self.camera,
            MediaKind::Audio => self.microphone,
        };
        Box::pin(async move { answer })
    }
}

const PORTAL_BUS_NAME: &str = "org.freedesktop.portal.Desktop";
const PORTAL_PATH: &str = "/org/freedesktop/portal/desktop";

/// Call `org.freedesktop.portal.Camera.AccessCamera` and wait for the answer
async fn access_camera() -> Result<PermissionState, String> {
    let connection = zbus::Connection::session()
        .await
        .map_err(|e| format!("Failed to connect to session D-Bus: {}", e))?;

    let camera_proxy = zbus::Proxy::new(
        &connection,
        PORTAL_BUS_NAME,
        PORTAL_PATH,
        "org.freedesktop.portal.Camera",
    )
    .await
    .map_err(|e| format!("Failed to create camera portal proxy: {}", e))?;

    let present: bool = camera_proxy
        .get_property("IsCameraPresent")
        .await
        .map_err(|e| format!("Camera portal not available: {}", e))?;
    if !present {
        warn!("Camera portal reports no camera present");
    }

    // Subscribe to the request's Response before calling so the answer cannot be missed
    let token = format!("storycam_{}", uuid::Uuid::new_v4().simple());
    let sender = connection
        .unique_name()
        .map(|name| name.as_str().trim_start_matches(':').replace('.', "_"))
        .ok_or_else(|| "D-Bus connection has no unique name".to_string())?;
    let request_path = format!("{}/request/{}/{}", PORTAL_PATH, sender, token);

    let request_proxy = zbus::Proxy::new(
        &connection,
        PORTAL_BUS_NAME,
        request_path.as_str(),
        "org.freedesktop.portal.Request",
    )
    .await
    .map_err(|e| format!("Failed to create request proxy: {}", e))?;
    let mut responses = request_proxy
        .receive_signal("Response")
        .await
        .map_err(|e| format!("Failed to subscribe to portal response: {}", e))?;

    let mut options: HashMap<&str, Value> = HashMap::new();
    options.insert("handle_token", Value::new(token.as_str()));

    let handle: OwnedObjectPath = camera_proxy
        .call("AccessCamera", &(options,))
        .await
        .map_err(|e| format!("AccessCamera failed: {}", e))?;
    debug!(handle = %handle.as_str(), "Camera access requested");

    let message = responses
        .next()
        .await
        .ok_or_else(|| "Portal closed without answering".to_string())?;
    let (response, _results): (u32, HashMap<String, OwnedValue>) = message
        .body()
        .deserialize()
        .map_err(|e| format!("Malformed portal response: {}", e))?;

    Ok(portal_response_state(response))
}

/// Portal response codes: 0 success, 1 cancelled, 2 other
fn portal_response_state(response: u32) -> PermissionState {
    match response {
        0 => PermissionState::Granted,
        _ => PermissionState::Denied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Provider that records which kinds were asked
    struct Recording {
        camera: PermissionState,
        microphone: PermissionState,
        asked: StdMutex<Vec<MediaKind>>,
    }

    impl Recording {
        fn new(camera: PermissionState, microphone: PermissionState) -> Arc<Self> {
            Arc::new(Self {
                camera,
                microphone,
                asked: StdMutex::new(Vec::new()),
            })
        }
    }

    impl PermissionProvider for Recording {
        fn request(&self, kind: MediaKind) -> BoxFuture<'_, PermissionState> {
            self.asked.lock().unwrap().push(kind);
            let answer = match kind {
                MediaKind::Video => self.camera,
                MediaKind::Audio => self.microphone,
            };
            Box::pin(async move { answer })
        }
    }

    #[test]
    fn test_gate_transitions_once() {
        let mut gate = PermissionGate::default();
        assert_eq!(gate.transition(PermissionState::Unknown), PermissionState::Unknown);
        assert_eq!(gate.transition(PermissionState::Denied), PermissionState::Denied);
        assert_eq!(gate.transition(PermissionState::Granted), PermissionState::Denied);
    }

    #[tokio::test]
    async fn test_camera_denied_never_asks_microphone() {
        let provider = Recording::new(PermissionState::Denied, PermissionState::Granted);
        let permissions = Permissions::new(provider.clone());

        assert_eq!(permissions.ensure().await, Err(PermissionError::CameraDenied));
        assert_eq!(*provider.asked.lock().unwrap(), vec![MediaKind::Video]);
    }

    #[tokio::test]
    async fn test_asks_camera_then_microphone_once() {
        let provider = Recording::new(PermissionState::Granted, PermissionState::Granted);
        let permissions = Permissions::new(provider.clone());

        assert_eq!(permissions.ensure().await, Ok(()));
        assert_eq!(permissions.ensure().await, Ok(()));
        assert_eq!(
            *provider.asked.lock().unwrap(),
            vec![MediaKind::Video, MediaKind::Audio]
        );
    }

    #[tokio::test]
    async fn test_denial_is_not_retried() {
        let provider = Recording::new(PermissionState::Granted, PermissionState::Denied);
        let permissions = Permissions::new(provider.clone());

        assert_eq!(
            permissions.ensure().await,
            Err(PermissionError::MicrophoneDenied)
        );
        assert_eq!(
            permissions.ensure().await,
            Err(PermissionError::MicrophoneDenied)
        );
        assert_eq!(provider.asked.lock().unwrap().len(), 2);
        assert_eq!(
            permissions.state(MediaKind::Audio).await,
            PermissionState::Denied
        );
    }

    #[test]
    fn test_portal_response_codes() {
        assert_eq!(portal_response_state(0), PermissionState::Granted);
        assert_eq!(portal_response_state(1), PermissionState::Denied);
        assert_eq!(portal_response_state(2), PermissionState::Denied);
    }
}
