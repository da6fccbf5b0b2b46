// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for capture devices, sessions and preview frames

use gstreamer as gst;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Whether a device captures pictures or sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "camera"),
            MediaKind::Audio => write!(f, "microphone"),
        }
    }
}

/// A capture device as reported by the platform
///
/// Immutable once listed. The GStreamer handle, when present, creates the
/// source element for a session.
#[derive(Debug, Clone)]
pub struct Device {
    /// Stable identifier (node name or device path)
    pub id: String,
    /// Human-readable name
    pub name: String,
    pub kind: MediaKind,
    /// Platform default for its kind
    pub is_default: bool,
    pub handle: Option<gst::Device>,
}

impl Device {
    /// Device without a platform handle (tests, fallbacks)
    pub fn detached(id: impl Into<String>, name: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            is_default: false,
            handle: None,
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.kind == other.kind
    }
}

impl Eq for Device {}

/// Result of one enumeration pass
#[derive(Debug, Clone, Default)]
pub struct DeviceList {
    pub video: Vec<Device>,
    pub audio: Vec<Device>,
}

impl DeviceList {
    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }

    /// Devices of one kind
    pub fn of_kind(&self, kind: MediaKind) -> &[Device] {
        match kind {
            MediaKind::Video => &self.video,
            MediaKind::Audio => &self.audio,
        }
    }

    /// Platform default audio device, else the first one
    pub fn default_audio(&self) -> Option<&Device> {
        self.audio
            .iter()
            .find(|d| d.is_default)
            .or_else(|| self.audio.first())
    }
}

/// Currently chosen devices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelection {
    pub video: Option<Device>,
    pub audio: Option<Device>,
}

impl DeviceSelection {
    /// Fill empty slots with defaults: first camera, default microphone
    ///
    /// A slot already holding a device that is still listed keeps it.
    pub fn apply_defaults(&mut self, devices: &DeviceList) {
        if self
            .video
            .as_ref()
            .is_none_or(|chosen| !devices.video.contains(chosen))
        {
            self.video = devices.video.first().cloned();
        }
        if self
            .audio
            .as_ref()
            .is_none_or(|chosen| !devices.audio.contains(chosen))
        {
            self.audio = devices.default_audio().cloned();
        }
    }

    /// Replace the device of the same kind as `device`
    pub fn replace(&mut self, device: Device) {
        match device.kind {
            MediaKind::Video => self.video = Some(device),
            MediaKind::Audio => self.audio = Some(device),
        }
    }

    /// Both slots filled
    pub fn complete(&self) -> Option<(&Device, &Device)> {
        Some((self.video.as_ref()?, self.audio.as_ref()?))
    }
}

/// One preview frame, tightly packed RGBA
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: u32,
    pub data: Arc<[u8]>,
    pub captured_at: Instant,
}

impl PreviewFrame {
    /// RGBA of pixel (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y * self.stride + x * 4) as usize;
        let px = self.data.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Latest-frame channel of one session
pub type FrameReceiver = watch::Receiver<Option<Arc<PreviewFrame>>>;

/// Handle the UI binds to for displaying a live session
#[derive(Debug, Clone)]
pub struct PreviewHandle {
    /// Monotonic id of the session that owns the frames
    pub session_id: u64,
    pub camera: String,
    pub microphone: String,
    pub frames: FrameReceiver,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listed() -> DeviceList {
        let mut mic_b = Device::detached("mic-b", "USB Mic", MediaKind::Audio);
        mic_b.is_default = true;
        DeviceList {
            video: vec![
                Device::detached("cam-a", "Front", MediaKind::Video),
                Device::detached("cam-b", "Back", MediaKind::Video),
            ],
            audio: vec![
                Device::detached("mic-a", "Built-in", MediaKind::Audio),
                mic_b,
            ],
        }
    }

    #[test]
    fn test_defaults_pick_first_camera_and_default_mic() {
        let mut selection = DeviceSelection::default();
        selection.apply_defaults(&listed());
        assert_eq!(selection.video.unwrap().id, "cam-a");
        assert_eq!(selection.audio.unwrap().id, "mic-b");
    }

    #[test]
    fn test_defaults_keep_existing_choice() {
        let devices = listed();
        let mut selection = DeviceSelection::default();
        selection.replace(devices.video[1].clone());
        selection.apply_defaults(&devices);
        assert_eq!(selection.video.unwrap().id, "cam-b");
    }

    #[test]
    fn test_default_audio_falls_back_to_first() {
        let mut devices = listed();
        devices.audio.iter_mut().for_each(|d| d.is_default = false);
        assert_eq!(devices.default_audio().unwrap().id, "mic-a");
    }

    #[test]
    fn test_empty_list_leaves_selection_empty() {
        let mut selection = DeviceSelection::default();
        selection.apply_defaults(&DeviceList::default());
        assert!(selection.complete().is_none());
    }

    #[test]
    fn test_preview_pixel_bounds() {
        let frame = PreviewFrame {
            width: 2,
            height: 1,
            stride: 8,
            data: Arc::from(vec![1, 2, 3, 4, 5, 6, 7, 8]),
            captured_at: Instant::now(),
        };
        assert_eq!(frame.pixel(1, 0), Some([5, 6, 7, 8]));
        assert_eq!(frame.pixel(2, 0), None);
    }
}
