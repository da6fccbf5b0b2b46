// SPDX-License-Identifier: GPL-3.0-only

//! Device enumeration through the GStreamer device monitor
//!
//! A pure query: nothing is opened and an empty result is valid.

use super::types::{Device, DeviceList, MediaKind};
use crate::backends::audio;
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info, warn};

/// Device class filter for a media kind
fn device_class(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "Video/Source",
        MediaKind::Audio => "Audio/Source",
    }
}

/// Property keys that identify a device across runs, most specific first
const ID_PROPERTIES: &[&str] = &["node.name", "device.path", "api.v4l2.path", "device.name"];

/// List all cameras and microphones
///
/// The default microphone is taken from the provider's `is-default` flag,
/// falling back to PipeWire's `default.audio.source` metadata.
pub fn list_devices() -> DeviceList {
    if let Err(e) = gst::init() {
        warn!(error = %e, "GStreamer unavailable, no devices listed");
        return DeviceList::default();
    }

    let video = monitor_devices(MediaKind::Video);
    let mut audio = monitor_devices(MediaKind::Audio);

    if !audio.iter().any(|d| d.is_default)
        && let Some(default_node) = audio::default_source_node()
        && let Some(device) = audio.iter_mut().find(|d| d.id == default_node)
    {
        device.is_default = true;
    }

    // Default microphone first, matching the order users expect in pickers
    audio.sort_by_key(|d| !d.is_default);

    info!(
        cameras = video.len(),
        microphones = audio.len(),
        "Enumerated capture devices"
    );
    DeviceList { video, audio }
}

fn monitor_devices(kind: MediaKind) -> Vec<Device> {
    let monitor = gst::DeviceMonitor::new();
    monitor.add_filter(Some(device_class(kind)), None);

    if let Err(e) = monitor.start() {
        warn!(kind = %kind, error = %e, "Failed to start device monitor");
        return Vec::new();
    }

    let mut devices = Vec::new();
    for (index, device) in monitor.devices().into_iter().enumerate() {
        let name = device.display_name().to_string();
        let props = device.properties();

        let id = props
            .as_ref()
            .and_then(|p| {
                ID_PROPERTIES
                    .iter()
                    .find_map(|key| p.get::<String>(*key).ok())
            })
            .unwrap_or_else(|| format!("{}-{}", kind, index));

        let is_default = props
            .as_ref()
            .and_then(|p| p.get::<bool>("is-default").ok())
            .unwrap_or(false);

        debug!(kind = %kind, id = %id, name = %name, is_default, "Found device");

        // Some providers report the same node twice (e.g. PipeWire and V4L2)
        if devices.iter().any(|d: &Device| d.id == id) {
            continue;
        }

        devices.push(Device {
            id,
            name,
            kind,
            is_default,
            handle: Some(device),
        });
    }

    monitor.stop();
    devices
}

/// Create the source element for a listed device
pub fn create_source(device: &Device, name: &str) -> Result<gst::Element, String> {
    match &device.handle {
        Some(handle) => handle
            .create_element(Some(name))
            .map_err(|e| format!("{} '{}' refused to open: {}", device.kind, device.name, e)),
        None => Err(format!(
            "{} '{}' has no platform handle",
            device.kind, device.name
        )),
    }
}
