// SPDX-License-Identifier: GPL-3.0-only

//! Muxer and file sink setup shared by the recording writer and the export

use gstreamer as gst;
use gstreamer::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Muxer configuration
pub struct MuxerConfig {
    /// Muxer element
    pub muxer: gst::Element,
    /// File sink element
    pub filesink: gst::Element,
    /// Output file path
    pub output_path: PathBuf,
}

/// Configure `muxer` for a seekable file and create its filesink
///
/// With `faststart` the MP4 index is moved to the head of the file so
/// playback can begin before the whole file is downloaded.
pub fn create_muxer(
    muxer: gst::Element,
    output_path: &Path,
    faststart: bool,
) -> Result<MuxerConfig, String> {
    info!(path = %output_path.display(), faststart, "Creating muxer");

    let muxer_name = muxer
        .factory()
        .map(|f| f.name().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // Non-streamable so duration and indexes are written
    if muxer.has_property("streamable") {
        muxer.set_property("streamable", false);
    }
    if faststart && muxer.has_property("faststart") {
        muxer.set_property("faststart", true);
        debug!(muxer = %muxer_name, "Enabled faststart");
    }

    let location = output_path
        .to_str()
        .ok_or_else(|| format!("Output path is not valid UTF-8: {}", output_path.display()))?;
    let filesink = gst::ElementFactory::make("filesink")
        .property("location", location)
        .build()
        .map_err(|e| format!("Failed to create filesink: {}", e))?;

    debug!(muxer = %muxer_name, "Muxer and filesink created");

    Ok(MuxerConfig {
        muxer,
        filesink,
        output_path: output_path.to_path_buf(),
    })
}

/// Link the tail of an encoded stream (encoder or parser) into the muxer
pub fn link_to_muxer(tail: &gst::Element, muxer: &gst::Element, what: &str) -> Result<(), String> {
    tail.link(muxer)
        .map_err(|_| format!("Failed to link {} to muxer", what))?;
    debug!("{} linked to muxer", what);
    Ok(())
}

/// Link muxer to filesink
pub fn link_muxer_to_sink(muxer: &gst::Element, filesink: &gst::Element) -> Result<(), String> {
    muxer
        .link(filesink)
        .map_err(|_| "Failed to link muxer to filesink".to_string())?;
    debug!("Muxer linked to filesink");
    Ok(())
}
