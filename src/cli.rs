// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - Listing cameras and microphones
//! - Recording a story without the terminal UI
//! - Exporting an existing video to the story format

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use storycam::app::{AppNotice, PickerFactory, StoryApp};
use storycam::backends::camera::{DeviceList, MediaKind, list_devices};
use storycam::config::Config;
use storycam::media::encoders::log_available_encoders;
use storycam::pipelines::transcode::{ExportOutcome, StoryTranscoder, Transcoder};
use storycam::storage::{self, DestinationPicker, FixedDestination};
use tokio::sync::mpsc::error::TryRecvError;

const POLL: Duration = Duration::from_millis(100);

/// List all cameras and microphones
pub fn list_devices_command() -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;

    let devices = list_devices();
    if devices.is_empty() {
        println!("No capture devices found.");
        return Ok(());
    }

    println!("Cameras:");
    print_group(&devices, MediaKind::Video);
    println!();
    println!("Microphones:");
    print_group(&devices, MediaKind::Audio);

    let report = log_available_encoders();
    println!();
    match report.h264.first() {
        Some(encoder) => println!("Story export: {}", encoder),
        None => println!("Story export: unavailable (no H.264 encoder)"),
    }
    Ok(())
}

fn print_group(devices: &DeviceList, kind: MediaKind) {
    let group = devices.of_kind(kind);
    if group.is_empty() {
        println!("  (none)");
    }
    for (index, device) in group.iter().enumerate() {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("  [{}] {}{}", index, device.name, marker);
    }
}

/// Record one story and save it to `output`
pub fn record_story(
    camera: usize,
    microphone: Option<usize>,
    duration: Option<u64>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;
    let config = Config::default().with_max_duration(duration)?;

    let devices = list_devices();
    if devices.video.is_empty() {
        return Err("No cameras found".into());
    }
    if camera >= devices.video.len() {
        return Err(format!(
            "Camera index {} out of range (0-{})",
            camera,
            devices.video.len() - 1
        )
        .into());
    }
    let microphone = match microphone {
        Some(index) => index,
        None => devices
            .default_audio()
            .and_then(|d| devices.audio.iter().position(|a| a == d))
            .ok_or("No microphones found")?,
    };

    let destination = prepare_destination(output)?;
    println!("Output: {}", destination.display());
    println!("Max duration: {} seconds", config.max_duration_secs);

    let runtime = tokio::runtime::Runtime::new()?;
    let picker = fixed_picker(destination);
    let (app, mut notices) = {
        let _guard = runtime.enter();
        StoryApp::with_gstreamer(config, picker)
    };

    let session = runtime.block_on(app.open_with(devices, camera, microphone))?;
    println!("Camera: {}", session.video.name);
    println!("Microphone: {}", session.audio.name);

    // Set up Ctrl+C handler
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    println!();
    println!("Recording... (press Ctrl+C to stop early)");
    runtime.block_on(app.start_recording())?;

    let status = app.subscribe_status();
    loop {
        if interrupted.swap(false, Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            app.stop_recording();
            break;
        }
        let now = *status.borrow();
        if !now.is_recording {
            break;
        }
        let secs = now.time_remaining.as_secs();
        print!("\rRemaining: {:02}:{:02}", secs / 60, secs % 60);
        std::io::stdout().flush()?;
        std::thread::sleep(POLL);
    }
    println!();
    println!("Exporting... (press Ctrl+C to abandon)");

    let notice = loop {
        match notices.try_recv() {
            Ok(notice) => break Some(notice),
            Err(TryRecvError::Disconnected) => break None,
            Err(TryRecvError::Empty) => {
                if interrupted.swap(false, Ordering::SeqCst) && app.cancel_export() {
                    println!("Cancelling export...");
                }
                std::thread::sleep(POLL);
            }
        }
    };
    runtime.block_on(app.shutdown());

    match notice {
        Some(AppNotice::Saved(path)) => {
            println!("Story saved: {}", path.display());
            Ok(())
        }
        Some(AppNotice::SaveCancelled) => Err("Story was not saved".into()),
        Some(AppNotice::Error(message)) => Err(message.into()),
        None => Err("Recorder stopped unexpectedly".into()),
    }
}

/// Export an existing video to the story format
pub fn transcode_file(input: PathBuf, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    gstreamer::init()?;
    if !input.is_file() {
        return Err(format!("No such file: {}", input.display()).into());
    }

    let destination = prepare_destination(output)?;
    let transcoder = Transcoder::new(&Config::default());
    let runtime = tokio::runtime::Runtime::new()?;

    println!("Exporting {}...", input.display());
    let job = runtime.block_on(transcoder.transcode(input, storage::temp_export_path()))?;

    let cancel = job.cancel_flag();
    ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
    })?;

    match runtime.block_on(job.wait()) {
        ExportOutcome::Completed(exported) => {
            let saved = storage::finalize_blocking(&exported, &FixedDestination::new(destination))?;
            println!("Story saved: {}", saved.display());
            Ok(())
        }
        ExportOutcome::Failed(message) => Err(format!("Export failed: {}", message).into()),
        ExportOutcome::Cancelled => Err("Export was cancelled".into()),
    }
}

fn fixed_picker(destination: PathBuf) -> PickerFactory {
    Box::new(move || Arc::new(FixedDestination::new(destination.clone())) as Arc<dyn DestinationPicker>)
}

/// Resolve `output` and make sure its directory exists
fn prepare_destination(output: Option<PathBuf>) -> Result<PathBuf, std::io::Error> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Ok(path)
        }
        None => {
            let dir = default_story_dir();
            std::fs::create_dir_all(&dir)?;
            Ok(dir)
        }
    }
}

fn default_story_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| Path::new(".").to_path_buf())
}
