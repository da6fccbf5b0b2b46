// SPDX-License-Identifier: GPL-3.0-only

//! Temporary files and the final save
//!
//! Recordings and exports live in the temp directory under unique names.
//! [`finalize`] asks a [`DestinationPicker`] where the export should go,
//! moves it there and always removes the temporary file.

use crate::constants::file_formats;
use crate::errors::HandoffError;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Chooses where an export is saved
pub trait DestinationPicker: Send + Sync {
    /// Destination path for a file named `suggested_name`, or `None` when
    /// the user declines
    ///
    /// May block while waiting for the user.
    fn choose(&self, suggested_name: &str) -> Option<PathBuf>;
}

/// Native save dialog
pub struct SaveDialog {
    directory: Option<PathBuf>,
}

impl SaveDialog {
    pub fn new() -> Self {
        Self {
            directory: dirs::video_dir().or_else(dirs::home_dir),
        }
    }
}

impl Default for SaveDialog {
    fn default() -> Self {
        Self::new()
    }
}

impl DestinationPicker for SaveDialog {
    fn choose(&self, suggested_name: &str) -> Option<PathBuf> {
        let mut dialog = rfd::FileDialog::new()
            .set_title("Save story")
            .set_file_name(suggested_name)
            .add_filter("MPEG-4 video", &[file_formats::EXPORT_EXTENSION]);
        if let Some(dir) = &self.directory {
            dialog = dialog.set_directory(dir);
        }
        dialog.save_file()
    }
}

/// Destination given up front, e.g. on the command line
///
/// A directory receives the suggested file name.
#[derive(Debug, Clone)]
pub struct FixedDestination {
    path: PathBuf,
}

impl FixedDestination {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DestinationPicker for FixedDestination {
    fn choose(&self, suggested_name: &str) -> Option<PathBuf> {
        if self.path.is_dir() {
            Some(self.path.join(suggested_name))
        } else {
            Some(self.path.clone())
        }
    }
}

/// `Story_<unix seconds>.mp4`
pub fn suggested_name() -> String {
    file_formats::export_file_name(chrono::Utc::now().timestamp())
}

/// Unique path for a raw recording; the writer picks the extension
pub fn temp_recording_path() -> PathBuf {
    std::env::temp_dir().join(format!("storycam-{}.raw", uuid::Uuid::new_v4()))
}

/// Unique path for an export
pub fn temp_export_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "storycam-{}.{}",
        uuid::Uuid::new_v4(),
        file_formats::EXPORT_EXTENSION
    ))
}

/// Remove a temporary file, logging failures
pub fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed temporary file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary file"),
    }
}

/// Move `from` to `to`, copying when they are on different filesystems
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("Destination on another filesystem, copying");
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

/// Save `exported` where `picker` says; blocking
pub fn finalize_blocking(exported: &Path, picker: &dyn DestinationPicker) -> Result<PathBuf, HandoffError> {
    let suggested = suggested_name();
    let Some(destination) = picker.choose(&suggested) else {
        info!("Save declined, discarding export");
        discard(exported);
        return Err(HandoffError::UserCancelled);
    };

    let moved = move_file(exported, &destination);
    discard(exported);

    match moved {
        Ok(()) => {
            info!(path = %destination.display(), "Story saved");
            Ok(destination)
        }
        Err(e) => {
            warn!(path = %destination.display(), error = %e, "Failed to save story");
            Err(e.into())
        }
    }
}

/// Save `exported` where `picker` says, off the async runtime
pub async fn finalize(exported: PathBuf, picker: Arc<dyn DestinationPicker>) -> Result<PathBuf, HandoffError> {
    tokio::task::spawn_blocking(move || finalize_blocking(&exported, picker.as_ref()))
        .await
        .map_err(|e| HandoffError::Io(format!("Save task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Declines;

    impl DestinationPicker for Declines {
        fn choose(&self, _: &str) -> Option<PathBuf> {
            None
        }
    }

    fn export_in(dir: &Path) -> PathBuf {
        let path = dir.join("export.mp4");
        std::fs::write(&path, b"story bytes").unwrap();
        path
    }

    #[test]
    fn test_suggested_name_format() {
        let name = suggested_name();
        let stamp = name
            .strip_prefix("Story_")
            .and_then(|rest| rest.strip_suffix(".mp4"))
            .unwrap();
        assert!(stamp.parse::<i64>().is_ok());
    }

    #[test]
    fn test_temp_paths_are_unique() {
        assert_ne!(temp_recording_path(), temp_recording_path());
        assert_eq!(temp_export_path().extension().unwrap(), "mp4");
    }

    #[tokio::test]
    async fn test_accept_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let exported = export_in(dir.path());
        let target = dir.path().join("saved.mp4");

        let saved = finalize(exported.clone(), Arc::new(FixedDestination::new(&target)))
            .await
            .unwrap();

        assert_eq!(saved, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"story bytes");
        assert!(!exported.exists());
    }

    #[tokio::test]
    async fn test_directory_gets_suggested_name() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let exported = export_in(dir.path());

        let saved = finalize(exported, Arc::new(FixedDestination::new(out.path())))
            .await
            .unwrap();

        assert_eq!(saved.parent().unwrap(), out.path());
        assert!(saved.file_name().unwrap().to_string_lossy().starts_with("Story_"));
        assert!(saved.exists());
    }

    #[tokio::test]
    async fn test_decline_deletes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let exported = export_in(dir.path());

        let result = finalize(exported.clone(), Arc::new(Declines)).await;

        assert_eq!(result, Err(HandoffError::UserCancelled));
        assert!(!exported.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_move_failure_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let exported = export_in(dir.path());
        let unreachable = dir.path().join("missing").join("story.mp4");

        let result = finalize(exported.clone(), Arc::new(FixedDestination::new(&unreachable))).await;

        assert!(matches!(result, Err(HandoffError::Io(_))));
        assert!(!exported.exists());
        assert!(!unreachable.exists());
    }
}
