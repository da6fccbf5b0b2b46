// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the story recorder
//!
//! Every error here is terminal for the user action that raised it, never for
//! the process. [`AppError::user_message`] gives the text shown in the modal.

use std::fmt;
use std::path::PathBuf;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera or microphone access was refused
    Permission(PermissionError),
    /// Device or capture session errors
    Device(DeviceError),
    /// Recording-related errors
    Recording(RecordingError),
    /// Errors raised before an export could start
    Transcode(TranscodeError),
    /// Asynchronous export ended without producing a file
    Export(ExportFailure),
    /// The user dismissed the destination dialog
    UserCancelled,
    /// Storage/filesystem errors
    Io(String),
    /// Configuration errors
    Config(String),
    /// Generic error with message
    Other(String),
}

/// Permission errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionError {
    CameraDenied,
    MicrophoneDenied,
}

/// Capture device and session errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// No camera devices found
    NoVideoDevice,
    /// No microphone devices found
    NoAudioDevice,
    /// The session refused an input device
    InputRejected(String),
    /// The session refused the file output
    OutputRejected(String),
    /// The session did not reach the playing state
    StartFailed(String),
    /// Devices cannot change while a recording is running
    RecordingActive,
}

/// Recording-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    /// No session is open to record from
    NoActiveSession,
    /// Failed to start recording
    StartFailed(String),
    /// Failed to stop recording
    StopFailed(String),
    /// Encoder not available
    EncoderNotAvailable(String),
    /// Pipeline error during recording
    PipelineError(String),
}

/// Errors that prevent an export from starting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeError {
    /// The raw recording has no video stream
    MissingVideoTrack(PathBuf),
    /// The raw recording could not be inspected
    Inspect(String),
    /// The export graph could not be built or started
    ExportSession(String),
}

/// Terminal non-success states of an export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportFailure {
    Failed(String),
    Cancelled,
}

/// Errors of the persistence handoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffError {
    /// The destination dialog was dismissed
    UserCancelled,
    /// Moving the export to its destination failed
    Io(String),
}

impl AppError {
    /// Short text for the blocking error modal
    pub fn user_message(&self) -> String {
        match self {
            AppError::Permission(_) => "Camera unavailable".to_string(),
            AppError::Device(DeviceError::NoVideoDevice) => "Camera unavailable".to_string(),
            AppError::Device(DeviceError::RecordingActive) => {
                "Stop recording before switching devices".to_string()
            }
            AppError::Export(ExportFailure::Cancelled) => "Export was cancelled".to_string(),
            AppError::UserCancelled => "Recording discarded".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Permission(e) => write!(f, "Permission error: {}", e),
            AppError::Device(e) => write!(f, "Device error: {}", e),
            AppError::Recording(e) => write!(f, "Recording error: {}", e),
            AppError::Transcode(e) => write!(f, "Transcode error: {}", e),
            AppError::Export(e) => write!(f, "Export error: {}", e),
            AppError::UserCancelled => write!(f, "Cancelled by user"),
            AppError::Io(msg) => write!(f, "Storage error: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for PermissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionError::CameraDenied => write!(f, "Camera access denied"),
            PermissionError::MicrophoneDenied => write!(f, "Microphone access denied"),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NoVideoDevice => write!(f, "No camera devices found"),
            DeviceError::NoAudioDevice => write!(f, "No audio device available"),
            DeviceError::InputRejected(msg) => write!(f, "Input rejected: {}", msg),
            DeviceError::OutputRejected(msg) => write!(f, "Output rejected: {}", msg),
            DeviceError::StartFailed(msg) => write!(f, "Session failed to start: {}", msg),
            DeviceError::RecordingActive => write!(f, "Recording in progress"),
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::NoActiveSession => write!(f, "No capture session is open"),
            RecordingError::StartFailed(msg) => write!(f, "Failed to start recording: {}", msg),
            RecordingError::StopFailed(msg) => write!(f, "Failed to stop recording: {}", msg),
            RecordingError::EncoderNotAvailable(msg) => write!(f, "Encoder not available: {}", msg),
            RecordingError::PipelineError(msg) => write!(f, "Pipeline error: {}", msg),
        }
    }
}

impl fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscodeError::MissingVideoTrack(path) => {
                write!(f, "No video track in {}", path.display())
            }
            TranscodeError::Inspect(msg) => write!(f, "Could not read recording: {}", msg),
            TranscodeError::ExportSession(msg) => write!(f, "Could not start export: {}", msg),
        }
    }
}

impl fmt::Display for ExportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFailure::Failed(msg) => write!(f, "Export failed: {}", msg),
            ExportFailure::Cancelled => write!(f, "Export cancelled"),
        }
    }
}

impl fmt::Display for HandoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoffError::UserCancelled => write!(f, "Save cancelled"),
            HandoffError::Io(msg) => write!(f, "Could not save video: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for PermissionError {}
impl std::error::Error for DeviceError {}
impl std::error::Error for RecordingError {}
impl std::error::Error for TranscodeError {}
impl std::error::Error for ExportFailure {}
impl std::error::Error for HandoffError {}

// Conversions from sub-errors to AppError
impl From<PermissionError> for AppError {
    fn from(err: PermissionError) -> Self {
        AppError::Permission(err)
    }
}

impl From<DeviceError> for AppError {
    fn from(err: DeviceError) -> Self {
        AppError::Device(err)
    }
}

impl From<RecordingError> for AppError {
    fn from(err: RecordingError) -> Self {
        AppError::Recording(err)
    }
}

impl From<TranscodeError> for AppError {
    fn from(err: TranscodeError) -> Self {
        AppError::Transcode(err)
    }
}

impl From<ExportFailure> for AppError {
    fn from(err: ExportFailure) -> Self {
        AppError::Export(err)
    }
}

impl From<HandoffError> for AppError {
    fn from(err: HandoffError) -> Self {
        match err {
            HandoffError::UserCancelled => AppError::UserCancelled,
            HandoffError::Io(msg) => AppError::Io(msg),
        }
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<std::io::Error> for HandoffError {
    fn from(err: std::io::Error) -> Self {
        HandoffError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_errors_read_as_camera_unavailable() {
        assert_eq!(
            AppError::from(PermissionError::CameraDenied).user_message(),
            "Camera unavailable"
        );
        assert_eq!(
            AppError::from(PermissionError::MicrophoneDenied).user_message(),
            "Camera unavailable"
        );
    }

    #[test]
    fn test_handoff_cancel_maps_to_user_cancelled() {
        assert!(matches!(
            AppError::from(HandoffError::UserCancelled),
            AppError::UserCancelled
        ));
        assert!(matches!(
            AppError::from(HandoffError::Io("disk full".into())),
            AppError::Io(_)
        ));
    }

    #[test]
    fn test_export_failure_message_is_distinct() {
        let failed = AppError::from(ExportFailure::Failed("encoder crashed".into()));
        let cancelled = AppError::from(ExportFailure::Cancelled);
        assert_ne!(failed.user_message(), cancelled.user_message());
        assert!(failed.user_message().contains("encoder crashed"));
    }
}
