//! Error handling for Modelbench
//!
//! Every failure path maps to one of these variants. User-facing alerts are
//! built from `friendly_message`, logs use the `Display` form.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Modelbench operations
pub type Result<T> = std::result::Result<T, WorkbenchError>;

/// Main error type for Modelbench operations
#[derive(Error, Debug)]
pub enum WorkbenchError {
    // Connection Errors
    #[error("No model directory is connected")]
    DirectoryNotConnected,

    #[error("Permission to access {path} was revoked")]
    PermissionDenied { path: String },

    // File Errors
    #[error("Entry not found: {path}")]
    EntryNotFound { path: String },

    #[error("Failed to read file: {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}: {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory creation failed: {path}: {source}")]
    DirectoryCreateError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Discovery Errors
    #[error("No model files found for {module}")]
    NoModelFiles { module: String },

    #[error("Unknown module: {id}")]
    UnknownModule { id: String },

    #[error("Variant '{variant}' was not discovered for {module}")]
    UnknownVariant { module: String, variant: String },

    // Assembly Errors
    #[error("Required weight file missing: {path}")]
    MissingWeightFile {
        path: String,
        #[source]
        source: Box<WorkbenchError>,
    },

    // Run Rejections
    #[error("An inference run is already in progress")]
    RunInFlight,

    #[error("No input is staged")]
    NoInputStaged,

    #[error("No module is active")]
    NoActiveModule,

    #[error("Model for {module} is not available on disk")]
    ModelUnavailable { module: String },

    // Workbench Input Errors
    #[error("Too many inputs: at most {max} image(s) allowed for this module")]
    TooManyInputs { max: usize },

    #[error("Invalid value for parameter '{param}': {reason}")]
    InvalidParam { param: String, reason: String },

    #[error("Invalid audio input: {reason}")]
    InvalidAudio { reason: String },

    #[error("Comparison unavailable: {reason}")]
    ComparisonUnavailable { reason: String },

    // Worker Errors
    #[error("Inference worker error: {message}")]
    Worker { message: String },

    #[error("Inference worker is not running")]
    WorkerDisconnected,

    #[error("Timed out waiting for the inference worker")]
    WorkerTimeout,

    // Download Errors
    #[error("Download failed for {file}: {reason}")]
    Download { file: String, reason: String },

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkbenchError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            WorkbenchError::DirectoryNotConnected => "DIRECTORY_NOT_CONNECTED",
            WorkbenchError::PermissionDenied { .. } => "PERMISSION_DENIED",
            WorkbenchError::EntryNotFound { .. } => "ENTRY_NOT_FOUND",
            WorkbenchError::FileReadError { .. } => "FILE_READ_ERROR",
            WorkbenchError::FileWriteError { .. } => "FILE_WRITE_ERROR",
            WorkbenchError::DirectoryCreateError { .. } => "DIRECTORY_CREATE_ERROR",
            WorkbenchError::NoModelFiles { .. } => "NO_MODEL_FILES",
            WorkbenchError::UnknownModule { .. } => "UNKNOWN_MODULE",
            WorkbenchError::UnknownVariant { .. } => "UNKNOWN_VARIANT",
            WorkbenchError::MissingWeightFile { .. } => "MISSING_WEIGHT_FILE",
            WorkbenchError::RunInFlight => "RUN_IN_FLIGHT",
            WorkbenchError::NoInputStaged => "NO_INPUT_STAGED",
            WorkbenchError::NoActiveModule => "NO_ACTIVE_MODULE",
            WorkbenchError::ModelUnavailable { .. } => "MODEL_UNAVAILABLE",
            WorkbenchError::TooManyInputs { .. } => "TOO_MANY_INPUTS",
            WorkbenchError::InvalidParam { .. } => "INVALID_PARAM",
            WorkbenchError::InvalidAudio { .. } => "INVALID_AUDIO",
            WorkbenchError::ComparisonUnavailable { .. } => "COMPARISON_UNAVAILABLE",
            WorkbenchError::Worker { .. } => "WORKER_ERROR",
            WorkbenchError::WorkerDisconnected => "WORKER_DISCONNECTED",
            WorkbenchError::WorkerTimeout => "WORKER_TIMEOUT",
            WorkbenchError::Download { .. } => "DOWNLOAD_FAILED",
            WorkbenchError::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            WorkbenchError::Io(_) => "IO_ERROR",
            WorkbenchError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the system recovers from this error without user action
    ///
    /// Recoverable errors reset local state (status `missing`, disconnected
    /// directory) rather than interrupting the user with an alert.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WorkbenchError::DirectoryNotConnected
                | WorkbenchError::PermissionDenied { .. }
                | WorkbenchError::EntryNotFound { .. }
                | WorkbenchError::NoModelFiles { .. }
        )
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            WorkbenchError::DirectoryNotConnected | WorkbenchError::PermissionDenied { .. } => {
                "Please connect your models folder again.".to_string()
            }
            WorkbenchError::MissingWeightFile { path, .. } => {
                format!("Could not read '{}'. The selected variant is incomplete on disk.", path)
            }
            WorkbenchError::RunInFlight => {
                "Please wait for the current run to finish.".to_string()
            }
            WorkbenchError::NoInputStaged => "Add an input first.".to_string(),
            WorkbenchError::ModelUnavailable { module } => {
                format!("The model for '{}' is not downloaded yet.", module)
            }
            WorkbenchError::TooManyInputs { max } => {
                format!("This model accepts only {} image at a time.", max)
            }
            WorkbenchError::Worker { message } => format!("Inference failed: {}", message),
            WorkbenchError::Download { file, reason } => {
                format!("Download of '{}' failed: {}", file, reason)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = WorkbenchError::NoModelFiles {
            module: "Xenova/depth-anything-small-hf".to_string(),
        };
        assert_eq!(err.error_code(), "NO_MODEL_FILES");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_missing_weight_is_fatal() {
        let err = WorkbenchError::MissingWeightFile {
            path: "onnx/model.onnx".to_string(),
            source: Box::new(WorkbenchError::EntryNotFound {
                path: "onnx/model.onnx".to_string(),
            }),
        };
        assert!(!err.is_recoverable());
        assert!(err.friendly_message().contains("onnx/model.onnx"));
    }
}
