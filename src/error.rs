use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = ProfileError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Credentials file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Failed to read {}", path.display())]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to back up {} to {}", path.display(), backup.display())]
    BackupFailed {
        path: PathBuf,
        backup: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {}", path.display())]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Profile '{name}' not found in credentials or config file")]
    ProfileNotFound { name: String },

    #[error("Profile '{name}' already exists in {}", path.display())]
    DuplicateProfile { name: String, path: PathBuf },

    #[error("Invalid profile name '{name}': {reason}")]
    InvalidProfileName { name: String, reason: String },

    #[error("Profile '{name}' is missing required credentials: {}", missing.join(", "))]
    MissingCredentials { name: String, missing: Vec<String> },

    #[error("Credential validation failed for '{name}': {reason}")]
    ValidationFailed { name: String, reason: String },

    #[error("Credential validation for '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error(
        "Switch to '{name}' only partially applied: {} was updated but {} was not; re-run the switch",
        written.display(),
        failed.display()
    )]
    PartialSwitch {
        name: String,
        written: PathBuf,
        failed: PathBuf,
        source: std::io::Error,
    },

    #[error("Creating profile '{name}' aborted, nothing was written")]
    CreateAborted {
        name: String,
        source: Box<ProfileError>,
    },

    #[error("Profile '{name}' is the active default; confirmation is required to delete it")]
    ConfirmationRequired { name: String },
}

impl ProfileError {
    /// Name of the profile this error is about, if any
    pub fn profile(&self) -> Option<&str> {
        match self {
            Self::ProfileNotFound { name }
            | Self::DuplicateProfile { name, .. }
            | Self::InvalidProfileName { name, .. }
            | Self::MissingCredentials { name, .. }
            | Self::ValidationFailed { name, .. }
            | Self::Timeout { name, .. }
            | Self::PartialSwitch { name, .. }
            | Self::CreateAborted { name, .. }
            | Self::ConfirmationRequired { name } => Some(name),
            Self::FileNotFound { .. }
            | Self::ReadFailed { .. }
            | Self::BackupFailed { .. }
            | Self::WriteFailed { .. } => None,
        }
    }
}
