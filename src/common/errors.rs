use std::{path::PathBuf, process::ExitStatus};

use log::{debug, warn};
use thiserror::Error;

/// Why a single queued file could not be filed.
///
/// None of these stop the supervisor; the file is left where it was so a
/// later filesystem event (e.g. `touch`) can retry it.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("source file {0:?} no longer exists")]
    SourceMissing(PathBuf),

    #[error("destination file {destination:?} already exists, could not rename {origin:?}")]
    DestinationExists {
        origin: PathBuf,
        destination: PathBuf,
    },

    #[error("`{program}` exited with {status} for {input:?}: {stderr}")]
    EncoderFailed {
        program: String,
        input: PathBuf,
        status: ExitStatus,
        stderr: String,
    },

    #[error("failed to probe {path:?}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl DispatchError {
    /// Duplicate delivery of an already handled file ends here.
    pub fn is_duplicate_delivery(&self) -> bool {
        matches!(self, DispatchError::SourceMissing(_))
    }
}

/// Log a per-item failure at the level its kind deserves.
pub fn handle_error(error: &DispatchError) {
    if error.is_duplicate_delivery() {
        debug!("{}", error);
    } else {
        match error {
            DispatchError::Io(err) => warn!("{:?}", err),
            other => warn!("{}", other),
        }
    }
}
