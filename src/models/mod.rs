//! Plain data carried between the watcher, the queue and the dispatcher.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use chrono::{DateTime, FixedOffset};

use crate::{
    common::{CANONICAL_VIDEO_EXTENSION, RAW_VIDEO_CONTAINER_EXTENSIONS, VALID_IMAGE_EXTENSIONS},
    utils::PathExt,
};

/// A timezone-aware capture time read from the file's own metadata.
///
/// The offset is whatever wall clock the capture happened on; name formatting
/// uses that wall clock as-is.
pub type CaptureTimestamp = DateTime<FixedOffset>;

// ────────────────────────────────────────────────────────────────
// MediaClass
// ────────────────────────────────────────────────────────────────

/// Pipeline branch selected by file extension (case-insensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaClass {
    Image,
    RawVideoContainer,
    CanonicalVideo,
    Other,
}

impl MediaClass {
    pub fn from_path(path: &Path) -> Self {
        let ext = path.ext_lower();
        if ext == CANONICAL_VIDEO_EXTENSION {
            MediaClass::CanonicalVideo
        } else if RAW_VIDEO_CONTAINER_EXTENSIONS.contains(&ext.as_str()) {
            MediaClass::RawVideoContainer
        } else if VALID_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            MediaClass::Image
        } else {
            MediaClass::Other
        }
    }

    /// Unknown extensions still go through EXIF extraction.
    pub fn reads_exif(self) -> bool {
        matches!(self, MediaClass::Image | MediaClass::Other)
    }

    pub fn is_video(self) -> bool {
        matches!(self, MediaClass::CanonicalVideo | MediaClass::RawVideoContainer)
    }
}

// ────────────────────────────────────────────────────────────────
// WatchEvent / QueueItem
// ────────────────────────────────────────────────────────────────

/// A file that was closed after writing or moved into the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub directory: PathBuf,
    pub file_name: OsString,
}

impl WatchEvent {
    /// Split an event path into directory and file name.
    ///
    /// Returns `None` for paths without a file name or a parent. Names need
    /// not be UTF-8.
    pub fn from_path(path: &Path) -> Option<Self> {
        let directory = path.parent()?.to_path_buf();
        let file_name = path.file_name()?.to_os_string();
        Some(Self {
            directory,
            file_name,
        })
    }

    pub fn is_hidden(&self) -> bool {
        self.file_name.as_encoded_bytes().starts_with(b".")
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Absolute source path waiting in the processing queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem(PathBuf);

impl QueueItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn into_path(self) -> PathBuf {
        self.0
    }
}

impl From<WatchEvent> for QueueItem {
    fn from(event: WatchEvent) -> Self {
        Self(event.path())
    }
}

// ────────────────────────────────────────────────────────────────
// Outcome
// ────────────────────────────────────────────────────────────────

/// What happened to a successfully dispatched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Renamed from its capture timestamp into the destination tree.
    Filed {
        destination: PathBuf,
        preview: Option<PathBuf>,
    },
    /// No capture timestamp; moved under `failed/` with its original name.
    Unsorted {
        destination: PathBuf,
        preview: Option<PathBuf>,
    },
}

impl Outcome {
    pub fn destination(&self) -> &Path {
        match self {
            Outcome::Filed { destination, .. } | Outcome::Unsorted { destination, .. } => {
                destination
            }
        }
    }

    pub fn preview(&self) -> Option<&Path> {
        match self {
            Outcome::Filed { preview, .. } | Outcome::Unsorted { preview, .. } => {
                preview.as_deref()
            }
        }
    }
}
