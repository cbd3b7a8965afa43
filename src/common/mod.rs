pub mod errors;

use std::{sync::LazyLock, time::Duration};

use tokio::runtime::{Builder, Runtime};

pub const FAILED_DIR_NAME: &str = "failed";

pub const PREVIEW_SUFFIX: &str = "_preview";

pub const CANONICAL_VIDEO_EXTENSION: &str = "mp4";

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

pub const DEFAULT_PREVIEW_LONG_EDGE: u32 = 320;

pub const DEFAULT_FILE_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const MAX_COPY_RETRIES: u32 = 3;

pub const SHOULD_SWAP_WIDTH_HEIGHT_ROTATION: &[&str] = &["90", "-90", "270", "-270"];

pub const VALID_IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jfif", "jpe", "png", "tif", "tiff", "webp", "heic", "heif", "dng",
];

pub const RAW_VIDEO_CONTAINER_EXTENSIONS: &[&str] = &["mov", "3gp"];

/// Container tags carrying the local "recorded" date, most specific first.
pub const RECORDED_DATE_TAGS: &[&str] = &[
    "com.apple.quicktime.creationdate",
    "recorded_date",
    "date",
];

/// Container tags carrying the UTC "encoded" date.
pub const ENCODED_DATE_TAGS: &[&str] = &["encoded_date", "creation_time"];

/// Encoded dates are reported as `UTC 2021-03-04 10:20:30` by some probes.
pub const ENCODED_DATE_PREFIX: &str = "UTC ";

// Background worker runtime.
// Drives the supervisor loop and the signal listener; blocking per-item work
// goes to the runtime's blocking pool one item at a time.
pub static WORKER_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("image-mover-worker")
        .enable_all()
        .build()
        .expect("Failed to build worker Tokio runtime")
});
