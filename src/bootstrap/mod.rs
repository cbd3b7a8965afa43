pub mod setup;

pub use setup::{check_ffmpeg_and_ffprobe, initialize_logger};
