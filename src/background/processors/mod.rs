//! Processors used by the dispatch flow.
//!
//! - `metadata`: capture timestamps from EXIF or container tags, video dimensions
//! - `naming`: strftime name patterns
//! - `video`: ffmpeg remux and preview encoding

pub mod metadata;
pub mod naming;
pub mod video;
