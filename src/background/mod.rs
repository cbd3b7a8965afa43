//! Background pipeline: from a filesystem notification to a filed media item.
//!
//! Structure:
//! - `watcher`: notify-backed intake for the observed folder
//! - `queue`: FIFO between the watcher and the supervisor
//! - `supervisor`: single consumer, one item at a time
//! - `flows`: the per-file dispatch flow
//! - `processors`: metadata, naming, and ffmpeg work
//! - `actors`: filesystem side effects (moves)

pub mod actors;
pub mod flows;
pub mod processors;
pub mod queue;
pub mod supervisor;
pub mod watcher;
