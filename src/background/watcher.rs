//! Filesystem intake for the watched directory.
//!
//! Only two notifications count as an arrival: a file closed after writing
//! and a file moved into the directory. The watcher runs on notify's own
//! thread and never touches the filesystem.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{AccessKind, AccessMode, ModifyKind, RenameMode},
};
use std::path::{Path, PathBuf};

use crate::{background::queue::QueueProducer, models::WatchEvent};

/// Arrivals described by one notify event.
///
/// Hidden files are skipped; encoder temporaries are written as dotfiles.
pub fn watch_events(event: &Event) -> Vec<WatchEvent> {
    let arrived = matches!(
        event.kind,
        EventKind::Access(AccessKind::Close(AccessMode::Write))
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
    );
    if !arrived {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter_map(|path| WatchEvent::from_path(path))
        .filter(|watch_event| !watch_event.is_hidden())
        .collect()
}

pub struct EventSource {
    watcher: RecommendedWatcher,
    directory: PathBuf,
}

impl EventSource {
    /// Start watching `directory` (non-recursively) and push every arrival onto the queue.
    ///
    /// Fails before any event is delivered if the directory cannot be watched.
    pub fn start(directory: &Path, producer: QueueProducer) -> Result<Self> {
        let directory = directory
            .canonicalize()
            .with_context(|| format!("From directory, {:?}, not found", directory))?;

        let watched = directory.clone();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for watch_event in watch_events(&event) {
                        if watch_event.directory != watched || watch_event.path().is_dir() {
                            continue;
                        }
                        debug!("File arrived in observed folder: {:?}", watch_event.path());
                        producer.push_event(watch_event);
                    }
                }
                Err(err) => warn!("Filesystem watch error: {}", err),
            }
        })
        .context("failed to create filesystem watcher")?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {:?}", directory))?;
        info!("Watching {:?}", directory);

        Ok(Self { watcher, directory })
    }

    /// Stop delivering events. Dropping the watcher joins its thread.
    pub fn stop(mut self) {
        if let Err(err) = self.watcher.unwatch(&self.directory) {
            warn!("Failed to unwatch {:?}: {}", self.directory, err);
        }
        info!("Stopped watching {:?}", self.directory);
    }
}
