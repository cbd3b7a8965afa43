//! Single consumer of the processing queue.
//!
//! Items are dispatched one at a time in arrival order. A shutdown signal is
//! only observed between items, so the item in flight always finishes.

use log::{error, info};
use std::sync::Arc;
use tokio::{sync::broadcast, task::spawn_blocking};

use crate::background::{
    flows::Dispatcher,
    processors::{metadata::MetadataSource, video::Transcode},
    queue::QueueConsumer,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub succeeded: usize,
}

pub struct Supervisor<M, T> {
    dispatcher: Arc<Dispatcher<M, T>>,
    queue: QueueConsumer,
    shutdown: broadcast::Receiver<()>,
}

impl<M, T> Supervisor<M, T>
where
    M: MetadataSource + 'static,
    T: Transcode + 'static,
{
    pub fn new(
        dispatcher: Dispatcher<M, T>,
        queue: QueueConsumer,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            queue,
            shutdown,
        }
    }

    /// Run until shutdown is signalled or the queue is closed and drained.
    pub async fn run(mut self) -> RunSummary {
        let mut summary = RunSummary::default();
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.recv() => {
                    info!("Shutdown requested, {} item(s) left in queue", self.queue.len());
                    break;
                }
                item = self.queue.next() => {
                    let Some(item) = item else {
                        info!("Processing queue closed");
                        break;
                    };
                    let dispatcher = Arc::clone(&self.dispatcher);
                    summary.processed += 1;
                    match spawn_blocking(move || dispatcher.process(item)).await {
                        Ok(Some(_)) => summary.succeeded += 1,
                        Ok(None) => {}
                        Err(err) => error!("Dispatcher panicked: {}", err),
                    }
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        background::{
            flows::DispatchSettings,
            processors::{metadata::Dimensions, naming::NamePattern},
            queue::processing_queue,
        },
        common::errors::DispatchError,
        models::{CaptureTimestamp, MediaClass, QueueItem},
    };
    use std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    };

    struct Undated;

    impl MetadataSource for Undated {
        fn capture_time(&self, _: &Path, _: MediaClass) -> Option<CaptureTimestamp> {
            None
        }

        fn video_dimensions(&self, path: &Path) -> Result<Dimensions, DispatchError> {
            Err(DispatchError::Probe {
                path: path.to_path_buf(),
                reason: "unused".to_string(),
            })
        }
    }

    struct Unused;

    impl Transcode for Unused {
        fn remux(&self, input: &Path, _: &Path) -> Result<(), DispatchError> {
            Err(DispatchError::Probe {
                path: input.to_path_buf(),
                reason: "unused".to_string(),
            })
        }

        fn preview(&self, input: &Path, _: &Path, _: Dimensions, _: u32) -> Result<(), DispatchError> {
            Err(DispatchError::Probe {
                path: input.to_path_buf(),
                reason: "unused".to_string(),
            })
        }
    }

    fn dispatcher(source_dir: &Path, destination_dir: &Path) -> Dispatcher<Undated, Unused> {
        Dispatcher::new(
            DispatchSettings {
                source_dir: source_dir.to_path_buf(),
                destination_dir: destination_dir.to_path_buf(),
                pattern: NamePattern::parse("%Y%m%d_%H%M%S").unwrap(),
                settle_delay: Duration::ZERO,
                preview_long_edge: 320,
            },
            Undated,
            Unused,
        )
    }

    #[tokio::test]
    async fn drains_the_queue_in_order_and_survives_failures() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        let first = source.path().join("a.txt");
        let second = source.path().join("b.txt");
        fs::write(&first, b"a").unwrap();
        fs::write(&second, b"b").unwrap();

        let (producer, consumer) = processing_queue();
        producer.push(QueueItem::new(&first));
        producer.push(QueueItem::new(&first));
        producer.push(QueueItem::new(&second));
        drop(producer);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let summary = Supervisor::new(
            dispatcher(source.path(), destination.path()),
            consumer,
            shutdown_rx,
        )
        .run()
        .await;

        assert_eq!(
            summary,
            RunSummary {
                processed: 3,
                succeeded: 2
            }
        );
        let failed: PathBuf = source.path().join("failed");
        assert!(failed.join("a.txt").exists());
        assert!(failed.join("b.txt").exists());
    }

    #[tokio::test]
    async fn shutdown_stops_before_the_next_item() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        let file = source.path().join("a.txt");
        fs::write(&file, b"a").unwrap();

        let (producer, consumer) = processing_queue();
        producer.push(QueueItem::new(&file));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        shutdown_tx.send(()).unwrap();

        let summary = Supervisor::new(
            dispatcher(source.path(), destination.path()),
            consumer,
            shutdown_rx,
        )
        .run()
        .await;

        assert_eq!(summary.processed, 0);
        assert!(file.exists());
    }
}
