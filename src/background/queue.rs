//! Unbounded FIFO between the watcher (producer) and the supervisor (consumer).
//!
//! Items come out in arrival order. There is no deduplication: a file that
//! fires two events is queued twice. The consumer half is not `Clone`, so
//! there is exactly one consumer per queue.

use log::debug;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::models::{QueueItem, WatchEvent};

pub fn processing_queue() -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (QueueProducer(tx), QueueConsumer(rx))
}

#[derive(Debug, Clone)]
pub struct QueueProducer(UnboundedSender<QueueItem>);

impl QueueProducer {
    /// Never blocks. Returns `false` once the consumer is gone.
    pub fn push(&self, item: QueueItem) -> bool {
        match self.0.send(item) {
            Ok(()) => true,
            Err(err) => {
                debug!("Queue closed, dropping {:?}", err.0.path());
                false
            }
        }
    }

    pub fn push_event(&self, event: WatchEvent) -> bool {
        self.push(QueueItem::from(event))
    }
}

#[derive(Debug)]
pub struct QueueConsumer(UnboundedReceiver<QueueItem>);

impl QueueConsumer {
    /// Wait for the next item; `None` once every producer is dropped and the queue is drained.
    pub async fn next(&mut self) -> Option<QueueItem> {
        self.0.recv().await
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
