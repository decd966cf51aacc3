//! # Depmap Stream
//!
//! The item stream: a bounded, many-producer single-consumer conduit
//! carrying [`Item`]s from parsers to the graph assembler.
//!
//! ```text
//! parser task ──┐
//! parser task ──┼──> ItemSender::send ──> bounded queue ──> ItemReceiver
//! parser task ──┘         (suspends under backpressure)       (assembler)
//! ```
//!
//! Ordering across producers is not guaranteed; ordering within one
//! producer's emissions is. The stream closes once every sender is dropped,
//! at which point the receiver drains the remaining items and ends.
//!
//! Cancellation travels out-of-band: a [`CancelHandle`]/[`CancelSignal`]
//! pair lets the host stop a parse early. Parser tasks poll the signal and
//! stop emitting; the receiver side then sees the stream close.

mod cancel;

pub use cancel::{cancellation, CancelHandle, CancelSignal};

use depmap_model::{Item, Link, Node, ParseError, Result};
use tokio::sync::mpsc;

/// Default queue capacity; enough to decouple parser bursts from the
/// assembler without unbounded growth.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Create a bounded item stream.
#[must_use]
pub fn channel(capacity: usize) -> (ItemSender, ItemReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (ItemSender { tx }, ItemReceiver { rx })
}

/// Producer handle; cheap to clone, one per parser task.
#[derive(Clone)]
pub struct ItemSender {
    tx: mpsc::Sender<Item>,
}

impl ItemSender {
    /// Send one item, suspending while the queue is full.
    ///
    /// Fails only once the consumer is gone (stream closed or parse
    /// cancelled), surfaced as [`ParseError::Cancelled`].
    pub async fn send(&self, item: Item) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| ParseError::Cancelled)
    }

    pub async fn send_node(&self, node: Node) -> Result<()> {
        self.send(Item::Node(node)).await
    }

    pub async fn send_link(&self, link: Link) -> Result<()> {
        self.send(Item::Link(link)).await
    }

    /// Flush a fully-parsed artifact's buffered fragments in order.
    ///
    /// Parsers buffer per artifact and flush only on success, so a failing
    /// artifact never contributes partial fragments to the graph.
    pub async fn send_all(&self, items: Vec<Item>) -> Result<()> {
        for item in items {
            self.send(item).await?;
        }
        Ok(())
    }
}

/// Consumer handle, owned by the graph assembler.
pub struct ItemReceiver {
    rx: mpsc::Receiver<Item>,
}

impl ItemReceiver {
    /// Receive the next item; `None` once all senders have finished.
    pub async fn recv(&mut self) -> Option<Item> {
        self.rx.recv().await
    }

    /// Close the stream early. In-flight `send` calls fail with
    /// [`ParseError::Cancelled`]; already-queued items remain receivable.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
