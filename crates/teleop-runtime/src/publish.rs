//! [`Publisher`] – a bounded, never-blocking hand-off to a consumer thread.
//!
//! The drive loop must not wait on the display.  A full queue means the
//! consumer is behind, so the newest item is dropped and counted instead.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

pub struct Publisher<T> {
    tx: SyncSender<T>,
    dropped: u64,
}

/// Create a publisher with room for `capacity` in-flight items and the
/// receiving end for the consumer.
pub fn bounded<T>(capacity: usize) -> (Publisher<T>, Receiver<T>) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (Publisher { tx, dropped: 0 }, rx)
}

impl<T> Publisher<T> {
    /// Offer `item` to the consumer.  Returns `true` when it was queued.
    pub fn publish(&mut self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Items discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
