//! Bounded capture channel between external producers and the engine worker.
//!
//! Key hooks may fire on an OS callback thread and metric samplers on a
//! timer; both push into the same bounded queue so the engine stays
//! single-writer.

use crate::collector::types::SensorEvent;
use crate::error::ChannelError;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A bounded multi-producer queue of sensor events.
pub struct EventChannel {
    sender: Sender<SensorEvent>,
    receiver: Receiver<SensorEvent>,
    overflow: Arc<AtomicU64>,
}

impl EventChannel {
    /// Create a channel holding at most `capacity` queued events.
    pub fn new(capacity: usize) -> Self {
        // Bounded to prevent unbounded memory growth when the worker lags
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            overflow: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get a producer handle. Handles are cheap to clone.
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
            overflow: self.overflow.clone(),
        }
    }

    /// Get the receiver for sensor events.
    pub fn receiver(&self) -> &Receiver<SensorEvent> {
        &self.receiver
    }

    /// Split into a producer handle and the receiver.
    ///
    /// The channel disconnects once every `EventSender` has been dropped.
    pub fn into_parts(self) -> (EventSender, Receiver<SensorEvent>) {
        let sender = EventSender {
            sender: self.sender,
            overflow: self.overflow,
        };
        (sender, self.receiver)
    }

    /// Number of events rejected because the queue was full.
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

/// Producer side of an [`EventChannel`].
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<SensorEvent>,
    overflow: Arc<AtomicU64>,
}

impl EventSender {
    /// Enqueue without blocking. Full queues drop the event.
    pub fn try_send(&self, event: impl Into<SensorEvent>) -> Result<(), ChannelError> {
        match self.sender.try_send(event.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.overflow.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped, "capture queue full, dropping event");
                Err(ChannelError::Full)
            }
            Err(TrySendError::Disconnected(_)) => Err(ChannelError::Disconnected),
        }
    }

    /// Enqueue, blocking while the queue is full.
    pub fn send(&self, event: impl Into<SensorEvent>) -> Result<(), ChannelError> {
        self.sender
            .send(event.into())
            .map_err(|_| ChannelError::Disconnected)
    }

    /// Number of events rejected because the queue was full.
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::KeyEvent;
    use chrono::Utc;

    #[test]
    fn test_try_send_overflow() {
        let channel = EventChannel::new(1);
        let sender = channel.sender();

        assert!(sender.try_send(KeyEvent::press("a", Utc::now())).is_ok());
        assert_eq!(
            sender.try_send(KeyEvent::press("b", Utc::now())),
            Err(ChannelError::Full)
        );
        assert_eq!(channel.overflow_count(), 1);
        assert_eq!(channel.receiver().len(), 1);
    }

    #[test]
    fn test_disconnect_after_receiver_dropped() {
        let (sender, receiver) = EventChannel::new(4).into_parts();
        drop(receiver);
        assert_eq!(
            sender.send(KeyEvent::press("a", Utc::now())),
            Err(ChannelError::Disconnected)
        );
    }
}
