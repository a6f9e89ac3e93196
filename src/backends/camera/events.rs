// SPDX-License-Identifier: GPL-3.0-only

//! Pending device events
//!
//! Backends and capture threads only enqueue here. Delivery happens when the
//! application pumps the queue from its own thread, so an event handler may
//! close the device that raised the event without deadlocking.

use super::types::DeviceId;
use futures::channel::mpsc;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Notification about a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraEvent {
    /// A new device was registered
    Added(DeviceId),
    /// A device was unplugged or failed
    Removed(DeviceId),
    /// The user granted access to an opened device
    Approved(DeviceId),
    /// The user refused access to an opened device
    Denied(DeviceId),
}

impl CameraEvent {
    pub fn device(&self) -> DeviceId {
        match self {
            CameraEvent::Added(id)
            | CameraEvent::Removed(id)
            | CameraEvent::Approved(id)
            | CameraEvent::Denied(id) => *id,
        }
    }
}

impl std::fmt::Display for CameraEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraEvent::Added(id) => write!(f, "camera {} added", id),
            CameraEvent::Removed(id) => write!(f, "camera {} removed", id),
            CameraEvent::Approved(id) => write!(f, "camera {} approved", id),
            CameraEvent::Denied(id) => write!(f, "camera {} denied", id),
        }
    }
}

/// Receiving end of an event subscription
pub type EventReceiver = mpsc::UnboundedReceiver<CameraEvent>;

/// Lock-protected FIFO of undelivered events plus the subscriber list
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Mutex<VecDeque<CameraEvent>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CameraEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an event, callable from any thread
    pub fn push(&self, event: CameraEvent) {
        trace!(event = %event, "Queueing camera event");
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.try_reserve(1).is_err() {
            // Out of memory: the event is lost
            return;
        }
        pending.push_back(event);
    }

    /// Take every pending event in order
    pub fn drain(&self) -> Vec<CameraEvent> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Drain pending events and forward them to subscribers
    ///
    /// Subscribers whose receiver was dropped are forgotten.
    pub fn pump(&self) -> Vec<CameraEvent> {
        let events = self.drain();
        if events.is_empty() {
            return events;
        }
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| {
            events
                .iter()
                .all(|event| tx.unbounded_send(*event).is_ok())
        });
        events
    }

    /// Close all subscriptions
    pub fn close_subscribers(&self) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for tx in subscribers.drain(..) {
            tx.close_channel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_fifo_order() {
        let queue = EventQueue::new();
        queue.push(CameraEvent::Added(DeviceId(1)));
        queue.push(CameraEvent::Removed(DeviceId(1)));
        queue.push(CameraEvent::Added(DeviceId(2)));
        assert_eq!(
            queue.pump(),
            vec![
                CameraEvent::Added(DeviceId(1)),
                CameraEvent::Removed(DeviceId(1)),
                CameraEvent::Added(DeviceId(2)),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_subscribers_receive_pumped_events() {
        let queue = EventQueue::new();
        let mut rx = queue.subscribe();
        queue.push(CameraEvent::Approved(DeviceId(3)));
        queue.pump();
        queue.close_subscribers();

        let received: Vec<_> = futures::executor::block_on(async {
            let mut out = Vec::new();
            while let Some(event) = rx.next().await {
                out.push(event);
            }
            out
        });
        assert_eq!(received, vec![CameraEvent::Approved(DeviceId(3))]);
    }

    #[test]
    fn test_dropped_subscriber_forgotten() {
        let queue = EventQueue::new();
        drop(queue.subscribe());
        queue.push(CameraEvent::Added(DeviceId(1)));
        queue.pump();
        assert!(queue.subscribers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_event_device() {
        assert_eq!(CameraEvent::Denied(DeviceId(9)).device(), DeviceId(9));
    }
}
