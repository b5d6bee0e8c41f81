/*!
 * Typed observer channel for progress and error reporting
 *
 * Drivers publish, a UI or CLI observer subscribes. Multiple drivers may
 * publish concurrently; events from a single driver arrive in the order
 * they were produced.
 */

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::CopyError;

/// Progress snapshot emitted by a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressStatus {
    /// 0..100
    pub percent: f64,
    pub message: String,
}

impl ProgressStatus {
    pub fn new(percent: f64, message: impl Into<String>) -> Self {
        ProgressStatus {
            percent,
            message: message.into(),
        }
    }
}

/// Messages observers receive while a backup runs.
#[derive(Debug)]
pub enum BackupEvent {
    Progress(ProgressStatus),
    Error(CopyError),
    Finished,
}

/// Sends events to the subscriber; cheap to clone into each driver.
#[derive(Clone)]
pub struct EventPublisher {
    sender: Option<Sender<BackupEvent>>,
}

impl EventPublisher {
    /// Publisher/subscriber pair over an unbounded channel.
    pub fn channel() -> (Self, EventSubscriber) {
        let (tx, rx) = unbounded();
        (
            EventPublisher { sender: Some(tx) },
            EventSubscriber { receiver: rx },
        )
    }

    /// Publisher/subscriber pair with a bounded buffer.
    pub fn with_capacity(capacity: usize) -> (Self, EventSubscriber) {
        let (tx, rx) = bounded(capacity);
        (
            EventPublisher { sender: Some(tx) },
            EventSubscriber { receiver: rx },
        )
    }

    /// Publisher that drops everything, for observer-less runs.
    pub fn noop() -> Self {
        EventPublisher { sender: None }
    }

    pub fn publish(&self, event: BackupEvent) {
        if let Some(tx) = &self.sender {
            // a dropped subscriber is not an error worth surfacing
            let _ = tx.send(event);
        }
    }

    pub fn progress(&self, percent: f64, message: impl Into<String>) {
        self.publish(BackupEvent::Progress(ProgressStatus::new(percent, message)));
    }

    pub fn error(&self, error: CopyError) {
        self.publish(BackupEvent::Error(error));
    }

    pub fn finished(&self) {
        self.publish(BackupEvent::Finished);
    }
}

/// Receives events; the consuming side of the channel.
pub struct EventSubscriber {
    receiver: Receiver<BackupEvent>,
}

impl EventSubscriber {
    pub fn receiver(&self) -> &Receiver<BackupEvent> {
        &self.receiver
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<BackupEvent> {
        self.receiver.try_recv().ok()
    }

    /// Blocking receive; `None` once every publisher is gone.
    pub fn recv(&self) -> Option<BackupEvent> {
        self.receiver.recv().ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = BackupEvent> + '_ {
        self.receiver.iter()
    }
}
