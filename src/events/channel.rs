//! crossbeam-channel plumbing between the engine and front ends.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::Event;

/// Engine side of an event channel.
///
/// Cloned into the quarantine mover and shared by the hash workers.
/// Sending never blocks the engine and never fails it: once the
/// receiver is gone, events are dropped.
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<Event>,
}

impl EventSender {
    pub fn new(sender: Sender<Event>) -> Self {
        Self { inner: sender }
    }

    pub fn send(&self, event: Event) {
        let _ = self.inner.send(event);
    }
}

/// Front-end side of an event channel
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Next event; `None` once every sender is dropped
    pub fn recv(&self) -> Option<Event> {
        self.inner.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.inner.try_recv().ok()
    }

    /// Events until every sender is dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }

    /// Everything queued right now, without waiting
    pub fn drain(&self) -> Vec<Event> {
        self.inner.try_iter().collect()
    }
}

/// Constructor for connected sender/receiver pairs
pub struct EventChannel;

impl EventChannel {
    /// Unbounded, so a slow front end never stalls a run
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }
}

/// Sender whose events go nowhere; the engine's default
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}
