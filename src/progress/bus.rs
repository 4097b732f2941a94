//! In-process event bus for progress events.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::progress::event::ProgressEvent;

#[derive(Clone)]
pub struct EventBus {
    sender: UnboundedSender<ProgressEvent>,
}

impl EventBus {
    pub fn new_pair() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Best-effort send. Returns `false` once the receiving side is gone; producers keep
    /// running and their events are dropped.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
