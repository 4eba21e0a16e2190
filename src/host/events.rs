//! Async access to host events.

use std::pin::pin;
use std::sync::Arc;

use tokio::sync::Notify;

use crate::core::TryRecvError;
use crate::gap::GapEvent;
use crate::queue::PacketQueue;

/// Async receiver over the host's event queue.
///
/// Shares the queue with [`Host::next_event`](super::Host::next_event);
/// each event goes to exactly one consumer.
#[derive(Debug, Clone)]
pub struct EventStream {
    queue: Arc<PacketQueue<GapEvent>>,
    ready: Arc<Notify>,
}

impl EventStream {
    pub(crate) fn new(queue: Arc<PacketQueue<GapEvent>>, ready: Arc<Notify>) -> Self {
        Self { queue, ready }
    }

    /// Wait for the next event. `None` once the host is stopped and the
    /// queue is drained.
    ///
    /// Cancel safe: an event is only taken from the queue when it is
    /// returned.
    pub async fn recv(&mut self) -> Option<GapEvent> {
        loop {
            let mut notified = pin!(self.ready.notified());
            notified.as_mut().enable();
            match self.queue.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => notified.await,
            }
        }
    }

    /// Take the next event if one is queued.
    pub fn try_recv(&mut self) -> Option<GapEvent> {
        self.queue.try_recv().ok()
    }
}
