//! Queueing helpers from input and push sources into the application loop.

use tokio::sync::mpsc::{Sender, UnboundedSender};

use crate::controller::events::{Gesture, PushEvent};

/// Queues a gesture from the blocking input reader, waiting for room while
/// the loop is busy. Returns `false` once the loop has gone away and reading
/// should stop. Must not be called from inside the runtime.
pub fn dispatch_gesture(gesture_tx: &Sender<Gesture>, gesture: Gesture) -> bool {
    let name = gesture.name();
    match gesture_tx.blocking_send(gesture) {
        Ok(()) => {
            tracing::debug!(gesture = name, "queued terminal gesture");
            true
        }
        Err(_) => {
            tracing::debug!(gesture = name, "board loop stopped; input reader exiting");
            false
        }
    }
}

/// Forwards a push channel event into the loop. The queue is unbounded; the
/// backend paces the channel.
pub fn forward_push(push_tx: &UnboundedSender<PushEvent>, event: PushEvent) {
    let kind = event.name();
    match push_tx.send(event) {
        Ok(()) => tracing::debug!(kind, "queued push event"),
        Err(_) => tracing::debug!(kind, "board loop stopped; push dropped"),
    }
}
