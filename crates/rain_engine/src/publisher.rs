//! Change-only publication of rain states.

use common::{RainEvent, RainState};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// True when `next` carries nothing new compared to what was last sent.
pub fn is_duplicate(last: Option<&RainState>, next: &RainState) -> bool {
    last.is_some_and(|last| last == next)
}

/// Sends events downstream and remembers the last published rain state.
#[derive(Debug)]
pub struct Publisher {
    tx: mpsc::UnboundedSender<RainEvent>,
    last_published: Option<RainState>,
}

impl Publisher {
    pub fn new(tx: mpsc::UnboundedSender<RainEvent>) -> Self {
        Self {
            tx,
            last_published: None,
        }
    }

    /// Publisher plus the receiving end of its event stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RainEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn last_published(&self) -> Option<&RainState> {
        self.last_published.as_ref()
    }

    /// Send `state` unless it equals the previous one. `force` sends anyway.
    /// Returns whether it was sent.
    pub fn publish_state(&mut self, state: RainState, force: bool) -> bool {
        if !force && is_duplicate(self.last_published.as_ref(), &state) {
            debug!("rain state unchanged, not publishing");
            return false;
        }

        info!(
            "rain-state: {} (current={} {}%, predicted={} at +{}m)",
            state.message,
            state.current.classification,
            state.current.confidence.percent(),
            state.predicted.classification,
            state.predicted.offset_minutes
        );
        self.send(RainEvent::State(Box::new(state.clone())));
        self.last_published = Some(state);
        true
    }

    pub fn publish_error(&self, message: String) {
        self.send(RainEvent::Error(message));
    }

    fn send(&self, event: RainEvent) {
        if self.tx.send(event).is_err() {
            debug!("no event listener attached, dropping event");
        }
    }
}
