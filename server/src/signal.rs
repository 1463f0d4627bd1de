//! One-shot termination signal shared between the actor and sessions.

use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable signal that fires at most once.
///
/// Every clone observes the same state. Firing an already fired signal is a
/// no-op, so racing teardown paths (a `/quit` and a socket error) can both
/// call [`DoneSignal::fire`] without coordination.
#[derive(Debug, Clone)]
pub struct DoneSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl DoneSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fires the signal. Returns true only for the call that fired it.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has fired, immediately if it already has.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for DoneSignal {
    fn default() -> Self {
        Self::new()
    }
}
