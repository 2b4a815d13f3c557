//! Single-slot bookkeeping for the pending auto-reconnect.
//!
//! At most one reconnect is outstanding. Installing a new one cancels the old
//! one. Each install gets a generation number so a timer that wakes after it
//! was replaced or cancelled can tell it is stale.

use tokio::sync::oneshot;

#[derive(Debug)]
struct Pending {
    generation: u64,
    cancel: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
pub(crate) struct ReconnectSlot {
    pending: Option<Pending>,
    next_generation: u64,
}

impl ReconnectSlot {
    /// Cancel any pending reconnect and register a new one.
    ///
    /// The receiver resolves when this registration is cancelled.
    pub(crate) fn install(&mut self) -> (u64, oneshot::Receiver<()>) {
        self.cancel();
        self.next_generation = self.next_generation.wrapping_add(1);
        let (cancel, cancelled) = oneshot::channel();
        self.pending = Some(Pending {
            generation: self.next_generation,
            cancel,
        });
        (self.next_generation, cancelled)
    }

    /// Cancel the pending reconnect. Returns false if there was none.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                let _ = pending.cancel.send(());
                true
            }
            None => false,
        }
    }

    /// Claim the slot for firing. Only the current, uncancelled generation wins.
    pub(crate) fn take_if_current(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
