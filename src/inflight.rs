use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Registry of writes that have been dispatched but not yet completed.
///
/// Each registration gets a ticket; [`InFlight::wait_for_registered`] waits
/// for every ticket handed out before the call, and ignores later ones, so a
/// flush cannot be starved by a producer that keeps submitting.
#[derive(Debug, Default)]
pub struct InFlight {
    state: Mutex<TicketState>,
    released: Notify,
}

#[derive(Debug, Default)]
struct TicketState {
    next_ticket: u64,
    pending: BTreeSet<u64>,
}

impl InFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(InFlight::default())
    }

    /// Register one outstanding write. It stays outstanding until the
    /// returned guard is dropped.
    pub fn register(self: &Arc<Self>) -> InFlightGuard {
        let mut state = self.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.pending.insert(ticket);
        InFlightGuard {
            tracker: Arc::clone(self),
            ticket,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Wait until every write registered before this call has been released.
    pub async fn wait_for_registered(&self) {
        let horizon = self.lock().next_ticket;
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if self.lock().pending.range(..horizon).next().is_none() {
                return;
            }
            released.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, TicketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps one write registered in an [`InFlight`] until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    tracker: Arc<InFlight>,
    ticket: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.lock().pending.remove(&self.ticket);
        self.tracker.released.notify_waiters();
    }
}
