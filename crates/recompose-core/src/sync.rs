//! Cross-thread invalidation.
//!
//! Composition is single-threaded. Background work (a launched effect on the
//! `ThreadExecutor`, a network callback) cannot touch a `State` directly, so
//! it reports writes through an `InvalidationInbox` instead. The owning
//! thread drains the inbox with `Recomposer::drain_inbox`, usually from the
//! waker it installed.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::reactive::StateId;

pub type Waker = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Pending {
    order: Vec<StateId>,
    seen: HashSet<StateId>,
}

#[derive(Clone, Default)]
pub struct InvalidationInbox {
    pending: Arc<Mutex<Pending>>,
    waker: Arc<Mutex<Option<Waker>>>,
}

impl InvalidationInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called whenever the inbox goes from empty to non-empty.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.waker.lock() = Some(Arc::new(waker));
    }

    /// Queues a write. Repeated writes of one state before the next drain
    /// collapse into one. Returns false for such a repeat.
    pub fn record_state_write(&self, state: StateId) -> bool {
        let wake = {
            let mut p = self.pending.lock();
            if !p.seen.insert(state) {
                return false;
            }
            p.order.push(state);
            p.order.len() == 1
        };
        if wake {
            let waker = self.waker.lock().clone();
            if let Some(w) = waker {
                w();
            }
        }
        true
    }

    /// Takes queued writes in arrival order.
    pub fn drain(&self) -> Vec<StateId> {
        let mut p = self.pending.lock();
        p.seen.clear();
        std::mem::take(&mut p.order)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().order.is_empty()
    }
}

impl std::fmt::Debug for InvalidationInbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationInbox")
            .field("pending", &self.len())
            .finish()
    }
}
