use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub type Flush = Box<dyn FnOnce()>;

/// Decides when a requested flush runs. The Recomposer asks for at most one
/// flush at a time, no matter how many writes arrive before it runs.
pub trait FlushScheduler {
    fn schedule_flush(&self, flush: Flush);
}

/// Runs the flush before `schedule_flush` returns.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateScheduler;

impl FlushScheduler for ImmediateScheduler {
    fn schedule_flush(&self, flush: Flush) {
        flush()
    }
}

/// Holds flushes until the host calls `run_pending`, like a frame callback.
/// Clones share one queue.
#[derive(Clone, Default)]
pub struct DeferredScheduler {
    queue: Rc<RefCell<VecDeque<Flush>>>,
}

impl DeferredScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Runs the flushes queued so far. Flushes scheduled while these run
    /// wait for the next call. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let batch: Vec<Flush> = self.queue.borrow_mut().drain(..).collect();
        let n = batch.len();
        for flush in batch {
            flush();
        }
        n
    }
}

impl FlushScheduler for DeferredScheduler {
    fn schedule_flush(&self, flush: Flush) {
        self.queue.borrow_mut().push_back(flush);
    }
}
