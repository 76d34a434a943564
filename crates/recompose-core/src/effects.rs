use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::EffectError;

#[derive(Clone)]
pub struct Dispose(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Dispose {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    pub fn noop() -> Self {
        Self(Rc::new(RefCell::new(None)))
    }

    /// Runs at most once (safe to call multiple times).
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }

    pub fn is_spent(&self) -> bool {
        self.0.borrow().is_none()
    }
}

/// Helper to build the cleanup returned from a disposable effect.
pub fn on_unmount(f: impl FnOnce() + 'static) -> Dispose {
    Dispose::new(f)
}

/// Cooperative cancellation flag handed to launched work. Work is never
/// interrupted; it is expected to poll `is_cancelled` and return.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Where launched effects run. The composing call never waits on it.
pub trait EffectExecutor {
    fn spawn(&self, task: Task);
}

/// Runs the task on the calling thread before returning. Deterministic, for
/// tests and for hosts without threads.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl EffectExecutor for InlineExecutor {
    fn spawn(&self, task: Task) {
        task()
    }
}

/// One OS thread per launched effect.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadExecutor;

impl EffectExecutor for ThreadExecutor {
    fn spawn(&self, task: Task) {
        let spawned = std::thread::Builder::new()
            .name("recompose-effect".into())
            .spawn(task);
        if let Err(err) = spawned {
            log::error!("failed to spawn effect thread: {err}");
        }
    }
}

/// Collects effect failures from whichever thread they happen on.
#[derive(Clone, Default)]
pub struct EffectErrorSink(Arc<Mutex<Vec<EffectError>>>);

impl EffectErrorSink {
    pub fn push(&self, err: EffectError) {
        self.0.lock().push(err);
    }

    pub fn take(&self) -> Vec<EffectError> {
        std::mem::take(&mut *self.0.lock())
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectStatus {
    Unstarted,
    Running,
    Restarting,
    Failed,
    Disposed,
}

/// What an effect slot holds: the key it was started with and the cleanup
/// for the work currently running.
pub(crate) struct EffectState<K> {
    pub(crate) key: Option<K>,
    pub(crate) status: EffectStatus,
    pub(crate) cleanup: Option<Dispose>,
}

impl<K> EffectState<K> {
    pub(crate) fn new() -> Self {
        Self {
            key: None,
            status: EffectStatus::Unstarted,
            cleanup: None,
        }
    }

    /// Takes the cleanup out before running it so the cleanup is free to
    /// touch anything, including this state.
    pub(crate) fn dispose(this: &RefCell<Self>) {
        let cleanup = {
            let mut st = this.borrow_mut();
            st.status = EffectStatus::Disposed;
            st.cleanup.take()
        };
        if let Some(d) = cleanup {
            d.run();
        }
    }
}
