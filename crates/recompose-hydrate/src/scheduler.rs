//! Time-sliced, priority-ordered activation of dormant subtrees.
//!
//! Tasks wait in one queue per priority. A slice pops the highest-priority
//! task, runs it, and checks the clock; once the slice has used its budget and
//! work remains, it asks the host for another slice and returns. A task that
//! overruns is never interrupted, only the next one waits.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::time::Duration;

use recompose_core::{Clock, panic_message};

use crate::config::HydrationConfig;
use crate::error::HydrationError;
use crate::priority::HydrationPriority;
use crate::task::{HydrationTask, TaskState};

pub type Resume = Box<dyn FnOnce()>;

/// The host's "call me back when idle" primitive (an idle callback, an
/// animation frame, a test loop).
pub trait HostYield {
    fn request_slice(&self, resume: Resume);
}

/// Queues resume callbacks until the caller runs them. Clones share the
/// queue.
#[derive(Clone, Default)]
pub struct ManualHost {
    queue: Rc<RefCell<VecDeque<Resume>>>,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Runs the oldest queued callback. Returns false if there was none.
    pub fn run_next(&self) -> bool {
        let next = self.queue.borrow_mut().pop_front();
        match next {
            Some(resume) => {
                resume();
                true
            }
            None => false,
        }
    }

    /// Runs callbacks, including ones queued meanwhile, until none are left.
    pub fn run_all(&self) -> usize {
        let mut n = 0;
        while self.run_next() {
            n += 1;
        }
        n
    }
}

impl HostYield for ManualHost {
    fn request_slice(&self, resume: Resume) {
        self.queue.borrow_mut().push_back(resume);
    }
}

/// What one slice did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SliceReport {
    /// Task ids in execution order.
    pub executed: Vec<String>,
    /// True if the slice stopped on its budget with work left.
    pub yielded: bool,
}

struct SchedulerInner {
    queues: RefCell<[VecDeque<HydrationTask>; 4]>,
    states: RefCell<HashMap<String, TaskState>>,
    clock: Rc<dyn Clock>,
    host: Rc<dyn HostYield>,
    budget: Duration,
    slice_requested: Cell<bool>,
    draining: Cell<bool>,
}

/// Cloneable handle; clones drive the same queues.
#[derive(Clone)]
pub struct HydrationScheduler {
    inner: Rc<SchedulerInner>,
}

impl HydrationScheduler {
    pub fn new(clock: impl Clock, host: impl HostYield + 'static, config: &HydrationConfig) -> Self {
        Self::from_parts(Rc::new(clock), Rc::new(host), config)
    }

    pub fn from_parts(
        clock: Rc<dyn Clock>,
        host: Rc<dyn HostYield>,
        config: &HydrationConfig,
    ) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                queues: RefCell::new(Default::default()),
                states: RefCell::new(HashMap::new()),
                clock,
                host,
                budget: config.time_budget,
                slice_requested: Cell::new(false),
                draining: Cell::new(false),
            }),
        }
    }

    /// Queues `task` behind tasks of the same priority and ahead of every
    /// lower one, even while a slice is draining. A task id that is queued,
    /// running or complete is ignored; a failed one may be scheduled again.
    pub fn schedule(&self, task: HydrationTask) -> bool {
        {
            let mut states = self.inner.states.borrow_mut();
            match states.get(&task.id) {
                Some(TaskState::Failed) | None => {}
                Some(state) => {
                    log::debug!("hydration task '{}' already {state:?}; ignored", task.id);
                    return false;
                }
            }
            states.insert(task.id.clone(), TaskState::Queued);
        }
        log::debug!("queued hydration task '{}' ({})", task.id, task.priority);
        self.inner.queues.borrow_mut()[task.priority.index()].push_back(task);
        self.request_slice();
        true
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.inner.states.borrow().get(id).copied()
    }

    pub fn queued_len(&self) -> usize {
        self.inner.queues.borrow().iter().map(VecDeque::len).sum()
    }

    pub fn queued_at(&self, priority: HydrationPriority) -> usize {
        self.inner.queues.borrow()[priority.index()].len()
    }

    pub fn is_idle(&self) -> bool {
        self.queued_len() == 0
    }

    /// Runs tasks until the queues are empty or the budget is spent.
    pub fn run_slice(&self) -> SliceReport {
        let inner = &self.inner;
        if inner.draining.replace(true) {
            return SliceReport::default();
        }
        inner.slice_requested.set(false);

        let start = inner.clock.now();
        let mut report = SliceReport::default();
        while let Some(task) = self.pop_next() {
            report.executed.push(task.id.clone());
            self.execute(task);
            let elapsed = inner.clock.now().saturating_duration_since(start);
            if elapsed >= inner.budget && !self.is_idle() {
                log::debug!(
                    "hydration slice used {elapsed:?} of {:?}; yielding with {} task(s) left",
                    inner.budget,
                    self.queued_len()
                );
                report.yielded = true;
                break;
            }
        }
        inner.draining.set(false);

        if report.yielded {
            self.request_slice();
        }
        report
    }

    /// Drains everything now, slice after slice, without going through the
    /// host. Returns task ids in execution order.
    pub fn run_until_idle(&self) -> Vec<String> {
        let mut executed = Vec::new();
        while !self.is_idle() {
            let report = self.run_slice();
            if report.executed.is_empty() {
                break;
            }
            executed.extend(report.executed);
        }
        executed
    }

    fn pop_next(&self) -> Option<HydrationTask> {
        self.inner
            .queues
            .borrow_mut()
            .iter_mut()
            .find_map(VecDeque::pop_front)
    }

    fn request_slice(&self) {
        let inner = &self.inner;
        if inner.draining.get() || inner.slice_requested.replace(true) {
            return;
        }
        let weak: Weak<SchedulerInner> = Rc::downgrade(inner);
        inner.host.request_slice(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                HydrationScheduler { inner }.run_slice();
            }
        }));
    }

    fn execute(&self, task: HydrationTask) {
        let HydrationTask {
            id,
            execute,
            on_complete,
            on_error,
            ..
        } = task;
        self.set_state(&id, TaskState::Running);

        let outcome = match panic::catch_unwind(AssertUnwindSafe(execute)) {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(HydrationError::Declined(id.clone())),
            Ok(Err(err)) => Err(HydrationError::Failed {
                task: id.clone(),
                message: format!("{err:#}"),
            }),
            Err(payload) => Err(HydrationError::Panicked {
                task: id.clone(),
                message: panic_message(&*payload),
            }),
        };

        match outcome {
            Ok(()) => {
                self.set_state(&id, TaskState::Complete);
                log::debug!("hydration task '{id}' complete");
                if let Some(f) = on_complete {
                    contain(&id, f);
                }
            }
            Err(err) => {
                self.set_state(&id, TaskState::Failed);
                log::warn!("{err}");
                if let Some(f) = on_error {
                    contain(&id, move || f(&err));
                }
            }
        }
    }

    fn set_state(&self, id: &str, state: TaskState) {
        self.inner.states.borrow_mut().insert(id.to_string(), state);
    }
}

// completion callbacks belong to the caller; a panic there must not stall
// the queue either
fn contain(id: &str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        log::error!(
            "callback of hydration task '{id}' panicked: {}",
            panic_message(&*payload)
        );
    }
}

impl std::fmt::Debug for HydrationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HydrationScheduler")
            .field("queued", &self.queued_len())
            .field("budget", &self.inner.budget)
            .finish()
    }
}
