use std::fmt;

use crate::error::HydrationError;
use crate::priority::HydrationPriority;

pub type Execute = Box<dyn FnOnce() -> anyhow::Result<bool>>;
pub type OnComplete = Box<dyn FnOnce()>;
pub type OnError = Box<dyn FnOnce(&HydrationError)>;

/// Activation work for one dormant subtree. `execute` returns `Ok(true)` once
/// the subtree is live; `Ok(false)`, an error or a panic count as failure.
pub struct HydrationTask {
    pub(crate) id: String,
    pub(crate) priority: HydrationPriority,
    pub(crate) execute: Execute,
    pub(crate) on_complete: Option<OnComplete>,
    pub(crate) on_error: Option<OnError>,
}

impl HydrationTask {
    pub fn new(
        id: impl Into<String>,
        priority: HydrationPriority,
        execute: impl FnOnce() -> anyhow::Result<bool> + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            priority,
            execute: Box::new(execute),
            on_complete: None,
            on_error: None,
        }
    }

    pub fn on_complete(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&HydrationError) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> HydrationPriority {
        self.priority
    }
}

impl fmt::Debug for HydrationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HydrationTask")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Queued,
    Running,
    Complete,
    Failed,
}
