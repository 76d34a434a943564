use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::reactive::ComposerId;

/// Failure of a single composition pass. Each pass is isolated, so one of
/// these never stops the other queued composers from running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error("composer {composer:?} panicked during composition: {message}")]
    Panicked {
        composer: ComposerId,
        message: String,
    },
    #[error("composer {0:?} has been disposed")]
    Disposed(ComposerId),
    #[error("composer {0:?} is already composing")]
    Busy(ComposerId),
}

impl ComposeError {
    pub fn composer(&self) -> ComposerId {
        match self {
            ComposeError::Panicked { composer, .. } => *composer,
            ComposeError::Disposed(id) | ComposeError::Busy(id) => *id,
        }
    }
}

/// Failure inside an effect body. The effect slot stays consistent, so the
/// next key change restarts it normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EffectError {
    #[error("effect start panicked in composer {composer:?}: {message}")]
    StartPanicked {
        composer: ComposerId,
        message: String,
    },
    #[error("effect cleanup panicked in composer {composer:?}: {message}")]
    CleanupPanicked {
        composer: ComposerId,
        message: String,
    },
    #[error("launched effect failed: {0}")]
    JobFailed(String),
    #[error("launched effect panicked: {0}")]
    JobPanicked(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Effect(#[from] EffectError),
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    }
}

/// Runs `f`, turning a panic into its message.
pub fn catch_panic(f: impl FnOnce()) -> Result<(), String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(&*payload))
}
