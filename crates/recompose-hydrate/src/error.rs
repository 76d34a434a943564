use thiserror::Error;

/// Why a hydration task did not complete. Reported through the task's
/// `on_error`; the queue keeps draining.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HydrationError {
    #[error("hydration task '{0}' reported failure")]
    Declined(String),
    #[error("hydration task '{task}' failed: {message}")]
    Failed { task: String, message: String },
    #[error("hydration task '{task}' panicked: {message}")]
    Panicked { task: String, message: String },
}

impl HydrationError {
    pub fn task_id(&self) -> &str {
        match self {
            HydrationError::Declined(task)
            | HydrationError::Failed { task, .. }
            | HydrationError::Panicked { task, .. } => task,
        }
    }
}

/// A replay handler that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("'{event_type}' handler on '{target}' failed: {message}")]
    HandlerFailed {
        target: String,
        event_type: String,
        message: String,
    },
    #[error("'{event_type}' handler on '{target}' panicked: {message}")]
    HandlerPanicked {
        target: String,
        event_type: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("hydration manifest is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported hydration manifest version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("no hydration manifest found in document")]
    Missing,
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback '{0}' is not registered in the hydration manifest")]
    Unknown(String),
    #[error("callback request to {path} failed")]
    Transport {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("callback response is not valid JSON: {0}")]
    Response(#[from] serde_json::Error),
    #[error("redirect response carries no url")]
    MissingUrl,
    #[error("navigation after callback failed")]
    Navigation(#[source] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown hydration priority '{0}'")]
pub struct ParsePriorityError(pub String);
