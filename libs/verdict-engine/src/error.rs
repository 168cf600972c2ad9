use std::time::Duration;
use thiserror::Error;

/// Failures that stop a submission before or outside of user code.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller input is unusable; nothing was executed
    #[error("{0}")]
    InvalidInput(String),

    /// The context worker died without reporting back
    #[error("Sandbox worker failed: {0}")]
    Worker(String),
}

/// Failures raised by an [`ExecutionContext`](crate::context::ExecutionContext).
#[derive(Debug, Error)]
pub enum ContextError {
    /// The script threw or failed to parse
    #[error("{0}")]
    Script(String),

    /// The harness returned something it should never return
    #[error("Sandbox harness error: {0}")]
    Harness(String),
}

/// Typed outcome of a timed unit of work that did not complete normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("Code execution timeout ({})", format_timeout(.0))]
    Timeout(Duration),

    #[error("{message}")]
    Execution { message: String },

    #[error("Memory limit exceeded ({limit_mb} MB)")]
    MemoryLimit { limit_mb: usize },
}

impl InvokeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, InvokeError::Timeout(_))
    }
}

impl From<ContextError> for InvokeError {
    fn from(err: ContextError) -> Self {
        InvokeError::Execution {
            message: err.to_string(),
        }
    }
}

fn format_timeout(timeout: &Duration) -> String {
    if timeout.subsec_millis() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}
