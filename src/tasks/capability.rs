//! Capability trait and task error taxonomy.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::routing::RoutingContext;
use crate::store::StorageError;

/// Result of a capability invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    /// Raw structured output, embedded in the interaction's
    /// `structured_response`.
    pub value: Value,
    /// Routing-context updates to apply after the invocation.
    pub context: Vec<(String, String)>,
}

impl TaskOutput {
    /// Output with no context updates.
    pub fn value(value: Value) -> Self {
        Self {
            value,
            context: Vec::new(),
        }
    }

    /// Attach a context update.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }
}

/// Errors from capability invocation.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No capability registered under this name.
    #[error("unknown capability: {0}")]
    Unknown(String),

    /// Transient failure; the invoker retries these.
    #[error("{0}")]
    Retryable(String),

    /// Permanent failure; aborts the enclosing turn immediately.
    #[error("{0}")]
    Fatal(String),
}

impl TaskError {
    /// Whether the invoker should retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Retryable(_))
    }

    /// Missing or malformed argument; always fatal.
    pub fn bad_argument(message: impl Into<String>) -> Self {
        TaskError::Fatal(message.into())
    }
}

impl From<StorageError> for TaskError {
    fn from(e: StorageError) -> Self {
        match e {
            // I/O against the record store may be transient.
            StorageError::Io { .. } => TaskError::Retryable(e.to_string()),
            _ => TaskError::Fatal(e.to_string()),
        }
    }
}

/// A side-effecting task unit invocable from a routing role.
#[async_trait]
pub trait Capability: Send + Sync {
    /// The unique name of this capability.
    fn name(&self) -> &str;

    /// Invoke the capability with JSON arguments and the session's routing
    /// context.
    async fn invoke(&self, arguments: &Value, context: &RoutingContext)
    -> Result<TaskOutput, TaskError>;
}

/// Type alias for a shared capability reference.
pub type SharedCapability = Arc<dyn Capability>;

/// Read a required string argument.
pub(crate) fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, TaskError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TaskError::bad_argument(format!("missing required argument '{key}'")))
}
