//! Retry-backed task invoker.
//!
//! Wraps every capability call with jittered exponential backoff. Retryable
//! failures are invisible to the routing graph unless the elapsed budget is
//! exhausted; fatal failures abort immediately.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::warn;

use crate::routing::RoutingContext;

use super::capability::{Capability, TaskError, TaskOutput};

/// Backoff parameters for retried invocations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_coefficient: f64,
    /// Ceiling on the per-retry delay.
    pub max_interval: Duration,
    /// Total time budget; once exceeded, the next failure is final.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(30),
            max_elapsed: Duration::from_secs(300),
        }
    }
}

/// Executes capabilities under a retry policy.
#[derive(Debug, Clone, Default)]
pub struct Invoker {
    policy: RetryPolicy,
}

impl Invoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Invoke a capability, retrying transient failures.
    pub async fn invoke(
        &self,
        capability: &dyn Capability,
        arguments: &Value,
        context: &RoutingContext,
    ) -> Result<TaskOutput, TaskError> {
        let started = Instant::now();
        let mut delay = self.policy.initial_interval;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let err = match capability.invoke(arguments, context).await {
                Ok(output) => return Ok(output),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if started.elapsed() + delay > self.policy.max_elapsed {
                return Err(TaskError::Fatal(format!(
                    "retries exhausted after {attempt} attempts: {err}"
                )));
            }

            warn!(
                capability = capability.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying capability invocation"
            );

            tokio::time::sleep(jittered(delay)).await;
            delay = delay
                .mul_f64(self.policy.backoff_coefficient)
                .min(self.policy.max_interval);
        }
    }
}

/// Jitter a delay into [50%, 100%] of its nominal value.
fn jittered(delay: Duration) -> Duration {
    delay.mul_f64(0.5 + rand::random::<f64>() * 0.5)
}
