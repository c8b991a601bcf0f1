//! Capability tasks and the retry-backed invoker.
//!
//! A capability is one side-effecting task unit a routing role may invoke:
//! record lookups and mutations, and calls into the process coordinator.
//! Every invocation goes through the `Invoker`, which retries transient
//! failures with bounded exponential backoff. Capabilities must therefore
//! be idempotent under at-least-once execution.

mod account;
mod capability;
mod executor;
mod invoker;
mod records;

pub use account::{ACCOUNT_WORKER_KEY, WorkerCommand};
pub use capability::{Capability, SharedCapability, TaskError, TaskOutput};
pub use executor::{TaskDependencies, TaskExecutor};
pub use invoker::{Invoker, RetryPolicy};
