//! Coordination of dependent long-running worker processes.

mod coordinator;

pub use coordinator::{CoordinatorError, ProcessCoordinator, StatusSender};
