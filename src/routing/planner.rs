//! Role planner trait.
//!
//! The planner is the decision-maker behind a role: given the inbound text,
//! the transcript, and the routing context, it decides what the role says,
//! which capabilities it invokes, and whether it hands off. The contract is
//! the boundary; the turn engine executes whatever plan comes back and is
//! indifferent to how it was produced.

use async_trait::async_trait;
use thiserror::Error;

use crate::session::TranscriptEntry;

use super::{RoleSpec, RoutingContext};

/// One step a role takes within a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnAction {
    /// Produce response text.
    Say { text: String },
    /// Invoke a capability task with JSON arguments.
    Invoke {
        capability: String,
        arguments: serde_json::Value,
    },
    /// Hand the turn off to another role; the same inbound content is
    /// re-planned against the target within the same turn.
    Handoff { target: String },
}

/// Errors from planning.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("planner failed for role '{role}': {message}")]
    Failed { role: String, message: String },
}

/// Decides what a role does with an inbound message.
#[async_trait]
pub trait RolePlanner: Send + Sync {
    /// Plan the actions for `role` given the inbound `input`.
    ///
    /// An empty plan means the role cannot satisfy the request; the turn
    /// engine falls back to the entry role.
    async fn plan(
        &self,
        role: &RoleSpec,
        context: &RoutingContext,
        transcript: &[TranscriptEntry],
        input: &str,
    ) -> Result<Vec<TurnAction>, PlannerError>;
}
