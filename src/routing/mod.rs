//! Handoff routing: roles, the handoff graph, and the role planner.
//!
//! Roles are immutable configuration, constructed once per session (or
//! reseed). The planner decides what a role does with an inbound message;
//! the turn engine in `session::turn` executes those decisions.

mod planner;
mod role;
mod routine;

pub use planner::{PlannerError, RolePlanner, TurnAction};
pub use role::{RoleGraph, RoleGraphError, RoleSpec};
pub use routine::RoutinePlanner;

/// Whether the text contains an account-id-like token.
pub fn has_account_id(text: &str) -> bool {
    routine::extract_account_id(text).is_some()
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Free-form key/value routing state visible to all roles.
///
/// Capabilities update it through their outputs (e.g. remembering the
/// client id once a lookup succeeds); it travels with the checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingContext(BTreeMap<String, String>);

impl RoutingContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a context value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Set a context value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let _ = self.0.insert(key.into(), value.into());
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_set_get() {
        let mut ctx = RoutingContext::new();
        assert!(!ctx.contains("client_id"));

        ctx.set("client_id", "CL-1001");
        assert_eq!(ctx.get("client_id"), Some("CL-1001"));
        assert!(ctx.contains("client_id"));

        ctx.set("client_id", "CL-2002");
        assert_eq!(ctx.get("client_id"), Some("CL-2002"));
    }

    #[test]
    fn context_roundtrip() {
        let mut ctx = RoutingContext::new();
        ctx.set("client_id", "CL-1001");
        ctx.set("worker", "open-account-1");

        let json = serde_json::to_string(&ctx).unwrap();
        let parsed: RoutingContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ctx);
    }
}
