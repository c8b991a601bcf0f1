//! Role specifications and the handoff graph.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role names used by the default advisory graph.
pub const SUPERVISOR_ROLE: &str = "supervisor";
pub const BENEFICIARY_ROLE: &str = "beneficiary";
pub const INVESTMENT_ROLE: &str = "investment";
pub const OPEN_ACCOUNT_ROLE: &str = "open-account";

/// A named node in the handoff graph.
///
/// Holds the role's capability set (the task units it may invoke) and its
/// permitted handoff targets. Immutable once the graph is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    /// Short description of what the role handles.
    #[serde(default)]
    pub description: String,
    /// Ordered list of invocable capability names.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Role names this role may hand off to.
    #[serde(default)]
    pub handoffs: Vec<String>,
}

impl RoleSpec {
    /// Whether this role may invoke the named capability.
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c == name)
    }

    /// Whether this role may hand off to the named target.
    pub fn permits_handoff(&self, target: &str) -> bool {
        self.handoffs.iter().any(|t| t == target)
    }
}

/// Errors from graph validation.
#[derive(Debug, Error)]
pub enum RoleGraphError {
    #[error("entry role '{0}' is not defined")]
    MissingEntryRole(String),

    #[error("role '{role}' hands off to undefined role '{target}'")]
    UnknownHandoffTarget { role: String, target: String },

    #[error("duplicate role name '{0}'")]
    DuplicateRole(String),
}

/// Directed graph of roles with a designated entry role.
#[derive(Debug, Clone)]
pub struct RoleGraph {
    roles: HashMap<String, RoleSpec>,
    entry: String,
}

impl RoleGraph {
    /// Build a graph from role specs, validating handoff targets.
    pub fn new(specs: Vec<RoleSpec>, entry: impl Into<String>) -> Result<Self, RoleGraphError> {
        let entry = entry.into();
        let mut roles = HashMap::with_capacity(specs.len());

        for spec in specs {
            if roles.contains_key(&spec.name) {
                return Err(RoleGraphError::DuplicateRole(spec.name));
            }
            let _ = roles.insert(spec.name.clone(), spec);
        }

        if !roles.contains_key(&entry) {
            return Err(RoleGraphError::MissingEntryRole(entry));
        }

        for spec in roles.values() {
            for target in &spec.handoffs {
                if !roles.contains_key(target) {
                    return Err(RoleGraphError::UnknownHandoffTarget {
                        role: spec.name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(Self { roles, entry })
    }

    /// The entry/default role name.
    pub fn entry_role(&self) -> &str {
        &self.entry
    }

    /// Look up a role by name.
    pub fn get(&self, name: &str) -> Option<&RoleSpec> {
        self.roles.get(name)
    }

    /// Whether `from` may hand off to `to`.
    pub fn permits(&self, from: &str, to: &str) -> bool {
        self.roles
            .get(from)
            .is_some_and(|spec| spec.permits_handoff(to))
    }

    /// The default advisory graph.
    ///
    /// Supervisor delegates to the beneficiary and investment roles, both
    /// of which can return to the supervisor. The investment role delegates
    /// account opening to the open-account role, which returns to it.
    pub fn advisory() -> Self {
        let specs = vec![
            RoleSpec {
                name: SUPERVISOR_ROLE.to_string(),
                description: "Delegates requests to the appropriate specialist role".to_string(),
                capabilities: vec![],
                handoffs: vec![BENEFICIARY_ROLE.to_string(), INVESTMENT_ROLE.to_string()],
            },
            RoleSpec {
                name: BENEFICIARY_ROLE.to_string(),
                description: "Lists, adds and deletes account beneficiaries".to_string(),
                capabilities: vec![
                    "list_beneficiaries".to_string(),
                    "add_beneficiary".to_string(),
                    "delete_beneficiary".to_string(),
                ],
                handoffs: vec![SUPERVISOR_ROLE.to_string()],
            },
            RoleSpec {
                name: INVESTMENT_ROLE.to_string(),
                description: "Lists and closes investment accounts".to_string(),
                capabilities: vec!["list_investments".to_string(), "close_investment".to_string()],
                handoffs: vec![SUPERVISOR_ROLE.to_string(), OPEN_ACCOUNT_ROLE.to_string()],
            },
            RoleSpec {
                name: OPEN_ACCOUNT_ROLE.to_string(),
                description: "Drives the account-opening worker through KYC and compliance"
                    .to_string(),
                capabilities: vec![
                    "open_investment_account".to_string(),
                    "get_client_profile".to_string(),
                    "update_client_profile".to_string(),
                    "approve_kyc".to_string(),
                    "approve_compliance".to_string(),
                ],
                handoffs: vec![INVESTMENT_ROLE.to_string()],
            },
        ];

        Self::new(specs, SUPERVISOR_ROLE).expect("default graph is valid")
    }
}
