//! Deterministic role routines.
//!
//! `RoutinePlanner` implements each role's routine as plain rules: the
//! supervisor delegates by topic, specialists ask for an account id when
//! they need one, invoke their capabilities, and transfer back to the
//! supervisor when a request is outside their routine. It is the default
//! `RolePlanner`; deployments wanting model-driven planning swap the trait
//! implementation.

use async_trait::async_trait;
use serde_json::json;

use crate::session::TranscriptEntry;

use super::role::{BENEFICIARY_ROLE, INVESTMENT_ROLE, OPEN_ACCOUNT_ROLE, SUPERVISOR_ROLE};
use super::{PlannerError, RolePlanner, RoleSpec, RoutingContext, TurnAction};

const BENEFICIARY_WORDS: &[&str] = &["beneficiar"];
const INVESTMENT_WORDS: &[&str] = &[
    "invest",
    "account",
    "balance",
    "portfolio",
    "savings",
    "checking",
    "retirement",
];
const RELATIONSHIPS: &[&str] = &[
    "son", "daughter", "spouse", "partner", "mother", "father", "brother", "sister",
];

/// Rule-based planner implementing the advisory role routines.
#[derive(Debug, Clone, Default)]
pub struct RoutinePlanner;

impl RoutinePlanner {
    pub fn new() -> Self {
        Self
    }

    fn plan_supervisor(&self, input: &str) -> Vec<TurnAction> {
        if mentions(input, BENEFICIARY_WORDS) {
            return vec![TurnAction::Handoff {
                target: BENEFICIARY_ROLE.to_string(),
            }];
        }
        if mentions(input, INVESTMENT_WORDS) || mentions(input, &["kyc", "compliance", "open"]) {
            return vec![TurnAction::Handoff {
                target: INVESTMENT_ROLE.to_string(),
            }];
        }
        vec![TurnAction::Say {
            text: "I can help with your beneficiaries and investment accounts. \
                   What would you like to do?"
                .to_string(),
        }]
    }

    fn plan_beneficiary(&self, context: &RoutingContext, input: &str) -> Vec<TurnAction> {
        let account_id = resolve_account_id(context, input);

        if !mentions(input, BENEFICIARY_WORDS) && extract_account_id(input).is_none() {
            return vec![TurnAction::Handoff {
                target: SUPERVISOR_ROLE.to_string(),
            }];
        }

        let Some(account_id) = account_id else {
            return vec![TurnAction::Say {
                text: "Could you give me your account id?".to_string(),
            }];
        };

        if mentions(input, &["add"]) {
            let (name, relationship) = parse_beneficiary(input);
            return vec![
                TurnAction::Invoke {
                    capability: "add_beneficiary".to_string(),
                    arguments: json!({
                        "account_id": account_id,
                        "name": name,
                        "relationship": relationship,
                    }),
                },
                TurnAction::Say {
                    text: "I've added the beneficiary to your account.".to_string(),
                },
            ];
        }

        if mentions(input, &["delete", "remove"]) {
            let (name, _) = parse_beneficiary(input);
            return vec![
                TurnAction::Invoke {
                    capability: "delete_beneficiary".to_string(),
                    arguments: json!({"account_id": account_id, "name": name}),
                },
                TurnAction::Say {
                    text: "I've removed that beneficiary from your account.".to_string(),
                },
            ];
        }

        vec![
            TurnAction::Invoke {
                capability: "list_beneficiaries".to_string(),
                arguments: json!({"account_id": account_id}),
            },
            TurnAction::Say {
                text: "Here are the beneficiaries on your account.".to_string(),
            },
        ]
    }

    fn plan_investment(&self, context: &RoutingContext, input: &str) -> Vec<TurnAction> {
        if mentions(input, &["kyc", "compliance"]) || (mentions(input, &["open"]) && mentions(input, &["account"])) {
            return vec![TurnAction::Handoff {
                target: OPEN_ACCOUNT_ROLE.to_string(),
            }];
        }

        if !mentions(input, INVESTMENT_WORDS) && !mentions(input, &["close"])
            && extract_account_id(input).is_none()
        {
            return vec![TurnAction::Handoff {
                target: SUPERVISOR_ROLE.to_string(),
            }];
        }

        let Some(account_id) = resolve_account_id(context, input) else {
            return vec![TurnAction::Say {
                text: "Could you give me your account id?".to_string(),
            }];
        };

        if mentions(input, &["close"]) {
            let name = named_account(input).unwrap_or_default();
            return vec![
                TurnAction::Invoke {
                    capability: "close_investment".to_string(),
                    arguments: json!({"account_id": account_id, "name": name}),
                },
                TurnAction::Say {
                    text: "I've closed that investment account.".to_string(),
                },
            ];
        }

        vec![
            TurnAction::Invoke {
                capability: "list_investments".to_string(),
                arguments: json!({"account_id": account_id}),
            },
            TurnAction::Say {
                text: "Here are your investment accounts and balances.".to_string(),
            },
        ]
    }

    fn plan_open_account(&self, context: &RoutingContext, input: &str) -> Vec<TurnAction> {
        if mentions(input, &["kyc"]) {
            return vec![
                TurnAction::Invoke {
                    capability: "approve_kyc".to_string(),
                    arguments: json!({}),
                },
                TurnAction::Say {
                    text: "KYC approval has been submitted.".to_string(),
                },
            ];
        }

        if mentions(input, &["compliance"]) {
            return vec![
                TurnAction::Invoke {
                    capability: "approve_compliance".to_string(),
                    arguments: json!({}),
                },
                TurnAction::Say {
                    text: "Compliance approval has been submitted.".to_string(),
                },
            ];
        }

        if mentions(input, &["open"]) {
            let Some(account_id) = resolve_account_id(context, input) else {
                return vec![TurnAction::Say {
                    text: "Could you give me your account id?".to_string(),
                }];
            };
            let name = named_account(input).unwrap_or_else(|| "Investment".to_string());
            let amount = extract_amount(input).unwrap_or(0.0);
            return vec![
                TurnAction::Invoke {
                    capability: "open_investment_account".to_string(),
                    arguments: json!({
                        "client_id": account_id,
                        "account_name": name,
                        "initial_amount": amount,
                    }),
                },
                TurnAction::Say {
                    text: "I've started opening your account. \
                           You'll see status updates here as it progresses."
                        .to_string(),
                },
            ];
        }

        vec![TurnAction::Handoff {
            target: INVESTMENT_ROLE.to_string(),
        }]
    }
}

#[async_trait]
impl RolePlanner for RoutinePlanner {
    async fn plan(
        &self,
        role: &RoleSpec,
        context: &RoutingContext,
        _transcript: &[TranscriptEntry],
        input: &str,
    ) -> Result<Vec<TurnAction>, PlannerError> {
        let actions = match role.name.as_str() {
            SUPERVISOR_ROLE => self.plan_supervisor(input),
            BENEFICIARY_ROLE => self.plan_beneficiary(context, input),
            INVESTMENT_ROLE => self.plan_investment(context, input),
            OPEN_ACCOUNT_ROLE => self.plan_open_account(context, input),
            other => {
                return Err(PlannerError::Failed {
                    role: other.to_string(),
                    message: "no routine defined".to_string(),
                });
            }
        };
        Ok(actions)
    }
}

// ============================================================================
// Text Helpers
// ============================================================================

fn mentions(input: &str, words: &[&str]) -> bool {
    let lower = input.to_lowercase();
    words.iter().any(|w| lower.contains(w))
}

/// Account id from context first, falling back to one found in the input.
fn resolve_account_id(context: &RoutingContext, input: &str) -> Option<String> {
    context
        .get("client_id")
        .map(str::to_string)
        .or_else(|| extract_account_id(input))
}

/// Find an account-id-like token: contains a digit, at least three
/// characters, alphanumeric with dashes.
pub(crate) fn extract_account_id(input: &str) -> Option<String> {
    input
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|t| {
            t.len() >= 3
                && t.chars().any(|c| c.is_ascii_digit())
                && t.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
        .map(str::to_string)
}

/// First numeric token, read as an amount.
fn extract_amount(input: &str) -> Option<f64> {
    input
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| c == '$' || c == ',' || c == '.'))
        .find_map(|t| t.replace(',', "").parse::<f64>().ok())
}

/// A named account kind mentioned in the input.
fn named_account(input: &str) -> Option<String> {
    let lower = input.to_lowercase();
    for kind in ["checking", "savings", "retirement", "brokerage"] {
        if lower.contains(kind) {
            let mut name = kind.to_string();
            name[..1].make_ascii_uppercase();
            return Some(name);
        }
    }
    None
}

/// Parse a beneficiary name and relationship out of the input.
///
/// Picks the first capitalized word that is not sentence-leading, and the
/// first relationship word anywhere.
fn parse_beneficiary(input: &str) -> (String, String) {
    let relationship = input
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .find(|t| RELATIONSHIPS.contains(&t.as_str()))
        .unwrap_or_else(|| "unspecified".to_string());

    let name = input
        .split_whitespace()
        .skip(1)
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|t| {
            t.chars().next().is_some_and(char::is_uppercase)
                && t.chars().all(char::is_alphabetic)
        })
        .unwrap_or("")
        .to_string();

    (name, relationship)
}
