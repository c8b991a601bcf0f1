//! The turn engine.
//!
//! One turn processes one pending event end to end: admission gate, then
//! the routing loop over the handoff graph, invoking capability tasks and
//! accumulating the response text, structured output, and trace narrative
//! into a single `ChatInteraction`. The engine is pure with respect to
//! session state: it receives the current role, context, and transcript,
//! and returns a record of everything the actor should apply and log.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::gate::{AdmissionClassifier, GateError, REFUSAL_TEXT};
use crate::routing::{PlannerError, RoleGraph, RolePlanner, RoutingContext, TurnAction};
use crate::tasks::{TaskError, TaskExecutor};

use super::events::SessionEventPayload;
use super::interaction::{ChatInteraction, TranscriptEntry};

/// Everything a completed turn produced, for the actor to apply.
#[derive(Debug)]
pub struct TurnRecord {
    /// The interaction to append to history.
    pub interaction: ChatInteraction,
    /// The active role after the turn.
    pub active_role: String,
    /// The routing context after the turn.
    pub context: RoutingContext,
    /// Transcript entries contributed by the turn.
    pub transcript_entries: Vec<TranscriptEntry>,
    /// Event payloads to append to the log, in order.
    pub events: Vec<SessionEventPayload>,
}

/// Errors that abort a turn.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("admission check failed: {0}")]
    Gate(#[from] GateError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("task '{capability}' failed: {source}")]
    Task {
        capability: String,
        #[source]
        source: TaskError,
    },

    #[error("handoff depth limit ({max}) exceeded with no resolution")]
    HandoffDepthExceeded { max: u32 },

    #[error("no such role: {0}")]
    UnknownRole(String),
}

impl TurnError {
    /// Stable error code recorded in the event log.
    pub fn code(&self) -> &'static str {
        match self {
            TurnError::Gate(_) => "gate_failure",
            TurnError::Planner(_) => "planner_failure",
            TurnError::Task { .. } => "task_failure",
            TurnError::HandoffDepthExceeded { .. } => "handoff_depth_exceeded",
            TurnError::UnknownRole(_) => "unknown_role",
        }
    }
}

/// Runs turns against the handoff graph.
pub struct TurnEngine {
    gate: Arc<dyn AdmissionClassifier>,
    planner: Arc<dyn RolePlanner>,
    graph: RoleGraph,
    executor: TaskExecutor,
    max_handoff_depth: u32,
}

impl TurnEngine {
    pub fn new(
        gate: Arc<dyn AdmissionClassifier>,
        planner: Arc<dyn RolePlanner>,
        graph: RoleGraph,
        executor: TaskExecutor,
        max_handoff_depth: u32,
    ) -> Self {
        Self {
            gate,
            planner,
            graph,
            executor,
            max_handoff_depth,
        }
    }

    /// The graph's entry/default role.
    pub fn entry_role(&self) -> &str {
        self.graph.entry_role()
    }

    /// Run one user-message turn.
    pub async fn run_turn(
        &self,
        active_role: &str,
        context: &RoutingContext,
        transcript: &[TranscriptEntry],
        input: &str,
    ) -> Result<TurnRecord, TurnError> {
        // Admission gate first; a rejection short-circuits the turn with
        // the fixed refusal and never reaches routing.
        let verdict = self.gate.classify(input).await?;
        if !verdict.accepted {
            debug!(reason = %verdict.reason, "Admission gate rejected message");
            return Ok(TurnRecord {
                interaction: ChatInteraction {
                    user_prompt: input.to_string(),
                    text_response: REFUSAL_TEXT.to_string(),
                    structured_response: String::new(),
                    trace: format!("admission gate blocked the message - {}", verdict.reason),
                },
                active_role: active_role.to_string(),
                context: context.clone(),
                transcript_entries: Vec::new(),
                events: vec![SessionEventPayload::GateRejected {
                    content: input.to_string(),
                    reason: verdict.reason,
                }],
            });
        }

        self.route(active_role, context, transcript, input).await
    }

    /// Route an accepted message through the handoff graph.
    async fn route(
        &self,
        active_role: &str,
        context: &RoutingContext,
        transcript: &[TranscriptEntry],
        input: &str,
    ) -> Result<TurnRecord, TurnError> {
        let entry = self.graph.entry_role().to_string();

        let mut events = vec![SessionEventPayload::UserMessage {
            content: input.to_string(),
        }];
        let mut role = active_role.to_string();
        let mut context = context.clone();
        let mut text = String::new();
        let mut structured = String::new();
        let mut trace = String::new();
        let mut depth = 0u32;
        // Once the depth cap is hit, the turn falls back to the entry role
        // and further handoffs are suppressed.
        let mut at_depth_limit = false;

        'turn: loop {
            let spec = self
                .graph
                .get(&role)
                .ok_or_else(|| TurnError::UnknownRole(role.clone()))?;

            let actions = self
                .planner
                .plan(spec, &context, transcript, input)
                .await?;

            debug!(role = %role, actions = actions.len(), depth, "Planned turn actions");

            if actions.is_empty() {
                // A role with nothing to offer hands back to the entry role
                // rather than failing.
                if role != entry && !at_depth_limit {
                    depth += 1;
                    if depth > self.max_handoff_depth {
                        at_depth_limit = true;
                        trace.push_str(&format!(
                            "handoff depth limit reached; falling back to {entry}\n"
                        ));
                    } else {
                        trace.push_str(&format!("Handed off from {role} to {entry}\n"));
                    }
                    events.push(SessionEventPayload::RoleChange {
                        from: role.clone(),
                        to: entry.clone(),
                    });
                    role = entry.clone();
                    continue 'turn;
                }
                if text.is_empty() {
                    text.push_str("I'm not able to help with that request.");
                }
                break 'turn;
            }

            for action in actions {
                match action {
                    TurnAction::Say { text: part } => {
                        if !text.is_empty() {
                            text.push(' ');
                        }
                        text.push_str(&part);
                    }

                    TurnAction::Invoke {
                        capability,
                        arguments,
                    } => {
                        if !spec.has_capability(&capability) {
                            return Err(TurnError::Task {
                                capability: capability.clone(),
                                source: TaskError::Fatal(format!(
                                    "capability is not in role '{role}' capability set"
                                )),
                            });
                        }

                        let call_id = format!("call_{}", Uuid::new_v4());
                        trace.push_str(&format!("{role}: invoking {capability}\n"));
                        events.push(SessionEventPayload::TaskInvoked {
                            call_id: call_id.clone(),
                            capability: capability.clone(),
                            arguments: arguments.clone(),
                        });

                        let output = self
                            .executor
                            .execute(&capability, &arguments, &context)
                            .await
                            .map_err(|source| TurnError::Task {
                                capability: capability.clone(),
                                source,
                            })?;

                        structured.push_str(&output.value.to_string());
                        structured.push('\n');
                        events.push(SessionEventPayload::TaskCompleted {
                            call_id,
                            success: true,
                            output: output.value,
                        });

                        for (key, value) in output.context {
                            context.set(key.clone(), value.clone());
                            events.push(SessionEventPayload::ContextUpdated { key, value });
                        }
                    }

                    TurnAction::Handoff { target } if !at_depth_limit => {
                        let dest = if self.graph.permits(&role, &target) {
                            target
                        } else {
                            // Not a permitted edge: fall back to the entry
                            // role rather than fail.
                            trace.push_str(&format!(
                                "{role}: no permitted handoff to {target}\n"
                            ));
                            entry.clone()
                        };

                        depth += 1;
                        if depth > self.max_handoff_depth {
                            at_depth_limit = true;
                            trace.push_str(&format!(
                                "handoff depth limit reached; falling back to {entry}\n"
                            ));
                            if role != entry {
                                events.push(SessionEventPayload::RoleChange {
                                    from: role.clone(),
                                    to: entry.clone(),
                                });
                                role = entry.clone();
                            }
                            continue 'turn;
                        }

                        trace.push_str(&format!("Handed off from {role} to {dest}\n"));
                        events.push(SessionEventPayload::RoleChange {
                            from: role.clone(),
                            to: dest.clone(),
                        });
                        role = dest;
                        // Re-run the same inbound content against the new
                        // role within the same turn.
                        continue 'turn;
                    }

                    TurnAction::Handoff { target } => {
                        trace.push_str(&format!("handoff to {target} suppressed at depth limit\n"));
                    }
                }
            }

            break 'turn;
        }

        // The fallback pass must actually resolve the request; exceeding
        // the cap with nothing to show is a fatal routing error.
        if at_depth_limit && text.is_empty() && structured.is_empty() {
            return Err(TurnError::HandoffDepthExceeded {
                max: self.max_handoff_depth,
            });
        }

        events.push(SessionEventPayload::TurnCompleted {
            role: role.clone(),
            response: text.clone(),
        });

        let mut transcript_entries = vec![TranscriptEntry::user(input)];
        if !text.is_empty() {
            transcript_entries.push(TranscriptEntry::from_role(&role, &text));
        }

        Ok(TurnRecord {
            interaction: ChatInteraction {
                user_prompt: input.to_string(),
                text_response: text,
                structured_response: structured,
                trace,
            },
            active_role: role,
            context,
            transcript_entries,
            events,
        })
    }
}
