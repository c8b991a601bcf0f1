//! Interaction and transcript types.
//!
//! A `ChatInteraction` is one externally visible request/response pair; the
//! ordered interaction list is the session history served to callers. The
//! transcript is the separate, internal accepted-message record used as the
//! decision context for role planning; it is what checkpoints carry.

use serde::{Deserialize, Serialize};

/// One request/response pair in the session history.
///
/// Appended exactly once per processed pending event, including admission
/// rejections and external status updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatInteraction {
    /// The inbound user text; empty for external status updates.
    pub user_prompt: String,
    /// The assembled text response.
    pub text_response: String,
    /// Concatenated raw capability outputs (JSON text), one per line.
    #[serde(default)]
    pub structured_response: String,
    /// Human-readable routing and tool narrative.
    #[serde(default)]
    pub trace: String,
}

impl ChatInteraction {
    /// Interaction recording an external status update.
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            user_prompt: String::new(),
            text_response: status.into(),
            structured_response: String::new(),
            trace: "external status recorded".to_string(),
        }
    }

    /// Interaction recording a fatal turn failure.
    ///
    /// No partial response output from the failed turn is carried over; only
    /// the error appears, in the trace.
    pub fn failed(user_prompt: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            text_response: String::new(),
            structured_response: String::new(),
            trace: format!("turn aborted: {error}"),
        }
    }
}

/// One entry in the accepted-message transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// `"user"` for inbound messages, otherwise the responding role name.
    pub role: String,
    pub content: String,
}

impl TranscriptEntry {
    /// Transcript entry for accepted user input.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Transcript entry for a role's response.
    pub fn from_role(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Whether this entry is user input.
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_interaction_has_empty_prompt() {
        let interaction = ChatInteraction::status("New Retirement account status changed: Complete");
        assert!(interaction.user_prompt.is_empty());
        assert_eq!(
            interaction.text_response,
            "New Retirement account status changed: Complete"
        );
        assert!(interaction.structured_response.is_empty());
    }

    #[test]
    fn failed_interaction_carries_error_in_trace_only() {
        let interaction = ChatInteraction::failed("list my things", "capability unavailable");
        assert_eq!(interaction.user_prompt, "list my things");
        assert!(interaction.text_response.is_empty());
        assert!(interaction.trace.contains("capability unavailable"));
    }

    #[test]
    fn interaction_serialization_roundtrip() {
        let interaction = ChatInteraction {
            user_prompt: "list my beneficiaries".to_string(),
            text_response: "You have 3 beneficiaries.".to_string(),
            structured_response: "[{\"name\":\"Fred\"}]\n".to_string(),
            trace: "beneficiary: invoking list_beneficiaries\n".to_string(),
        };

        let json = serde_json::to_string(&interaction).unwrap();
        let parsed: ChatInteraction = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, interaction);
    }

    #[test]
    fn transcript_entry_roles() {
        assert!(TranscriptEntry::user("hi").is_user());
        assert!(!TranscriptEntry::from_role("supervisor", "hello").is_user());
    }
}
