//! Admission gate.
//!
//! Every inbound user message is classified before it reaches routing.
//! Rejected messages short-circuit the turn with a fixed refusal; the
//! classifier's reason is recorded in the trace, never shown to the user.
//! External status events bypass the gate entirely; they originate from
//! trusted internal coordination.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed refusal shown for any rejected message, independent of content.
pub const REFUSAL_TEXT: &str = "I'm sorry, but I can only help with wealth management questions \
     related to beneficiaries and investments. Please ask me about your \
     beneficiaries, investment accounts, or other wealth management topics.";

/// Classifier verdict for one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    pub accepted: bool,
    /// Internal reasoning; recorded in the trace only.
    pub reason: String,
}

/// Errors from the admission gate.
#[derive(Debug, Error)]
pub enum GateError {
    /// The classifier endpoint is not configured.
    ///
    /// This is a non-retryable configuration failure.
    #[error("admission classifier endpoint is not configured")]
    MissingEndpoint,

    /// The classifier call failed.
    #[error("admission classifier call failed: {0}")]
    Classifier(String),
}

/// Binary pre-filter classifying whether user input is in-domain.
#[async_trait]
pub trait AdmissionClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<GateVerdict, GateError>;
}

// ============================================================================
// Keyword Classifier
// ============================================================================

const IN_DOMAIN_WORDS: &[&str] = &[
    "beneficiar",
    "invest",
    "account",
    "balance",
    "portfolio",
    "retirement",
    "savings",
    "checking",
    "brokerage",
    "kyc",
    "compliance",
    "client",
    "wealth",
];

/// Deterministic keyword classifier; the default implementation.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AdmissionClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<GateVerdict, GateError> {
        let lower = text.to_lowercase();

        if let Some(word) = IN_DOMAIN_WORDS.iter().find(|w| lower.contains(*w)) {
            return Ok(GateVerdict {
                accepted: true,
                reason: format!("matched in-domain term '{word}'"),
            });
        }

        // A bare account id is an in-domain continuation ("what is your
        // account id?" -> "CL-1001").
        if crate::routing::has_account_id(text) {
            return Ok(GateVerdict {
                accepted: true,
                reason: "account identifier present".to_string(),
            });
        }

        Ok(GateVerdict {
            accepted: false,
            reason: "no wealth management intent detected".to_string(),
        })
    }
}

// ============================================================================
// HTTP Classifier
// ============================================================================

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

/// Classifier backed by an external HTTP endpoint.
///
/// The endpoint receives `{"text": ...}` and must answer with a
/// `GateVerdict`-shaped JSON body.
pub struct HttpClassifier {
    endpoint: Option<String>,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AdmissionClassifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<GateVerdict, GateError> {
        let endpoint = self.endpoint.as_deref().ok_or(GateError::MissingEndpoint)?;

        let response = self
            .client
            .post(endpoint)
            .json(&ClassifyRequest { text })
            .send()
            .await
            .map_err(|e| GateError::Classifier(e.to_string()))?
            .error_for_status()
            .map_err(|e| GateError::Classifier(e.to_string()))?;

        response
            .json::<GateVerdict>()
            .await
            .map_err(|e| GateError::Classifier(e.to_string()))
    }
}
