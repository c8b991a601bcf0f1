//! Claim-check payload codec.
//!
//! Oversized values crossing a serialization boundary are replaced by a
//! small envelope carrying a fresh token; the real payload is stored in the
//! content store under that token and fetched back on decode. Values below
//! the threshold pass through unchanged, so the codec is free for the common
//! case.
//!
//! The codec is applied inside the file stores (event log lines, checkpoint
//! documents, history records). Nothing above the store layer ever sees an
//! envelope.

use std::sync::Arc;

use serde_json::{Value, json};
use uuid::Uuid;

use crate::store::{ContentStore, StorageError, StorageResult};

/// Marker value identifying a claim-check envelope.
pub const CLAIM_CHECK_MARKER: &str = "claim-checked";

/// Default size threshold in bytes above which values are claim-checked.
pub const DEFAULT_THRESHOLD_BYTES: usize = 32 * 1024;

/// Codec that substitutes oversized values with claim-check tokens.
#[derive(Clone)]
pub struct ClaimCheckCodec {
    store: Arc<dyn ContentStore>,
    threshold: usize,
}

impl ClaimCheckCodec {
    /// Create a codec over the given content store.
    pub fn new(store: Arc<dyn ContentStore>, threshold: usize) -> Self {
        Self { store, threshold }
    }

    /// Encode a value for storage.
    ///
    /// Returns the value unchanged if its compact serialization fits the
    /// threshold; otherwise stores the serialization and returns the
    /// envelope.
    pub async fn encode(&self, session_id: &str, value: Value) -> StorageResult<Value> {
        let bytes =
            serde_json::to_vec(&value).map_err(|e| StorageError::serialization(e.to_string()))?;
        if bytes.len() <= self.threshold {
            return Ok(value);
        }

        let token = Uuid::new_v4().to_string();
        self.store.put(session_id, &token, &bytes).await?;

        Ok(json!({
            "marker": CLAIM_CHECK_MARKER,
            "token": token,
        }))
    }

    /// Decode a stored value.
    ///
    /// Values without the marker are returned verbatim. A marked envelope
    /// whose token has no blob is a fatal deserialization error.
    pub async fn decode(&self, session_id: &str, value: Value) -> StorageResult<Value> {
        let Some(token) = envelope_token(&value) else {
            return Ok(value);
        };

        let bytes = self
            .store
            .get(session_id, token)
            .await?
            .ok_or_else(|| StorageError::MissingBlob {
                token: token.to_string(),
            })?;

        serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::serialization(format!("claim-check blob invalid: {e}")))
    }

    /// Size threshold in bytes.
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl std::fmt::Debug for ClaimCheckCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimCheckCodec")
            .field("threshold", &self.threshold)
            .finish()
    }
}

/// Extract the token from a claim-check envelope, if the value is one.
fn envelope_token(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.get("marker").and_then(Value::as_str) != Some(CLAIM_CHECK_MARKER) {
        return None;
    }
    obj.get("token").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::file::FileContentStore;
    use tempfile::TempDir;

    fn codec(temp_dir: &TempDir, threshold: usize) -> ClaimCheckCodec {
        let store = Arc::new(FileContentStore::new(temp_dir.path().join("blobs")));
        ClaimCheckCodec::new(store, threshold)
    }

    #[tokio::test]
    async fn small_value_passes_through() {
        let temp_dir = TempDir::new().unwrap();
        let codec = codec(&temp_dir, 1024);

        let value = json!({"balance": 203.45});
        let encoded = codec.encode("session1", value.clone()).await.unwrap();
        assert_eq!(encoded, value);

        let decoded = codec.decode("session1", encoded).await.unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn large_value_roundtrips_through_token() {
        let temp_dir = TempDir::new().unwrap();
        let codec = codec(&temp_dir, 64);

        let value = json!({"report": "x".repeat(500)});
        let encoded = codec.encode("session1", value.clone()).await.unwrap();

        assert_ne!(encoded, value);
        assert_eq!(encoded["marker"], CLAIM_CHECK_MARKER);
        assert!(encoded["token"].as_str().is_some());

        let decoded = codec.decode("session1", encoded).await.unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn decode_without_marker_is_identity() {
        let temp_dir = TempDir::new().unwrap();
        let codec = codec(&temp_dir, 64);

        // An object that happens to have a token field but no marker.
        let value = json!({"token": "not-a-claim-check"});
        let decoded = codec.decode("session1", value.clone()).await.unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn missing_blob_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let codec = codec(&temp_dir, 64);

        let envelope = json!({"marker": CLAIM_CHECK_MARKER, "token": "gone"});
        let err = codec.decode("session1", envelope).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingBlob { token } if token == "gone"));
    }

    #[tokio::test]
    async fn sessions_do_not_share_blobs() {
        let temp_dir = TempDir::new().unwrap();
        let codec = codec(&temp_dir, 64);

        let value = json!({"report": "y".repeat(500)});
        let encoded = codec.encode("session_a", value).await.unwrap();

        // Decoding under a different session must not find the blob.
        let err = codec.decode("session_b", encoded).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingBlob { .. }));
    }
}
