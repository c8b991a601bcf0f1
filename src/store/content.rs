//! Content store trait for claim-checked blobs.

use async_trait::async_trait;

use super::error::StorageResult;

/// Keyed blob storage backing the claim-check codec.
///
/// Tokens are opaque and unique; callers never overwrite an existing token.
/// Blobs are grouped per session so deleting a session removes its blobs.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a blob under the given token.
    async fn put(&self, session_id: &str, token: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Fetch the blob for a token.
    ///
    /// Returns `Ok(None)` if the token is unknown.
    async fn get(&self, session_id: &str, token: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Remove all blobs belonging to a session.
    async fn delete_session(&self, session_id: &str) -> StorageResult<()>;
}
