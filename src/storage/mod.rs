//! Storage layer for sign-in nonces and sessions.
//!
//! Two backends implement the same traits:
//! - Redis, shared by every server instance, with native key TTLs
//! - in-memory maps, for single-instance deployments without Redis and tests
//!
//! Redis values are JSON-serialized models.

pub mod nonce;
pub mod session;

use crate::models::{StoredNonce, StoredSession};
use async_trait::async_trait;

pub use nonce::{MemoryNonceStore, RedisNonceStore};
pub use session::{MemorySessionStore, RedisSessionStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Backing store for issued nonces.
///
/// `take` must check and remove in one atomic step: of any number of
/// concurrent `take` calls for the same nonce, at most one returns it.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Record a freshly issued nonce for `ttl_secs`.
    async fn insert(&self, record: &StoredNonce, ttl_secs: u64) -> Result<(), StoreError>;

    /// Look up a live nonce without consuming it.
    async fn get(&self, nonce: &str, now: u64) -> Result<Option<StoredNonce>, StoreError>;

    /// Remove and return a live nonce.
    async fn take(&self, nonce: &str, now: u64) -> Result<Option<StoredNonce>, StoreError>;
}

/// Backing store for established sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn store(&self, session: &StoredSession, ttl_secs: u64) -> Result<(), StoreError>;

    async fn get(&self, token: &str, now: u64) -> Result<Option<StoredSession>, StoreError>;

    /// Returns true if the session existed.
    async fn delete(&self, token: &str) -> Result<bool, StoreError>;
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
