//! Request and response models for the API.
//!
//! All models use serde for serialization/deserialization.
//! Storage models represent Redis data structures.

use serde::{Deserialize, Serialize};

// ============================================================================
// Auth Models
// ============================================================================

/// Request to verify a signed sign-in message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub address: String,
    pub message: String,
    pub signature: String, // 0x-prefixed hex, 65 bytes
}

/// Response after successful verification, and for session lookups.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub address: String,
    pub chain_id: u64,
    pub expires_at: u64,
}

// ============================================================================
// Storage Models
// ============================================================================

/// Issued nonce as stored in Redis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNonce {
    pub nonce: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

impl StoredNonce {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Session data as stored in Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub address: String, // EIP-55 checksummed
    pub chain_id: u64,
    pub created_at: u64,
    pub expires_at: u64,
}

impl StoredSession {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

impl From<&StoredSession> for SessionResponse {
    fn from(session: &StoredSession) -> Self {
        SessionResponse {
            address: session.address.clone(),
            chain_id: session.chain_id,
            expires_at: session.expires_at,
        }
    }
}
