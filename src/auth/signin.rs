//! Sign-in verification.
//!
//! Order matters: the nonce is checked before any signature work, and only
//! consumed once the signature is known good, so a forged request cannot
//! burn someone else's nonce.

use crate::auth::nonce::{NonceSource, Nonces};
use crate::auth::siwe::SiweMessage;
use crate::auth::verify::{parse_address, to_checksum_address, verify_signature};
use crate::error::AppError;
use crate::models::VerifyRequest;
use chrono::{DateTime, Utc};

/// Domain, URI and chain a sign-in message must be bound to.
#[derive(Debug, Clone)]
pub struct SignInPolicy {
    pub domain: String,
    pub uri: String,
    pub chain_id: u64,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedSignIn {
    /// EIP-55 checksummed signer address.
    pub address: String,
    pub chain_id: u64,
    pub nonce_source: NonceSource,
}

/// Run every check on a signed sign-in request and consume its nonce.
///
/// Any error leaves no session behind; the caller must start over with a
/// new nonce.
pub async fn verify_sign_in(
    nonces: &Nonces,
    policy: &SignInPolicy,
    req: &VerifyRequest,
    nonce_cookie: Option<&str>,
    now: u64,
) -> Result<VerifiedSignIn, AppError> {
    if req.address.trim().is_empty()
        || req.message.trim().is_empty()
        || req.signature.trim().is_empty()
    {
        return Err(AppError::BadRequest(
            "address, message and signature are required".to_string(),
        ));
    }

    let claimed = parse_address(&req.address)
        .map_err(|e| AppError::BadRequest(format!("Invalid address: {}", e)))?;

    // 1. Message shape, binding and nonce freshness
    let message: SiweMessage = req.message.parse()?;

    let message_address = parse_address(&message.address)
        .map_err(|e| AppError::BadRequest(format!("Invalid message address: {}", e)))?;
    if message_address != claimed {
        return Err(AppError::BadRequest(
            "Address does not match sign-in message".to_string(),
        ));
    }
    if message.domain != policy.domain {
        tracing::warn!(action = "auth_failed", address = %req.address, domain = %message.domain, "Domain mismatch");
        return Err(AppError::Unauthorized("Domain mismatch".to_string()));
    }
    if message.uri != policy.uri {
        tracing::warn!(action = "auth_failed", address = %req.address, uri = %message.uri, "URI mismatch");
        return Err(AppError::Unauthorized("URI mismatch".to_string()));
    }
    if message.chain_id != policy.chain_id {
        return Err(AppError::Unauthorized("Chain ID mismatch".to_string()));
    }

    let now_dt: DateTime<Utc> = DateTime::from_timestamp(now as i64, 0)
        .ok_or_else(|| AppError::Internal("Clock out of range".to_string()))?;
    if !message.valid_at(now_dt) {
        return Err(AppError::Replay(
            "Sign-in message outside its validity window".to_string(),
        ));
    }

    let nonce_source = nonces.check(&message.nonce, nonce_cookie, now).await?;

    // 2. Signature over exactly the submitted message
    if !verify_signature(&req.address, &req.message, &req.signature)? {
        tracing::warn!(action = "auth_failed", address = %req.address, "Invalid signature");
        return Err(AppError::SignatureMismatch(format!(
            "signature does not recover to {}",
            req.address
        )));
    }

    // 3. Single use
    if !nonces
        .consume_at(&message.nonce, nonce_cookie, now)
        .await?
    {
        tracing::warn!(action = "replay_rejected", address = %req.address, "Nonce already consumed");
        return Err(AppError::Replay("Nonce already used".to_string()));
    }

    Ok(VerifiedSignIn {
        address: to_checksum_address(&claimed),
        chain_id: message.chain_id,
        nonce_source,
    })
}
