//! EIP-191 `personal_sign` signature verification.
//!
//! Wallets sign `"\x19Ethereum Signed Message:\n" + len(message) + message`
//! hashed with Keccak-256. The signer address is the last 20 bytes of the
//! Keccak-256 hash of the recovered uncompressed public key.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

/// Signature and address decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Invalid signature hex: {0}")]
    Hex(String),

    #[error("Invalid signature length: expected 65 bytes, got {0}")]
    Length(usize),

    #[error("Invalid recovery id: {0}")]
    RecoveryId(u8),

    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Signature recovery failed: {0}")]
    Recovery(String),
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// Digest a wallet signs for `personal_sign` over `message`.
pub fn eip191_hash(message: &str) -> [u8; 32] {
    let prefixed = format!("\x19Ethereum Signed Message:\n{}{}", message.len(), message);
    keccak256(prefixed.as_bytes())
}

/// Derive the 20-byte Ethereum address of a secp256k1 public key.
pub fn address_from_key(key: &VerifyingKey) -> [u8; 20] {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed-point tag
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Render an address with its EIP-55 mixed-case checksum.
pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> if i % 2 == 0 { 4 } else { 0 }) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a `0x`-prefixed hex address.
///
/// All-lowercase and all-uppercase forms are accepted as-is; a mixed-case
/// address must carry a valid EIP-55 checksum.
pub fn parse_address(address: &str) -> Result<[u8; 20], SignatureError> {
    let hex_part = address
        .strip_prefix("0x")
        .ok_or_else(|| SignatureError::Address("missing 0x prefix".to_string()))?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SignatureError::Address(
            "expected 40 hex characters".to_string(),
        ));
    }

    let bytes = hex::decode(hex_part).map_err(|e| SignatureError::Address(e.to_string()))?;
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);

    let is_mixed_case = hex_part.chars().any(|c| c.is_ascii_lowercase())
        && hex_part.chars().any(|c| c.is_ascii_uppercase());
    if is_mixed_case && to_checksum_address(&out) != address {
        return Err(SignatureError::Address("bad EIP-55 checksum".to_string()));
    }

    Ok(out)
}

/// Recover the address that produced `signature_hex` over exactly `message`.
///
/// `signature_hex` is `r || s || v` (65 bytes), optionally `0x`-prefixed,
/// with `v` in {0, 1, 27, 28}.
pub fn recover_address(message: &str, signature_hex: &str) -> Result<[u8; 20], SignatureError> {
    let sig_bytes = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|e| SignatureError::Hex(e.to_string()))?;

    if sig_bytes.len() != 65 {
        return Err(SignatureError::Length(sig_bytes.len()));
    }

    let (rs, v) = sig_bytes.split_at(64);
    let v = match v[0] {
        0 | 27 => 0u8,
        1 | 28 => 1u8,
        other => return Err(SignatureError::RecoveryId(other)),
    };
    let recovery_id = RecoveryId::from_byte(v).ok_or(SignatureError::RecoveryId(v))?;

    let signature =
        Signature::from_slice(rs).map_err(|e| SignatureError::Recovery(e.to_string()))?;

    let digest = eip191_hash(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|e| SignatureError::Recovery(e.to_string()))?;

    Ok(address_from_key(&key))
}

/// Verify that `address` signed `message`.
///
/// # Returns
/// * `Ok(true)` if the recovered signer is `address`
/// * `Ok(false)` if the signature recovers to another key or not at all
/// * `Err(SignatureError)` if the address or signature is malformed
pub fn verify_signature(
    address: &str,
    message: &str,
    signature_hex: &str,
) -> Result<bool, SignatureError> {
    let expected = parse_address(address)?;

    match recover_address(message, signature_hex) {
        Ok(recovered) => Ok(recovered == expected),
        Err(SignatureError::Recovery(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
