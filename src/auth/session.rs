//! Token and nonce generation for authentication.

use base64::{engine::general_purpose, Engine as _};
use rand::Rng;

/// Generate a cryptographically random session token.
///
/// Returns a base64-encoded string (44 characters) from 32 random bytes.
pub fn generate_session_token() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    general_purpose::STANDARD.encode(bytes)
}

/// Generate a cryptographically random sign-in nonce.
///
/// Returns 128 bits of entropy as 32 lowercase hex characters, which keeps
/// the nonce inside the alphanumeric alphabet EIP-4361 allows.
pub fn generate_nonce() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::siwe::is_valid_nonce;

    #[test]
    fn test_generate_session_token() {
        let token = generate_session_token();

        // Base64 of 32 bytes is 44 characters (with padding)
        assert_eq!(token.len(), 44);

        let decoded = general_purpose::STANDARD.decode(&token).unwrap();
        assert_eq!(decoded.len(), 32);
    }

    #[test]
    fn test_generate_nonce() {
        let nonce = generate_nonce();

        assert_eq!(nonce.len(), 32);
        assert!(is_valid_nonce(&nonce));
        assert_eq!(hex::decode(&nonce).unwrap().len(), 16);
    }

    #[test]
    fn test_tokens_are_unique() {
        let token1 = generate_session_token();
        let token2 = generate_session_token();
        assert_ne!(token1, token2);

        let nonce1 = generate_nonce();
        let nonce2 = generate_nonce();
        assert_ne!(nonce1, nonce2);
    }
}
