//! Wallet provider abstraction and a local key-backed implementation.

use crate::auth::siwe::SiweMessage;
use crate::auth::verify::{address_from_key, eip191_hash, to_checksum_address};
use crate::wallet::WalletError;
use async_trait::async_trait;
use chrono::Utc;
use k256::ecdsa::SigningKey;
use zeroize::Zeroizing;

/// What the connector asks a wallet to sign in with.
#[derive(Debug, Clone)]
pub struct SiweRequest {
    pub domain: String,
    pub uri: String,
    pub chain_id: u64,
    pub nonce: String,
    pub statement: Option<String>,
}

/// A sign-in message exactly as signed, with its `0x`-hex signature.
#[derive(Debug, Clone)]
pub struct SignedMessage {
    pub message: String,
    pub signature: String,
}

#[derive(Debug, Clone)]
pub struct ConnectedAccount {
    pub address: String,
    /// None when the wallet connected but did not sign.
    pub signed: Option<SignedMessage>,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectResponse {
    pub accounts: Vec<ConnectedAccount>,
}

/// Something that holds accounts and can sign a sign-in message.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Connect and sign a sign-in message built from `request`.
    ///
    /// Returns [`WalletError::Declined`] when the user refuses.
    async fn connect(&self, request: &SiweRequest) -> Result<ConnectResponse, WalletError>;
}

/// Single-account wallet over an in-process secp256k1 key.
pub struct LocalWallet {
    key: SigningKey,
    address: String,
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.address)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl LocalWallet {
    pub fn new(key: SigningKey) -> Self {
        let address = to_checksum_address(&address_from_key(key.verifying_key()));
        LocalWallet { key, address }
    }

    /// Parse a 32-byte private key given as hex, with or without `0x`.
    pub fn from_hex(private_key: &str) -> Result<Self, WalletError> {
        let trimmed = private_key.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = Zeroizing::new(
            hex::decode(digits).map_err(|e| WalletError::InvalidKey(e.to_string()))?,
        );
        let key =
            SigningKey::from_slice(&bytes).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        Ok(Self::new(key))
    }

    /// A wallet over a fresh random key.
    pub fn random() -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        loop {
            rand::fill(&mut seed[..]);
            // Out-of-range scalars are astronomically rare; draw again.
            if let Ok(key) = SigningKey::from_slice(&seed[..]) {
                return Self::new(key);
            }
        }
    }

    /// EIP-55 checksummed address of this wallet.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// `personal_sign`: EIP-191 digest, 65-byte `r || s || v` with `v` in {27, 28}.
    pub fn sign_message(&self, message: &str) -> Result<String, WalletError> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&eip191_hash(message))
            .map_err(|e| WalletError::Signing(e.to_string()))?;

        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        Ok(format!("0x{}", hex::encode(bytes)))
    }
}

#[async_trait]
impl WalletProvider for LocalWallet {
    async fn connect(&self, request: &SiweRequest) -> Result<ConnectResponse, WalletError> {
        let mut message = SiweMessage::new(
            &request.domain,
            &self.address,
            &request.uri,
            request.chain_id,
            &request.nonce,
            Utc::now(),
        );
        message.statement = request.statement.clone();

        let message = message.to_string();
        let signature = self.sign_message(&message)?;

        Ok(ConnectResponse {
            accounts: vec![ConnectedAccount {
                address: self.address.clone(),
                signed: Some(SignedMessage { message, signature }),
            }],
        })
    }
}
