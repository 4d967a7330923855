//! Client side of the sign-in handshake.
//!
//! [`WalletConnector`] talks to the server; a [`WalletProvider`] holds the
//! account and produces the signature. [`LocalWallet`] is a provider backed
//! by a raw secp256k1 key, used by the `sign-in` subcommand and tests.

pub mod connector;
pub mod provider;

pub use connector::{Challenge, SignedIn, WalletConnector};
pub use provider::{
    ConnectResponse, ConnectedAccount, LocalWallet, SignedMessage, SiweRequest, WalletProvider,
};

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Wallet declined the request")]
    Declined,

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
