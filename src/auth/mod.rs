//! Sign-In with Ethereum: nonces, message parsing, signature recovery and sessions.

pub mod cookie;
pub mod middleware;
pub mod nonce;
pub mod session;
pub mod signin;
pub mod siwe;
pub mod verify;

pub use middleware::{check_rate_limit, AppState, AuthSession};
pub use nonce::{IssuedNonce, NonceBackend, NonceSource, Nonces};
pub use session::{generate_nonce, generate_session_token};
pub use signin::{verify_sign_in, SignInPolicy, VerifiedSignIn};
pub use siwe::SiweMessage;
pub use verify::verify_signature;
