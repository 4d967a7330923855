//! Nonce issuance and single-use consumption.
//!
//! Every nonce is recorded twice: in the primary store (when one is
//! configured) and in an HMAC-signed cookie handed to the client. The store
//! is authoritative; the cookie only stands in when the store is missing or
//! failing.

use crate::auth::cookie::CookieSigner;
use crate::auth::session::generate_nonce;
use crate::error::AppError;
use crate::models::StoredNonce;
use crate::storage::{unix_now, NonceStore};
use std::sync::Arc;

/// Where issued nonces are tracked.
#[derive(Clone)]
pub enum NonceBackend {
    /// Shared key-value store with atomic take: consume-once holds across
    /// every server instance.
    Primary(Arc<dyn NonceStore>),

    /// Signed cookie only.
    ///
    /// Weaker guarantee: a cookie cannot be revoked server-side, so whoever
    /// holds the cookie and a signed message can replay them against any
    /// instance until the cookie expires.
    CookieFallback,
}

impl NonceBackend {
    pub fn name(&self) -> &'static str {
        match self {
            NonceBackend::Primary(_) => "primary",
            NonceBackend::CookieFallback => "cookie",
        }
    }
}

/// Which record vouched for a nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceSource {
    Store,
    Cookie,
}

/// A freshly issued nonce and its fallback cookie value.
#[derive(Debug, Clone)]
pub struct IssuedNonce {
    pub nonce: String,
    pub cookie_value: String,
    pub expires_at: u64,
    /// False when the primary store write failed or no store is configured.
    pub persisted: bool,
}

/// Issues nonces and consumes them at most once.
#[derive(Clone)]
pub struct Nonces {
    backend: NonceBackend,
    signer: CookieSigner,
    ttl_secs: u64,
}

impl Nonces {
    pub fn new(backend: NonceBackend, signer: CookieSigner, ttl_secs: u64) -> Self {
        Nonces {
            backend,
            signer,
            ttl_secs,
        }
    }

    pub fn backend(&self) -> &NonceBackend {
        &self.backend
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub async fn issue(&self) -> IssuedNonce {
        self.issue_at(unix_now()).await
    }

    /// Generate a nonce valid for the configured TTL from `now`.
    ///
    /// Never fails: if the primary store rejects the write the nonce is
    /// still returned, backed only by its cookie.
    pub async fn issue_at(&self, now: u64) -> IssuedNonce {
        let record = StoredNonce {
            nonce: generate_nonce(),
            issued_at: now,
            expires_at: now + self.ttl_secs,
        };

        let persisted = match &self.backend {
            NonceBackend::Primary(store) => match store.insert(&record, self.ttl_secs).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(action = "nonce_store_degraded", error = %e, "Nonce store write failed, issuing cookie-only nonce");
                    false
                }
            },
            NonceBackend::CookieFallback => false,
        };

        IssuedNonce {
            cookie_value: self.signer.sign_nonce(&record.nonce, record.expires_at),
            nonce: record.nonce,
            expires_at: record.expires_at,
            persisted,
        }
    }

    /// Whether the cookie is authentic, unexpired and names `nonce`.
    fn cookie_vouches(&self, nonce: &str, cookie: Option<&str>, now: u64) -> bool {
        cookie
            .and_then(|value| self.signer.verify_nonce(value, now))
            .is_some_and(|c| c.nonce == nonce)
    }

    /// Confirm `nonce` is live without consuming it.
    ///
    /// With a primary store, a nonce the store does not know is rejected even
    /// when its cookie is valid. The cookie only stands in when the store errors.
    pub async fn check(
        &self,
        nonce: &str,
        cookie: Option<&str>,
        now: u64,
    ) -> Result<NonceSource, AppError> {
        match &self.backend {
            NonceBackend::Primary(store) => match store.get(nonce, now).await {
                Ok(Some(_)) => Ok(NonceSource::Store),
                Ok(None) => Err(AppError::Replay(
                    "Nonce unknown, expired or already used".to_string(),
                )),
                Err(e) if self.cookie_vouches(nonce, cookie, now) => {
                    tracing::warn!(action = "nonce_store_degraded", error = %e, "Nonce store read failed, falling back to cookie");
                    Ok(NonceSource::Cookie)
                }
                Err(e) => Err(AppError::StoreUnavailable(e.to_string())),
            },
            NonceBackend::CookieFallback => {
                if self.cookie_vouches(nonce, cookie, now) {
                    Ok(NonceSource::Cookie)
                } else {
                    Err(AppError::Replay(
                        "Nonce unknown, expired or already used".to_string(),
                    ))
                }
            }
        }
    }

    pub async fn consume(&self, nonce: &str, cookie: Option<&str>) -> Result<bool, AppError> {
        self.consume_at(nonce, cookie, unix_now()).await
    }

    /// Invalidate `nonce`, returning whether it was live and unused.
    ///
    /// With a primary store this is an atomic take and returns true at most
    /// once per nonce. In cookie mode it degrades to "cookie present and
    /// matching" with no replay protection across requests.
    pub async fn consume_at(
        &self,
        nonce: &str,
        cookie: Option<&str>,
        now: u64,
    ) -> Result<bool, AppError> {
        match &self.backend {
            NonceBackend::Primary(store) => match store.take(nonce, now).await {
                Ok(record) => Ok(record.is_some()),
                Err(e) if self.cookie_vouches(nonce, cookie, now) => {
                    tracing::warn!(action = "nonce_store_degraded", error = %e, "Nonce store take failed, falling back to cookie");
                    Ok(true)
                }
                Err(e) => Err(AppError::StoreUnavailable(e.to_string())),
            },
            NonceBackend::CookieFallback => Ok(self.cookie_vouches(nonce, cookie, now)),
        }
    }
}
