//! HTTP client for the nonce/verify handshake.

use crate::auth::cookie::{NONCE_COOKIE, SESSION_COOKIE};
use crate::auth::session::generate_nonce;
use crate::models::{SessionResponse, VerifyRequest};
use crate::wallet::provider::{SiweRequest, WalletProvider};
use crate::wallet::WalletError;
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};

/// A nonce to sign, plus the `siwb_nonce` cookie the server set with it.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub nonce: String,
    /// None when the nonce was generated locally.
    pub cookie: Option<String>,
}

/// A completed sign-in.
#[derive(Debug)]
pub struct SignedIn {
    pub session: SessionResponse,
    /// Value of the `siwb_session` cookie, usable as a Bearer token.
    pub token: Option<String>,
}

/// Drives one sign-in attempt against a server.
#[derive(Debug, Clone)]
pub struct WalletConnector {
    http: reqwest::Client,
    base_url: String,
    domain: String,
    uri: String,
    chain_id: u64,
    statement: Option<String>,
}

impl WalletConnector {
    pub fn new(base_url: &str, domain: &str, uri: &str, chain_id: u64) -> Self {
        WalletConnector {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            domain: domain.to_string(),
            uri: uri.to_string(),
            chain_id,
            statement: None,
        }
    }

    pub fn with_statement(mut self, statement: &str) -> Self {
        self.statement = Some(statement.to_string());
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch a nonce from the server.
    ///
    /// Never fails: if the server cannot be reached a random nonce is
    /// generated locally. That attempt has no server-side record and will
    /// only verify against a server that accepts it, so replay protection is
    /// weakened for it.
    pub async fn fetch_nonce(&self) -> Challenge {
        match self.request_nonce().await {
            Ok(challenge) => challenge,
            Err(e) => {
                tracing::warn!(error = %e, "Nonce request failed, using local nonce");
                Challenge {
                    nonce: generate_nonce(),
                    cookie: None,
                }
            }
        }
    }

    async fn request_nonce(&self) -> Result<Challenge, WalletError> {
        let resp = self
            .http
            .get(self.endpoint("/api/auth/nonce"))
            .send()
            .await?
            .error_for_status()?;

        let cookie = set_cookie_value(resp.headers(), NONCE_COOKIE);
        let nonce = resp.text().await?.trim().to_string();
        Ok(Challenge { nonce, cookie })
    }

    /// Run the full handshake with `provider`.
    ///
    /// Returns `Ok(None)` when the wallet declines or fails, returns no
    /// account or no signature, or when the server rejects the signature.
    /// Only transport errors on the verify call are returned as `Err`.
    pub async fn sign_in_session(
        &self,
        provider: &dyn WalletProvider,
    ) -> Result<Option<SignedIn>, WalletError> {
        let challenge = self.fetch_nonce().await;

        let request = SiweRequest {
            domain: self.domain.clone(),
            uri: self.uri.clone(),
            chain_id: self.chain_id,
            nonce: challenge.nonce.clone(),
            statement: self.statement.clone(),
        };

        let response = match provider.connect(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::info!(error = %e, "Wallet did not connect");
                return Ok(None);
            }
        };

        let Some(account) = response.accounts.into_iter().next() else {
            tracing::info!("Wallet returned no accounts");
            return Ok(None);
        };
        let Some(signed) = account.signed else {
            tracing::info!(address = %account.address, "Wallet returned no signature");
            return Ok(None);
        };

        let body = VerifyRequest {
            address: account.address,
            message: signed.message,
            signature: signed.signature,
        };

        let mut verify = self.http.post(self.endpoint("/api/auth/verify")).json(&body);
        if let Some(cookie) = &challenge.cookie {
            verify = verify.header(COOKIE, format!("{}={}", NONCE_COOKIE, cookie));
        }
        let resp = verify.send().await?;

        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), address = %body.address, "Sign-in rejected");
            return Ok(None);
        }

        let token = set_cookie_value(resp.headers(), SESSION_COOKIE);
        let session: SessionResponse = resp.json().await?;
        Ok(Some(SignedIn { session, token }))
    }

    /// Run the full handshake, reporting only whether a session was established.
    pub async fn sign_in(&self, provider: &dyn WalletProvider) -> bool {
        match self.sign_in_session(provider).await {
            Ok(signed_in) => signed_in.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in request failed");
                false
            }
        }
    }
}

/// Value of cookie `name` from a response's `Set-Cookie` headers.
fn set_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
