//! Cookie helpers: the HMAC-signed nonce fallback cookie and the session cookie.
//!
//! Nonce cookie value layout: `{nonce}.{expires_at}.{mac}` where `mac` is
//! base64url(HMAC-SHA256(secret, "{nonce}.{expires_at}")).

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Cookie carrying the signed nonce for cookie-only verification.
pub const NONCE_COOKIE: &str = "siwb_nonce";

/// Cookie carrying the session token after a successful sign-in.
pub const SESSION_COOKIE: &str = "siwb_session";

type HmacSha256 = Hmac<Sha256>;

/// Nonce recovered from a cookie whose MAC and expiry checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceCookie {
    pub nonce: String,
    pub expires_at: u64,
}

/// Signs and verifies nonce cookies with a server-held secret.
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl CookieSigner {
    pub fn new(secret: &[u8]) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(CookieSigner {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    fn tag(&self, payload: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac
    }

    /// Produce the signed cookie value for `nonce`.
    pub fn sign_nonce(&self, nonce: &str, expires_at: u64) -> String {
        let payload = format!("{}.{}", nonce, expires_at);
        let sig = URL_SAFE_NO_PAD.encode(self.tag(&payload).finalize().into_bytes());
        format!("{}.{}", payload, sig)
    }

    /// Check a cookie value's MAC and expiry.
    ///
    /// Returns `None` for tampered, malformed or expired values.
    pub fn verify_nonce(&self, value: &str, now: u64) -> Option<NonceCookie> {
        let (payload, sig_b64) = value.rsplit_once('.')?;
        let sig = URL_SAFE_NO_PAD.decode(sig_b64).ok()?;
        self.tag(payload).verify_slice(&sig).ok()?;

        let (nonce, expires_at) = payload.split_once('.')?;
        let expires_at = expires_at.parse::<u64>().ok()?;
        if now >= expires_at {
            return None;
        }

        Some(NonceCookie {
            nonce: nonce.to_string(),
            expires_at,
        })
    }
}

/// Build a `Set-Cookie` value for an HTTP-only, root-path cookie.
pub fn build_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> String {
    let secure_attr = if secure { "; Secure" } else { "" };
    format!(
        "{name}={value}; HttpOnly{secure}; SameSite=Lax; Max-Age={max_age}; Path=/",
        name = name,
        value = value,
        secure = secure_attr,
        max_age = max_age_secs,
    )
}

/// Build a `Set-Cookie` value that removes `name` from the browser.
pub fn build_cookie_clear(name: &str, secure: bool) -> String {
    build_cookie(name, "", 0, secure)
}

/// Read a cookie from the request's `Cookie` header.
pub fn get_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for raw in headers.get_all(header::COOKIE) {
        let Ok(raw) = raw.to_str() else {
            continue;
        };
        for part in raw.split(';') {
            let Some((name, value)) = part.trim().split_once('=') else {
                continue;
            };
            if name == cookie_name && !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}
