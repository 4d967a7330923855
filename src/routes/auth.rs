//! Auth API endpoints.

use crate::auth::cookie::{
    build_cookie, build_cookie_clear, get_cookie_value, NONCE_COOKIE, SESSION_COOKIE,
};
use crate::auth::middleware::{check_rate_limit, AppState, AuthSession};
use crate::auth::session::generate_session_token;
use crate::auth::signin::verify_sign_in;
use crate::error::AppError;
use crate::models::{SessionResponse, StoredSession, VerifyRequest};
use crate::storage::unix_now;
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};

/// Rate-limit window for nonce issuance, in seconds.
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

fn ip_hash(ip: &IpAddr) -> String {
    let mut hasher = std::hash::DefaultHasher::new();
    ip.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Count this request against the client's per-minute budget.
///
/// Only enforced with Redis. A Redis failure lets the request through: nonce
/// issuance must keep working while the store is down.
async fn nonce_rate_limit(state: &AppState, ip: IpAddr) -> Result<(), AppError> {
    let Some(client) = &state.redis else {
        return Ok(());
    };

    let key = format!("ratelimit:nonce:{}", ip);
    let allowed = match client.get_multiplexed_async_connection().await {
        Ok(mut con) => check_rate_limit(
            &mut con,
            &key,
            state.config.rate_limit_auth_per_min,
            RATE_LIMIT_WINDOW_SECS,
        )
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Rate limit check failed, allowing request");
            true
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Redis connection error, skipping rate limit");
            true
        }
    };

    if !allowed {
        tracing::warn!(action = "rate_limited", endpoint = "auth/nonce", ip_hash = %ip_hash(&ip), "Rate limit exceeded");
        return Err(AppError::RateLimited);
    }
    Ok(())
}

/// GET /api/auth/nonce: Issue a sign-in nonce
///
/// The body is the bare nonce. The signed `siwb_nonce` cookie is set on
/// every response, whether or not the primary store took the write.
pub async fn issue_nonce(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<impl IntoResponse, AppError> {
    nonce_rate_limit(&state, addr.ip()).await?;

    let issued = state.nonces.issue().await;
    tracing::debug!(
        action = "nonce_issued",
        backend = state.nonces.backend().name(),
        persisted = issued.persisted,
        "Nonce issued"
    );

    let cookie = build_cookie(
        NONCE_COOKIE,
        &issued.cookie_value,
        state.nonces.ttl_secs(),
        state.config.cookie_secure,
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
            (header::SET_COOKIE, cookie),
        ],
        issued.nonce,
    ))
}

/// POST /api/auth/verify: Verify a signed sign-in message and create a session
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) =
        payload.map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?;

    let nonce_cookie = get_cookie_value(&headers, NONCE_COOKIE);
    let now = unix_now();

    let verified = verify_sign_in(
        &state.nonces,
        &state.sign_in_policy(),
        &req,
        nonce_cookie.as_deref(),
        now,
    )
    .await?;

    let session = StoredSession {
        token: generate_session_token(),
        address: verified.address,
        chain_id: verified.chain_id,
        created_at: now,
        expires_at: now + state.config.session_ttl_secs,
    };

    state
        .sessions
        .store(&session, state.config.session_ttl_secs)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store session: {}", e)))?;

    tracing::info!(
        action = "auth_success",
        address = %session.address,
        chain_id = session.chain_id,
        nonce_source = ?verified.nonce_source,
        "Wallet signed in"
    );

    let secure = state.config.cookie_secure;
    Ok((
        AppendHeaders([
            (
                header::SET_COOKIE,
                build_cookie(
                    SESSION_COOKIE,
                    &session.token,
                    state.config.session_ttl_secs,
                    secure,
                ),
            ),
            (header::SET_COOKIE, build_cookie_clear(NONCE_COOKIE, secure)),
        ]),
        Json(SessionResponse::from(&session)),
    ))
}

/// GET /api/auth/session: Describe the current session
pub async fn current_session(auth: AuthSession) -> Json<SessionResponse> {
    Json(SessionResponse::from(&auth.session))
}

/// POST /api/auth/logout: Invalidate current session
pub async fn logout(
    auth: AuthSession,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    state.sessions.delete(&auth.session.token).await?;

    tracing::info!(action = "logout", address = %auth.session.address, "Wallet signed out");

    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(
            header::SET_COOKIE,
            build_cookie_clear(SESSION_COOKIE, state.config.cookie_secure),
        )]),
    ))
}
