//! Security headers middleware.
//!
//! Every response from this service is either a one-time nonce, a session
//! or an error about one, so nothing may be cached, framed or sniffed.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

/// Middleware that adds security headers to all responses.
///
/// - **Cache-Control: no-store**: nonces and session payloads must never be
///   served from a shared or browser cache.
/// - **Referrer-Policy: no-referrer**
/// - **X-Content-Type-Options: nosniff**
/// - **X-Frame-Options: DENY**
/// - **Strict-Transport-Security**: two years, subdomains included.
/// - **Content-Security-Policy**: the API serves no documents, so it
///   denies everything.
///
/// # Usage
///
/// ```rust,no_run
/// use axum::Router;
/// use axum::middleware;
/// use outfitly_auth::middleware::security_headers;
///
/// let app: Router = Router::new()
///     .layer(middleware::from_fn(security_headers));
/// ```
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert("pragma", HeaderValue::from_static("no-cache"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    response
}
