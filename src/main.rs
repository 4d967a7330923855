//! Outfitly wallet sign-in service entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Connect to Redis if configured, otherwise run on in-memory stores
//! 3. Build router with API routes
//! 4. Apply security headers middleware
//! 5. Start Axum server
//!
//! Also supports a `sign-in` subcommand that runs the wallet side of the
//! handshake against a running server with a local private key.

use outfitly_auth::{
    auth::{cookie::CookieSigner, middleware::AppState, NonceBackend, Nonces},
    cleanup,
    config::{Config, SignInConfig},
    middleware::security_headers,
    routes,
    storage::{RedisNonceStore, RedisSessionStore, SessionStore},
    wallet::{LocalWallet, WalletConnector},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use zeroize::Zeroizing;

fn print_sign_in_usage() {
    eprintln!("Usage: outfitly-auth sign-in <base-url> <private-key-hex>");
    eprintln!();
    eprintln!("Sign in to a running server with a local secp256k1 key.");
    eprintln!("The message is bound to SIWE_DOMAIN, SIWE_URI and SIWE_CHAIN_ID,");
    eprintln!("defaulting to the base URL's host, the base URL and chain 1.");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  outfitly-auth sign-in http://localhost:3000 0xac09...ff80");
    eprintln!();
    eprintln!("On success prints the session token, usable as:");
    eprintln!("  Authorization: Bearer <token>");
}

async fn sign_in(base_url: &str, private_key: &str) -> Result<(), String> {
    let wallet = LocalWallet::from_hex(private_key).map_err(|e| e.to_string())?;
    let binding = SignInConfig::from_env(base_url).map_err(|e| e.to_string())?;

    let connector =
        WalletConnector::new(base_url, &binding.domain, &binding.uri, binding.chain_id)
            .with_statement("Sign in to Outfitly");

    match connector.sign_in_session(&wallet).await {
        Ok(Some(signed_in)) => {
            eprintln!(
                "Signed in as {} on chain {} until {}",
                signed_in.session.address, signed_in.session.chain_id, signed_in.session.expires_at
            );
            if let Some(token) = signed_in.token {
                println!("{}", token);
            }
            Ok(())
        }
        Ok(None) => Err(format!("Sign-in rejected for {}", wallet.address())),
        Err(e) => Err(e.to_string()),
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Check for sign-in subcommand
    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && args[1] == "sign-in" {
        if args.len() != 4 {
            print_sign_in_usage();
            std::process::exit(1);
        }
        let private_key = Zeroizing::new(args[3].clone());

        if let Err(e) = sign_in(&args[2], &private_key).await {
            eprintln!("Error signing in: {}", e);
            std::process::exit(1);
        }
        return;
    }

    // Load config from environment
    let config = Config::from_env().expect("Failed to load config");
    tracing::info!("Starting outfitly-auth on {}", config.bind_addr);

    let signer =
        CookieSigner::new(config.cookie_secret.as_bytes()).expect("Invalid cookie secret");

    // Build shared state: Redis when configured, otherwise process memory
    let state = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).expect("Invalid Redis URL");

            // Verify Redis connection
            client
                .get_multiplexed_async_connection()
                .await
                .expect("Failed to connect to Redis");
            tracing::info!("Using Redis nonce and session stores");

            let sessions: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(client.clone()));
            AppState {
                nonces: Nonces::new(
                    NonceBackend::Primary(Arc::new(RedisNonceStore::new(client.clone()))),
                    signer,
                    config.nonce_ttl_secs,
                ),
                sessions,
                redis: Some(client),
                config: Arc::new(config.clone()),
            }
        }
        None => {
            if config.cookie_only_nonces {
                tracing::warn!(
                    "REDIS_URL not set and COOKIE_ONLY_NONCES on: a signed nonce replays until its cookie expires"
                );
            } else {
                tracing::warn!(
                    "REDIS_URL not set: nonces and sessions are local to this instance"
                );
            }

            let (state, stores) = AppState::in_memory(Arc::new(config.clone()), signer);
            tokio::spawn(cleanup::run_purge_loop(
                stores.nonces,
                stores.sessions,
                Duration::from_secs(config.purge_interval_secs),
            ));
            state
        }
    };

    // Explicit CORS: deny all cross-origin requests (single-origin deployment).
    // CorsLayer::new() with no allowed origins rejects all CORS preflight requests.
    let cors = CorsLayer::new();

    let app = routes::api_router()
        .layer(cors)
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state);

    // Bind to configured address
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", config.bind_addr);

    // Start server (with_connect_info required for ConnectInfo<SocketAddr> extractors)
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
