use std::env;
use std::net::SocketAddr;

/// Minimum length of `COOKIE_SECRET`, in bytes.
pub const MIN_COOKIE_SECRET_LEN: usize = 32;

#[derive(Clone)]
pub struct Config {
    // Server
    pub bind_addr: SocketAddr,

    // Redis (optional: without it nonces and sessions live in process memory)
    pub redis_url: Option<String>,

    // Without Redis, track nonces only in signed cookies. For several
    // instances sharing no store; gives up consume-once.
    pub cookie_only_nonces: bool,

    // Cookies
    pub cookie_secret: String,
    pub cookie_secure: bool,

    // Sign-in message binding
    pub siwe_domain: String,
    pub siwe_uri: String,
    pub siwe_chain_id: u64,

    // TTLs (in seconds)
    pub nonce_ttl_secs: u64,
    pub session_ttl_secs: u64,

    // Rate limiting
    pub rate_limit_auth_per_min: u32,

    // Background purge of in-memory stores
    pub purge_interval_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("cookie_only_nonces", &self.cookie_only_nonces)
            .field("cookie_secret", &"[REDACTED]")
            .field("cookie_secure", &self.cookie_secure)
            .field("siwe_domain", &self.siwe_domain)
            .field("siwe_uri", &self.siwe_uri)
            .field("siwe_chain_id", &self.siwe_chain_id)
            .field("nonce_ttl_secs", &self.nonce_ttl_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("rate_limit_auth_per_min", &self.rate_limit_auth_per_min)
            .field("purge_interval_secs", &self.purge_interval_secs)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        // Cookie secret - required, signs the nonce fallback cookie
        let cookie_secret = env::var("COOKIE_SECRET")
            .map_err(|_| ConfigError::MissingVar("COOKIE_SECRET".to_string()))?;
        if cookie_secret.len() < MIN_COOKIE_SECRET_LEN {
            return Err(ConfigError::InvalidValue(
                "COOKIE_SECRET".to_string(),
                format!("must be at least {} bytes", MIN_COOKIE_SECRET_LEN),
            ));
        }
        let cookie_secure = parse_env_or_default("COOKIE_SECURE", true)?;

        // Redis - optional; empty counts as unset
        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty());
        let cookie_only_nonces = parse_env_or_default("COOKIE_ONLY_NONCES", false)?;

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;

        // Sign-in message binding
        let siwe_domain = env::var("SIWE_DOMAIN").unwrap_or_else(|_| "localhost:3000".to_string());
        let siwe_uri =
            env::var("SIWE_URI").unwrap_or_else(|_| format!("http://{}", siwe_domain));
        let siwe_chain_id = parse_env_or_default("SIWE_CHAIN_ID", 1)?;
        validate_binding(&siwe_domain, &siwe_uri)?;

        // TTLs
        let nonce_ttl_secs = parse_nonzero_env_or_default("NONCE_TTL_SECS", 600)?;
        let session_ttl_secs = parse_nonzero_env_or_default("SESSION_TTL_SECS", 86_400)?;

        // Rate limiting
        let rate_limit_auth_per_min = parse_env_or_default("RATE_LIMIT_AUTH_PER_MIN", 20)?;

        let purge_interval_secs = parse_nonzero_env_or_default("PURGE_INTERVAL_SECS", 60)?;

        Ok(Config {
            bind_addr,
            redis_url,
            cookie_only_nonces,
            cookie_secret,
            cookie_secure,
            siwe_domain,
            siwe_uri,
            siwe_chain_id,
            nonce_ttl_secs,
            session_ttl_secs,
            rate_limit_auth_per_min,
            purge_interval_secs,
        })
    }
}

/// Sign-in message binding for the `sign-in` subcommand.
///
/// Reads the same `SIWE_*` variables as the server. Without them the
/// message is bound to the host and origin of the server's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInConfig {
    pub domain: String,
    pub uri: String,
    pub chain_id: u64,
}

impl SignInConfig {
    pub fn from_env(base_url: &str) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let origin = base_url.trim_end_matches('/');
        let host = origin.split_once("://").map_or(origin, |(_, rest)| rest);

        let domain = env::var("SIWE_DOMAIN").unwrap_or_else(|_| host.to_string());
        let uri = env::var("SIWE_URI").unwrap_or_else(|_| origin.to_string());
        let chain_id = parse_env_or_default("SIWE_CHAIN_ID", 1)?;
        validate_binding(&domain, &uri)?;

        Ok(SignInConfig {
            domain,
            uri,
            chain_id,
        })
    }
}

/// Domain and URI must fit on their single lines of a sign-in message.
fn validate_binding(domain: &str, uri: &str) -> Result<(), ConfigError> {
    if domain.is_empty() || domain.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidValue(
            "SIWE_DOMAIN".to_string(),
            "must be a non-empty host[:port] without whitespace".to_string(),
        ));
    }
    if uri.is_empty() || uri.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidValue(
            "SIWE_URI".to_string(),
            "must be a non-empty URI without whitespace".to_string(),
        ));
    }
    Ok(())
}

/// Like [`parse_env_or_default`], rejecting zero.
///
/// Used for TTLs and intervals: a zero session TTL is refused by Redis
/// `SET EX` only after the nonce was spent, and a zero interval spins.
fn parse_nonzero_env_or_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = parse_env_or_default(key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Use a mutex to ensure tests run serially since they modify global env vars.
    // unwrap_or_else handles poison from prior panics.
    static TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn lock_test() -> std::sync::MutexGuard<'static, ()> {
        TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    const TEST_SECRET: &str = "test-cookie-secret-0123456789abcdef";

    fn clear_test_env() {
        for key in [
            "COOKIE_SECRET",
            "COOKIE_SECURE",
            "REDIS_URL",
            "COOKIE_ONLY_NONCES",
            "BIND_ADDR",
            "SIWE_DOMAIN",
            "SIWE_URI",
            "SIWE_CHAIN_ID",
            "NONCE_TTL_SECS",
            "SESSION_TTL_SECS",
            "RATE_LIMIT_AUTH_PER_MIN",
            "PURGE_INTERVAL_SECS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_parse_env_or_default() {
        let _guard = lock_test();

        env::set_var("TEST_U64", "12345");
        let result: Result<u64, ConfigError> = parse_env_or_default("TEST_U64", 100);
        assert_eq!(result.unwrap(), 12345);

        env::remove_var("TEST_U64");
        let result: Result<u64, ConfigError> = parse_env_or_default("TEST_U64", 100);
        assert_eq!(result.unwrap(), 100);
    }

    #[test]
    fn test_short_cookie_secret() {
        let _guard = lock_test();
        clear_test_env();

        // Set rather than remove so a local .env cannot fill it back in
        env::set_var("COOKIE_SECRET", "short");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue(ref s, _) if s == "COOKIE_SECRET"
        ));

        clear_test_env();
    }

    #[test]
    fn test_invalid_socket_addr() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("COOKIE_SECRET", TEST_SECRET);
        env::set_var("BIND_ADDR", "invalid_address");

        let result = Config::from_env();
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_, _)));

        clear_test_env();
    }

    #[test]
    fn test_invalid_chain_id() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("COOKIE_SECRET", TEST_SECRET);
        env::set_var("SIWE_CHAIN_ID", "mainnet");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ParseError(ref s, _) if s == "SIWE_CHAIN_ID"
        ));

        clear_test_env();
    }

    #[test]
    fn test_invalid_domain() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("COOKIE_SECRET", TEST_SECRET);
        env::set_var("SIWE_DOMAIN", "outfitly app");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue(ref s, _) if s == "SIWE_DOMAIN"
        ));

        clear_test_env();
    }

    #[test]
    fn test_zero_nonce_ttl() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("COOKIE_SECRET", TEST_SECRET);
        env::set_var("NONCE_TTL_SECS", "0");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue(ref s, _) if s == "NONCE_TTL_SECS"
        ));

        clear_test_env();
    }

    #[test]
    fn test_zero_session_ttl() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("COOKIE_SECRET", TEST_SECRET);
        env::set_var("SESSION_TTL_SECS", "0");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue(ref s, _) if s == "SESSION_TTL_SECS"
        ));

        clear_test_env();
    }

    #[test]
    fn test_zero_purge_interval() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("COOKIE_SECRET", TEST_SECRET);
        env::set_var("PURGE_INTERVAL_SECS", "0");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue(ref s, _) if s == "PURGE_INTERVAL_SECS"
        ));

        clear_test_env();
    }

    #[test]
    fn test_invalid_uri() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("COOKIE_SECRET", TEST_SECRET);
        env::set_var("SIWE_URI", "https://outfitly.app/sign in");

        let result = Config::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue(ref s, _) if s == "SIWE_URI"
        ));

        clear_test_env();
    }

    #[test]
    fn test_sign_in_config_defaults_to_base_url() {
        let _guard = lock_test();
        clear_test_env();

        let config = SignInConfig::from_env("http://localhost:3000/").unwrap();
        assert_eq!(
            config,
            SignInConfig {
                domain: "localhost:3000".to_string(),
                uri: "http://localhost:3000".to_string(),
                chain_id: 1,
            }
        );

        // Matches what the server binds to by default for the same host
        env::set_var("COOKIE_SECRET", TEST_SECRET);
        env::set_var("SIWE_DOMAIN", "localhost:3000");
        let server = Config::from_env().unwrap();
        assert_eq!(server.siwe_uri, config.uri);

        clear_test_env();
    }

    #[test]
    fn test_sign_in_config_overrides() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("SIWE_DOMAIN", "outfitly.app");
        env::set_var("SIWE_URI", "https://outfitly.app");
        env::set_var("SIWE_CHAIN_ID", "137");
        let config = SignInConfig::from_env("http://10.0.0.5:3000").unwrap();
        assert_eq!(config.domain, "outfitly.app");
        assert_eq!(config.uri, "https://outfitly.app");
        assert_eq!(config.chain_id, 137);

        env::set_var("SIWE_CHAIN_ID", "polygon");
        assert!(matches!(
            SignInConfig::from_env("http://10.0.0.5:3000").unwrap_err(),
            ConfigError::ParseError(ref s, _) if s == "SIWE_CHAIN_ID"
        ));

        clear_test_env();
    }

    #[test]
    fn test_config_defaults() {
        let _guard = lock_test();
        clear_test_env();

        // Override any .env values to ensure predictable results
        env::set_var("COOKIE_SECRET", TEST_SECRET);
        env::set_var("BIND_ADDR", "0.0.0.0:3000");
        env::set_var("REDIS_URL", "");
        env::set_var("SIWE_DOMAIN", "localhost:3000");

        let config = Config::from_env().unwrap();

        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:3000");
        assert_eq!(config.redis_url, None);
        assert!(!config.cookie_only_nonces);
        assert!(config.cookie_secure);
        assert_eq!(config.siwe_domain, "localhost:3000");
        assert_eq!(config.siwe_uri, "http://localhost:3000");
        assert_eq!(config.siwe_chain_id, 1);
        assert_eq!(config.nonce_ttl_secs, 600);
        assert_eq!(config.session_ttl_secs, 86_400);
        assert_eq!(config.rate_limit_auth_per_min, 20);
        assert_eq!(config.purge_interval_secs, 60);

        clear_test_env();
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let _guard = lock_test();
        clear_test_env();

        env::set_var("COOKIE_SECRET", TEST_SECRET);
        env::set_var("REDIS_URL", "redis://:hunter2@10.0.0.5:6379");

        let config = Config::from_env().unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains(TEST_SECRET));
        assert!(!debug.contains("hunter2"));

        clear_test_env();
    }
}
