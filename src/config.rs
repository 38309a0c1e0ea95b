//! Centralised environment configuration, matching the env var list in §6.
//!
//! Each setting is a `Lazy` static read once from the process environment,
//! following the same pattern as the teacher's `config.rs`.

use once_cell::sync::Lazy;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// `embedded` or `server`.
pub static DATABASE_KIND: Lazy<String> = Lazy::new(|| env_string("DATABASE_KIND", "embedded"));

/// DSN for the server-grade engine; unused for `embedded`.
pub static DATABASE_URL: Lazy<String> =
    Lazy::new(|| env_string("DATABASE_URL", "sqlite://poolsync.db"));

pub static DATABASE_POOL_MIN_SIZE: Lazy<u32> =
    Lazy::new(|| env_u64("DATABASE_POOL_MIN_SIZE", 1) as u32);

pub static DATABASE_POOL_MAX_SIZE: Lazy<u32> =
    Lazy::new(|| env_u64("DATABASE_POOL_MAX_SIZE", 10) as u32);

pub static SERVER_HOST: Lazy<String> = Lazy::new(|| env_string("SERVER_HOST", "0.0.0.0"));

pub static SERVER_PORT: Lazy<u16> = Lazy::new(|| env_u64("SERVER_PORT", 8080) as u16);

/// HMAC signing secret for endpoint bearer tokens. Fails fast if unset so a
/// misconfigured deployment never serves with a default secret.
pub static AUTH_TOKEN_SIGNING_SECRET: Lazy<String> = Lazy::new(|| {
    std::env::var("SECURITY_AUTH_TOKEN_SIGNING_SECRET")
        .expect("SECURITY_AUTH_TOKEN_SIGNING_SECRET must be set")
});

pub static TOKEN_TTL_HOURS: Lazy<u64> = Lazy::new(|| env_u64("SECURITY_TOKEN_TTL_HOURS", 24));

/// Static allow-list of admin bearer tokens, comma separated.
pub static ADMIN_TOKENS: Lazy<Vec<String>> = Lazy::new(|| env_list("SECURITY_ADMIN_TOKENS"));

pub static HEARTBEAT_OFFLINE_THRESHOLD_SECONDS: Lazy<u64> =
    Lazy::new(|| env_u64("HEARTBEAT_OFFLINE_THRESHOLD_SECONDS", 300));

pub static SHUTDOWN_GRACEFUL_TIMEOUT_SECONDS: Lazy<u64> =
    Lazy::new(|| env_u64("SHUTDOWN_GRACEFUL_TIMEOUT_SECONDS", 30));

pub static SNAPSHOTS_RETAIN_PER_ENDPOINT: Lazy<u64> =
    Lazy::new(|| env_u64("SNAPSHOTS_RETAIN_PER_ENDPOINT", 10));

pub static CORS_ALLOWED_ORIGINS: Lazy<Vec<String>> =
    Lazy::new(|| env_list("CORS_ALLOWED_ORIGINS"));

pub static LOGGING_LEVEL: Lazy<String> = Lazy::new(|| env_string("LOGGING_LEVEL", "info"));

pub static LOGGING_STRUCTURED: Lazy<bool> = Lazy::new(|| env_bool("LOGGING_STRUCTURED", true));
