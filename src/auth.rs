//! Endpoint Auth & Lifecycle primitives — spec §4.G.
//!
//! Tokens are HMAC-signed JWTs (`jsonwebtoken`, same crate and pattern as
//! the teacher's `auth.rs`) carrying `{endpoint_id, exp}`. Unlike a plain
//! stateless JWT, the server also stores a SHA-256 hash of the *whole
//! signed token* on the endpoint row; re-registration rotates the token
//! and overwrites that hash, which is what actually invalidates the old
//! token (its signature would otherwise still verify until `exp`). This
//! reconciles the spec's "encodes endpoint_id and an expiry" wording with
//! its "stores only a hash" / "constant-time hash comparison" wording.

use crate::config;
use crate::error::{AppError, AppResult};
use crate::id::Id;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time byte comparison, independent of any early-exit on length
/// (lengths of hex digests are fixed, but this also guards the admin-token
/// allow-list whose entries vary in length).
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub fn issue_token(endpoint_id: Id) -> AppResult<String> {
    let exp = Utc::now()
        .checked_add_signed(Duration::hours(*config::TOKEN_TTL_HOURS as i64))
        .expect("valid timestamp")
        .timestamp() as usize;
    let claims = Claims {
        sub: endpoint_id.to_string(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config::AUTH_TOKEN_SIGNING_SECRET.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
}

/// Decodes and verifies the JWT's signature and expiry, returning the
/// endpoint id it claims. Does not check the token against the stored
/// hash — see [`authenticate`] for the full check.
fn decode_claimed_endpoint(token: &str) -> AppResult<Id> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config::AUTH_TOKEN_SIGNING_SECRET.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized)?;
    Id::from_str(&decoded.claims.sub).map_err(|_| AppError::Unauthorized)
}

/// Authenticates a bearer token against the endpoint's stored hash.
/// Returns the endpoint id on success.
pub async fn authenticate(db: &crate::db::Db, token: &str) -> AppResult<Id> {
    let claimed = decode_claimed_endpoint(token)?;
    let stored_hash: Option<String> =
        sqlx::query_scalar("SELECT auth_token_hash FROM endpoints WHERE id = ?")
            .bind(claimed.to_string())
            .fetch_optional(db.pool())
            .await?;
    let stored_hash = stored_hash.ok_or(AppError::Unauthorized)?;
    let presented_hash = hash_token(token);
    if constant_time_eq(stored_hash.as_bytes(), presented_hash.as_bytes()) {
        Ok(claimed)
    } else {
        Err(AppError::Unauthorized)
    }
}

/// Endpoint-scoped mutations require `caller == target`.
pub fn authorize_self(caller: Id, target: Id) -> AppResult<()> {
    if caller == target {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub fn is_admin_token(token: &str) -> bool {
    config::ADMIN_TOKENS
        .iter()
        .any(|admin| constant_time_eq(admin.as_bytes(), token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_secret<T>(f: impl FnOnce() -> T) -> T {
        std::env::set_var("SECURITY_AUTH_TOKEN_SIGNING_SECRET", "test-secret");
        f()
    }

    #[test]
    fn issues_a_token_decodable_back_to_the_same_endpoint() {
        with_secret(|| {
            let id = Id::new();
            let token = issue_token(id).unwrap();
            assert_eq!(decode_claimed_endpoint(&token).unwrap(), id);
        });
    }

    #[test]
    fn rejects_garbage_tokens() {
        with_secret(|| {
            assert!(decode_claimed_endpoint("not-a-jwt").is_err());
        });
    }

    #[test]
    fn hash_is_deterministic_and_sensitive_to_input() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }

    #[test]
    fn authorize_self_rejects_mismatched_ids() {
        let a = Id::new();
        let b = Id::new();
        assert!(authorize_self(a, a).is_ok());
        assert!(authorize_self(a, b).is_err());
    }
}
