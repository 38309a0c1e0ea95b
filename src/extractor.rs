//! Axum extractors layering the auth scheme from spec §4.G / §6 onto
//! request handlers, in the same style as the teacher's `AuthUser`
//! extractor (a `FromRequestParts` impl reading the `Authorization`
//! header and decoding a bearer token).

use crate::auth;
use crate::db::Db;
use crate::error::AppError;
use crate::id::Id;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)
}

fn db_from_parts(parts: &Parts) -> Result<Db, AppError> {
    parts
        .extensions
        .get::<Db>()
        .cloned()
        .ok_or_else(|| AppError::Internal("database extension missing".into()))
}

/// A successfully authenticated endpoint, for endpoint-self routes.
pub struct EndpointAuth(pub Id);

#[async_trait]
impl<S> FromRequestParts<S> for EndpointAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let db = db_from_parts(parts)?;
        let endpoint_id = auth::authenticate(&db, token).await?;
        Ok(EndpointAuth(endpoint_id))
    }
}

/// Either an admin token or an authenticated endpoint — the "any
/// authenticated" class of route in spec §6's table.
pub enum Principal {
    Admin,
    Endpoint(Id),
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        if auth::is_admin_token(token) {
            return Ok(Principal::Admin);
        }
        let EndpointAuth(id) = EndpointAuth::from_request_parts(parts, state).await?;
        Ok(Principal::Endpoint(id))
    }
}

/// An admin token only — writes to Pool/Endpoint structure.
pub struct AdminAuth;

#[async_trait]
impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        if auth::is_admin_token(token) {
            Ok(AdminAuth)
        } else {
            Err(AppError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use axum::RequestPartsExt;

    #[tokio::test]
    async fn admin_token_is_recognised_by_principal() {
        std::env::set_var("SECURITY_ADMIN_TOKENS", "super-secret");
        let request = Request::builder()
            .header("Authorization", "Bearer super-secret")
            .body(axum::body::Body::empty())
            .unwrap();
        let mut parts = request.into_parts().0;
        let principal = Principal::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(matches!(principal, Principal::Admin));
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let request = Request::builder().body(axum::body::Body::empty()).unwrap();
        let mut parts = request.into_parts().0;
        let result = AdminAuth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }
}
