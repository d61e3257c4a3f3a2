//! Bearer-token auth gating every route except `/login` and `/register`.
//! Deliberately minimal: one signing key, no refresh tokens, no rate
//! limiting (password hashing and token signing are the only primitives
//! the core claims; a "current principal" is assumed by every handler).

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::body::Body;
use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use deploy_models::errors::RequestHandlerError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tower::{Layer, Service};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("failed to sign token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    is_admin: bool,
    exp: i64,
}

/// Current authenticated principal, attached to the request by [`AuthLayer`]
/// and extracted by handlers that need it (`GET /users`, admin-only routes).
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: Uuid,
    pub is_admin: bool,
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

pub fn issue_token(secret: &str, user_id: Uuid, is_admin: bool, ttl: Duration) -> Result<String, AuthError> {
    let exp = (Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default()).timestamp();
    let claims = Claims { sub: user_id.to_string(), is_admin, exp };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?;
    Ok(token)
}

fn verify_token(secret: &str, token: &str) -> Option<CurrentUser> {
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default()).ok()?;
    let id = Uuid::parse_str(&data.claims.sub).ok()?;
    Some(CurrentUser { id, is_admin: data.claims.is_admin })
}

#[derive(Clone)]
pub struct AuthLayer {
    secret: Arc<String>,
}

impl AuthLayer {
    pub fn new(secret: String) -> Self {
        Self { secret: Arc::new(secret) }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware { inner, secret: self.secret.clone() }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    secret: Arc<String>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let secret = self.secret.clone();
        Box::pin(async move {
            let user = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .and_then(|token| verify_token(&secret, token));

            match user {
                Some(user) => {
                    req.extensions_mut().insert(user);
                    inner.call(req).await
                }
                None => {
                    let body = RequestHandlerError::new("missing or invalid bearer token", "unauthorized");
                    Ok((StatusCode::UNAUTHORIZED, axum::Json(body)).into_response())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn token_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue_token("test-secret", user_id, true, Duration::from_secs(60)).unwrap();
        let user = verify_token("test-secret", &token).unwrap();
        assert_eq!(user.id, user_id);
        assert!(user.is_admin);
    }

    #[test]
    fn token_rejected_with_wrong_secret() {
        let token = issue_token("test-secret", Uuid::new_v4(), false, Duration::from_secs(60)).unwrap();
        assert!(verify_token("other-secret", &token).is_none());
    }
}
