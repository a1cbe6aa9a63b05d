use crate::errors::ServiceError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ROLE_CUSTOMER: &str = "customer";
pub const ROLE_ADMIN: &str = "admin";

/// JWT claims carried by storefront session tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Customer id.
    pub sub: String,
    pub email: Option<String>,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated customer resolved from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub customer_id: Uuid,
    pub email: Option<String>,
    pub role: String,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// The identity an order or promo redemption is attributed to. Guest emails
/// are accepted unverified (guest checkout is intentionally allowed).
#[derive(Debug, Clone)]
pub enum Requester {
    Customer { id: Uuid, email: Option<String> },
    Guest { email: String },
}

impl Requester {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Requester::Customer { .. })
    }

    /// Stable key used for per-user promo redemption counting.
    pub fn redeemer_key(&self) -> String {
        match self {
            Requester::Customer { id, .. } => id.to_string(),
            Requester::Guest { email } => email.trim().to_lowercase(),
        }
    }

    pub fn customer_id(&self) -> Option<Uuid> {
        match self {
            Requester::Customer { id, .. } => Some(*id),
            Requester::Guest { .. } => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Requester::Customer { email, .. } => email.as_deref(),
            Requester::Guest { email } => Some(email),
        }
    }
}

/// Issues a session token. Exposed for tooling and tests.
pub fn issue_token(
    secret: &str,
    customer_id: Uuid,
    email: Option<String>,
    role: &str,
    ttl_secs: i64,
) -> Result<String, ServiceError> {
    let now = Utc::now();
    let claims = Claims {
        sub: customer_id.to_string(),
        email,
        role: role.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_secs)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to issue token: {}", e)))
}

/// Verifies a bearer token and returns its claims.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ServiceError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| ServiceError::Unauthorized("Invalid or expired token".to_string()))
}

fn user_from_parts(parts: &Parts, secret: &str) -> Result<AuthenticatedUser, ServiceError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("Missing authorization header".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServiceError::Unauthorized("Malformed authorization header".to_string()))?;

    let claims = verify_token(secret, token)?;
    let customer_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ServiceError::Unauthorized("Invalid subject claim".to_string()))?;

    Ok(AuthenticatedUser {
        customer_id,
        email: claims.email,
        role: claims.role,
    })
}

#[async_trait]
impl FromRequestParts<crate::AppState> for AuthenticatedUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &crate::AppState,
    ) -> Result<Self, Self::Rejection> {
        user_from_parts(parts, &state.config.jwt_secret)
    }
}

/// Extractor that yields `None` instead of rejecting when no valid bearer
/// token is present, for endpoints that also serve guests.
#[derive(Debug, Clone)]
pub struct MaybeAuthenticated(pub Option<AuthenticatedUser>);

#[async_trait]
impl FromRequestParts<crate::AppState> for MaybeAuthenticated {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &crate::AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthenticated(
            user_from_parts(parts, &state.config.jwt_secret).ok(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key_for_testing_purposes_only";

    #[test]
    fn token_round_trip() {
        let id = Uuid::new_v4();
        let token = issue_token(SECRET, id, Some("a@b.c".into()), ROLE_CUSTOMER, 3600).unwrap();
        let claims = verify_token(SECRET, &token).unwrap();
        assert_eq!(claims.sub, id.to_string());
        assert_eq!(claims.email.as_deref(), Some("a@b.c"));
        assert_eq!(claims.role, ROLE_CUSTOMER);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), None, ROLE_CUSTOMER, 3600).unwrap();
        assert!(verify_token("another_secret_that_is_long_enough_too", &token).is_err());
    }

    #[test]
    fn guest_redeemer_key_is_normalized_email() {
        let guest = Requester::Guest {
            email: "  Shopper@Example.COM ".to_string(),
        };
        assert_eq!(guest.redeemer_key(), "shopper@example.com");
        assert!(!guest.is_authenticated());
    }
}
