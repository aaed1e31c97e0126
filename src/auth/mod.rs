//! JWT authentication for the storefront API.
//!
//! A single HS256 `AuthService` issues and verifies bearer tokens. Handlers
//! receive the caller's identity through the `AuthUser` extractor, which
//! reads the verifier from request extensions (inserted once by middleware
//! in `main`). Ownership checks always compare against the stored user
//! reference, never against anything client-supplied.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(default)]
    pub roles: Vec<String>,
}

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(secret: &str, issuer: impl Into<String>, token_ttl: Duration) -> Self {
        let issuer = issuer.into();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer.clone()]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer,
            token_ttl,
        }
    }

    pub fn issue_token(&self, user_id: Uuid, roles: Vec<String>) -> Result<String, ServiceError> {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            exp: now + self.token_ttl.as_secs() as usize,
            iat: now,
            roles,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {e}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| ServiceError::Unauthorized("invalid or expired token".to_string()))
    }
}

/// Authenticated caller identity, as resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_service = parts
            .extensions
            .get::<Arc<AuthService>>()
            .cloned()
            .ok_or_else(|| {
                ServiceError::InternalError("authentication service not configured".to_string())
            })?;

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| {
                ServiceError::Unauthorized("missing bearer token".to_string())
            })?;

        let claims = auth_service.verify_token(token)?;
        let user_id = claims.sub.parse::<Uuid>().map_err(|_| {
            ServiceError::Unauthorized("token subject is not a valid user id".to_string())
        })?;

        Ok(AuthUser {
            user_id,
            roles: claims.roles,
        })
    }
}

/// Middleware making the verifier available to the `AuthUser` extractor.
pub async fn inject_auth_service(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(auth);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(
            "0123456789abcdef0123456789abcdef",
            "quitanda-api",
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn issued_tokens_verify_and_carry_identity() {
        let auth = service();
        let user_id = Uuid::new_v4();

        let token = auth
            .issue_token(user_id, vec![ROLE_ADMIN.to_string()])
            .unwrap();
        let claims = auth.verify_token(&token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.roles, vec![ROLE_ADMIN.to_string()]);
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let other = AuthService::new(
            "ffffffffffffffffffffffffffffffff",
            "quitanda-api",
            Duration::from_secs(3600),
        );
        let token = other.issue_token(Uuid::new_v4(), vec![]).unwrap();

        assert!(matches!(
            service().verify_token(&token),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn tokens_from_another_issuer_are_rejected() {
        let other = AuthService::new(
            "0123456789abcdef0123456789abcdef",
            "someone-else",
            Duration::from_secs(3600),
        );
        let token = other.issue_token(Uuid::new_v4(), vec![]).unwrap();

        assert!(matches!(
            service().verify_token(&token),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn admin_role_is_recognized() {
        let user = AuthUser {
            user_id: Uuid::new_v4(),
            roles: vec![ROLE_ADMIN.to_string()],
        };
        assert!(user.is_admin());

        let user = AuthUser {
            user_id: Uuid::new_v4(),
            roles: vec![],
        };
        assert!(!user.is_admin());
    }
}
