// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::Config,
    error::AppError,
    models::user::{Caller, Role},
};

/// JWT Claims structure. Tokens are issued elsewhere; this service only verifies them.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - the user id as a UUID string.
    pub sub: String,
    pub role: Role,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn caller(&self) -> Result<Caller, AppError> {
        let user_id = Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::AuthError("Invalid subject claim".to_string()))?;
        Ok(Caller::new(user_id, self.role))
    }
}

/// Signs a token for `user_id`. Used by tests and local tooling.
pub fn sign_jwt(
    user_id: Uuid,
    role: Role,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Axum Middleware: Authentication.
///
/// Validates the 'Authorization: Bearer <token>' header and injects both the
/// `Claims` and the derived `Caller` into the request extensions.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthError("Missing bearer token".to_string()))?;

    let claims = verify_jwt(token, &config.jwt_secret)?;
    let caller = claims.caller()?;

    req.extensions_mut().insert(claims);
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

fn caller_of(req: &Request<Body>) -> Result<Caller, AppError> {
    req.extensions()
        .get::<Caller>()
        .copied()
        .ok_or_else(|| AppError::AuthError("Not authenticated".to_string()))
}

/// Axum Middleware: teacher or admin only. Must run AFTER `auth_middleware`.
pub async fn staff_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    caller_of(&req)?.require_staff()?;
    Ok(next.run(req).await)
}

/// Axum Middleware: admin only. Must run AFTER `auth_middleware`.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    if caller_of(&req)?.role != Role::Admin {
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_token_verifies_into_caller() {
        let id = Uuid::new_v4();
        let token = sign_jwt(id, Role::Teacher, "secret", 60).unwrap();
        let caller = verify_jwt(&token, "secret").unwrap().caller().unwrap();
        assert_eq!(caller, Caller::new(id, Role::Teacher));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_jwt(Uuid::new_v4(), Role::Student, "secret", 60).unwrap();
        assert!(matches!(verify_jwt(&token, "other"), Err(AppError::AuthError(_))));
    }
}
