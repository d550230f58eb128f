//! Authentication middleware
//!
//! Sessions are stateless bearer JWTs minted by the hosted auth provider.
//! The middleware decodes the token, loads the user row, and injects an
//! `AuthUser` extension for handlers. Admin routes re-check `is_admin`
//! inside the handler.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AuthState;

/// JWT claims issued by the auth provider
#[derive(Debug, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
}

/// Authenticated user attached to the request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub is_admin: bool,
}

impl AuthUser {
    /// Guard for admin back-office routes
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// Require a valid bearer token and an existing user row
pub async fn require_auth(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        ApiError::InvalidToken
    })?
    .claims;

    let user: Option<(Uuid, bool, Option<time::OffsetDateTime>)> = sqlx::query_as(
        r#"
        SELECT u.org_id, u.is_admin, o.suspended_at
        FROM users u
        JOIN organizations o ON o.id = u.org_id
        WHERE u.id = $1
        "#,
    )
    .bind(claims.sub)
    .fetch_optional(&state.pool)
    .await?;

    let (org_id, is_admin, suspended_at) = user.ok_or(ApiError::InvalidToken)?;

    // Suspended merchants lose dashboard access; platform admins keep theirs
    if suspended_at.is_some() && !is_admin {
        return Err(ApiError::Forbidden);
    }

    req.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        org_id,
        is_admin,
    });

    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
