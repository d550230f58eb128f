//! Organization settings routes

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use bildout_shared::types::Organization;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateOrgRequest {
    pub name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub logo_url: Option<String>,
    pub accent_color: Option<String>,
    pub invoice_prefix: Option<String>,
    pub default_tax_rate_bps: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct OrgResponse {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    pub logo_url: Option<String>,
    pub accent_color: Option<String>,
    pub invoice_prefix: Option<String>,
    pub default_tax_rate_bps: i32,
    pub suspended_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<Organization> for OrgResponse {
    fn from(org: Organization) -> Self {
        Self {
            id: org.id,
            name: org.name,
            contact_email: org.contact_email,
            contact_phone: org.contact_phone,
            address: org.address,
            logo_url: org.logo_url,
            accent_color: org.accent_color,
            invoice_prefix: org.invoice_prefix,
            default_tax_rate_bps: org.default_tax_rate_bps,
            suspended_at: org.suspended_at,
            created_at: org.created_at,
            updated_at: org.updated_at,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Get current organization details
pub async fn get_org(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<OrgResponse>> {
    let org: Organization = sqlx::query_as("SELECT * FROM organizations WHERE id = $1")
        .bind(auth_user.org_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(org.into()))
}

/// Update organization settings and branding
pub async fn update_org(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<UpdateOrgRequest>,
) -> ApiResult<Json<OrgResponse>> {
    let org_id = auth_user.org_id;

    if let Some(ref name) = req.name {
        if name.trim().is_empty() || name.len() > 100 {
            return Err(ApiError::Validation(
                "Organization name must be between 1 and 100 characters".to_string(),
            ));
        }

        sqlx::query("UPDATE organizations SET name = $1, updated_at = NOW() WHERE id = $2")
            .bind(name.trim())
            .bind(org_id)
            .execute(&state.pool)
            .await?;
    }

    if let Some(ref email) = req.contact_email {
        if !email.is_empty() && !email.contains('@') {
            return Err(ApiError::Validation(
                "Contact email must be a valid email address".to_string(),
            ));
        }

        sqlx::query("UPDATE organizations SET contact_email = $1, updated_at = NOW() WHERE id = $2")
            .bind(empty_to_null(email))
            .bind(org_id)
            .execute(&state.pool)
            .await?;
    }

    if let Some(ref phone) = req.contact_phone {
        sqlx::query("UPDATE organizations SET contact_phone = $1, updated_at = NOW() WHERE id = $2")
            .bind(empty_to_null(phone))
            .bind(org_id)
            .execute(&state.pool)
            .await?;
    }

    if let Some(ref address) = req.address {
        sqlx::query("UPDATE organizations SET address = $1, updated_at = NOW() WHERE id = $2")
            .bind(empty_to_null(address))
            .bind(org_id)
            .execute(&state.pool)
            .await?;
    }

    if let Some(ref logo_url) = req.logo_url {
        sqlx::query("UPDATE organizations SET logo_url = $1, updated_at = NOW() WHERE id = $2")
            .bind(empty_to_null(logo_url))
            .bind(org_id)
            .execute(&state.pool)
            .await?;
    }

    if let Some(ref accent_color) = req.accent_color {
        sqlx::query("UPDATE organizations SET accent_color = $1, updated_at = NOW() WHERE id = $2")
            .bind(empty_to_null(accent_color))
            .bind(org_id)
            .execute(&state.pool)
            .await?;
    }

    if let Some(ref prefix) = req.invoice_prefix {
        if prefix.len() > 10 {
            return Err(ApiError::Validation(
                "Invoice prefix must be at most 10 characters".to_string(),
            ));
        }

        sqlx::query(
            "UPDATE organizations SET invoice_prefix = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(empty_to_null(prefix))
        .bind(org_id)
        .execute(&state.pool)
        .await?;
    }

    if let Some(rate) = req.default_tax_rate_bps {
        if !(0..=10_000).contains(&rate) {
            return Err(ApiError::Validation(
                "Tax rate must be between 0 and 10000 basis points".to_string(),
            ));
        }

        sqlx::query(
            "UPDATE organizations SET default_tax_rate_bps = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(rate)
        .bind(org_id)
        .execute(&state.pool)
        .await?;
    }

    let org: Organization = sqlx::query_as("SELECT * FROM organizations WHERE id = $1")
        .bind(org_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(org.into()))
}

fn empty_to_null(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
