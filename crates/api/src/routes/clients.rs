//! Client management routes

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use bildout_billing::limits::LimitService;
use bildout_shared::types::Client;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
}

/// List the organization's active clients
pub async fn list_clients(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Client>>> {
    let clients: Vec<Client> = match query.search {
        Some(ref search) if !search.trim().is_empty() => {
            sqlx::query_as(
                r#"
                SELECT * FROM clients
                WHERE org_id = $1 AND deleted_at IS NULL
                  AND (name ILIKE $2 OR email ILIKE $2)
                ORDER BY name ASC
                "#,
            )
            .bind(auth_user.org_id)
            .bind(format!("%{}%", search.trim()))
            .fetch_all(&state.pool)
            .await?
        }
        _ => {
            sqlx::query_as(
                "SELECT * FROM clients WHERE org_id = $1 AND deleted_at IS NULL ORDER BY name ASC",
            )
            .bind(auth_user.org_id)
            .fetch_all(&state.pool)
            .await?
        }
    };

    Ok(Json(clients))
}

/// Create a client, subject to the plan's active-client limit
pub async fn create_client(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateClientRequest>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    let name = req.name.trim();
    if name.is_empty() || name.len() > 200 {
        return Err(ApiError::Validation(
            "Client name must be between 1 and 200 characters".to_string(),
        ));
    }

    if let Some(ref email) = req.email {
        if !email.trim().is_empty() && !email.contains('@') {
            return Err(ApiError::Validation(
                "Client email must be a valid email address".to_string(),
            ));
        }
    }

    let check = LimitService::new(state.pool.clone())
        .check_client_limit(auth_user.org_id)
        .await?;
    if !check.allowed {
        return Err(ApiError::LimitReached(format!(
            "The {} plan allows {} active clients. Upgrade to Pro for unlimited clients.",
            check.plan,
            check.limit.unwrap_or(0)
        )));
    }

    let client: Client = sqlx::query_as(
        r#"
        INSERT INTO clients (org_id, name, email, phone, address, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(auth_user.org_id)
    .bind(name)
    .bind(normalize(req.email))
    .bind(normalize(req.phone))
    .bind(normalize(req.address))
    .bind(normalize(req.notes))
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(client)))
}

/// Get a single client
pub async fn get_client(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(client_id): Path<Uuid>,
) -> ApiResult<Json<Client>> {
    let client: Option<Client> =
        sqlx::query_as("SELECT * FROM clients WHERE id = $1 AND org_id = $2 AND deleted_at IS NULL")
            .bind(client_id)
            .bind(auth_user.org_id)
            .fetch_optional(&state.pool)
            .await?;

    client.map(Json).ok_or(ApiError::NotFound)
}

/// Update a client
pub async fn update_client(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(client_id): Path<Uuid>,
    Json(req): Json<UpdateClientRequest>,
) -> ApiResult<Json<Client>> {
    let existing: Option<Client> =
        sqlx::query_as("SELECT * FROM clients WHERE id = $1 AND org_id = $2 AND deleted_at IS NULL")
            .bind(client_id)
            .bind(auth_user.org_id)
            .fetch_optional(&state.pool)
            .await?;

    let existing = existing.ok_or(ApiError::NotFound)?;

    if let Some(ref name) = req.name {
        if name.trim().is_empty() || name.len() > 200 {
            return Err(ApiError::Validation(
                "Client name must be between 1 and 200 characters".to_string(),
            ));
        }
    }

    let client: Client = sqlx::query_as(
        r#"
        UPDATE clients
        SET name = $1, email = $2, phone = $3, address = $4, notes = $5, updated_at = NOW()
        WHERE id = $6
        RETURNING *
        "#,
    )
    .bind(req.name.as_deref().map(str::trim).unwrap_or(&existing.name))
    .bind(normalize(req.email).or(existing.email))
    .bind(normalize(req.phone).or(existing.phone))
    .bind(normalize(req.address).or(existing.address))
    .bind(normalize(req.notes).or(existing.notes))
    .bind(client_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(client))
}

/// Soft-delete a client; invoices keep their reference
pub async fn delete_client(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(client_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query(
        "UPDATE clients SET deleted_at = NOW() WHERE id = $1 AND org_id = $2 AND deleted_at IS NULL",
    )
    .bind(client_id)
    .bind(auth_user.org_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}
