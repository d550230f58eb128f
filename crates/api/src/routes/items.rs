//! Reusable line-item template routes

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use bildout_shared::types::Item;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    pub description: Option<String>,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub tax_exempt: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit_price_cents: Option<i64>,
    pub tax_exempt: Option<bool>,
}

/// List the organization's active items
pub async fn list_items(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Item>>> {
    let items: Vec<Item> = sqlx::query_as(
        "SELECT * FROM items WHERE org_id = $1 AND deleted_at IS NULL ORDER BY name ASC",
    )
    .bind(auth_user.org_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(items))
}

/// Create a reusable item
pub async fn create_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateItemRequest>,
) -> ApiResult<(StatusCode, Json<Item>)> {
    let name = req.name.trim();
    if name.is_empty() || name.len() > 200 {
        return Err(ApiError::Validation(
            "Item name must be between 1 and 200 characters".to_string(),
        ));
    }

    if req.unit_price_cents < 0 {
        return Err(ApiError::Validation(
            "Unit price must not be negative".to_string(),
        ));
    }

    let item: Item = sqlx::query_as(
        r#"
        INSERT INTO items (org_id, name, description, unit_price_cents, tax_exempt)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(auth_user.org_id)
    .bind(name)
    .bind(req.description.as_deref().map(str::trim).filter(|d| !d.is_empty()))
    .bind(req.unit_price_cents)
    .bind(req.tax_exempt)
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// Get a single item
pub async fn get_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<Json<Item>> {
    let item: Option<Item> =
        sqlx::query_as("SELECT * FROM items WHERE id = $1 AND org_id = $2 AND deleted_at IS NULL")
            .bind(item_id)
            .bind(auth_user.org_id)
            .fetch_optional(&state.pool)
            .await?;

    item.map(Json).ok_or(ApiError::NotFound)
}

/// Update an item
pub async fn update_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> ApiResult<Json<Item>> {
    let existing: Option<Item> =
        sqlx::query_as("SELECT * FROM items WHERE id = $1 AND org_id = $2 AND deleted_at IS NULL")
            .bind(item_id)
            .bind(auth_user.org_id)
            .fetch_optional(&state.pool)
            .await?;

    let existing = existing.ok_or(ApiError::NotFound)?;

    if let Some(ref name) = req.name {
        if name.trim().is_empty() || name.len() > 200 {
            return Err(ApiError::Validation(
                "Item name must be between 1 and 200 characters".to_string(),
            ));
        }
    }

    if let Some(price) = req.unit_price_cents {
        if price < 0 {
            return Err(ApiError::Validation(
                "Unit price must not be negative".to_string(),
            ));
        }
    }

    let item: Item = sqlx::query_as(
        r#"
        UPDATE items
        SET name = $1, description = $2, unit_price_cents = $3, tax_exempt = $4, updated_at = NOW()
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(req.name.as_deref().map(str::trim).unwrap_or(&existing.name))
    .bind(req.description.or(existing.description))
    .bind(req.unit_price_cents.unwrap_or(existing.unit_price_cents))
    .bind(req.tax_exempt.unwrap_or(existing.tax_exempt))
    .bind(item_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(item))
}

/// Soft-delete an item
pub async fn delete_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(item_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query(
        "UPDATE items SET deleted_at = NOW() WHERE id = $1 AND org_id = $2 AND deleted_at IS NULL",
    )
    .bind(item_id)
    .bind(auth_user.org_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}
