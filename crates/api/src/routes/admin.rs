//! Platform admin routes
//!
//! Back-office management of merchant organizations. All handlers re-check
//! `is_admin` and record their actions in the admin audit log.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use bildout_billing::connect::ConnectService;
use bildout_billing::email::InvoiceEmailService;
use bildout_billing::plan::{effective_plan, resolve_plan};
use bildout_billing::subscriptions::SubscriptionService;
use bildout_shared::types::{AdminAuditLog, Organization, SubscriptionPlan};

use crate::{
    audit::{admin_action, log_admin_action, target_type},
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListMerchantsQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MerchantSummary {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub effective_plan: SubscriptionPlan,
    pub has_override: bool,
    pub suspended_at: Option<OffsetDateTime>,
    pub invoice_count: i64,
    pub client_count: i64,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct MerchantUser {
    pub id: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub stripe_account_id: Option<String>,
    pub onboarding_complete: bool,
    pub payouts_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct MerchantDetail {
    pub organization: Organization,
    pub effective_plan: SubscriptionPlan,
    pub users: Vec<MerchantUser>,
    pub invoice_count: i64,
    pub client_count: i64,
    pub total_collected_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetOverrideRequest {
    pub plan: String,
    /// RFC 3339 timestamp; omitted means the override is permanent
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginLinkResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ReminderResponse {
    pub sent: u64,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct MerchantSummaryRow {
    id: Uuid,
    name: String,
    contact_email: Option<String>,
    subscription_plan: Option<String>,
    subscription_override_plan: Option<String>,
    subscription_override_expires_at: Option<OffsetDateTime>,
    suspended_at: Option<OffsetDateTime>,
    invoice_count: i64,
    client_count: i64,
    created_at: OffsetDateTime,
}

// =============================================================================
// Handlers
// =============================================================================

/// List merchant organizations with usage counts
pub async fn list_merchants(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListMerchantsQuery>,
) -> ApiResult<Json<Vec<MerchantSummary>>> {
    auth_user.require_admin()?;

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s));

    let rows: Vec<MerchantSummaryRow> = sqlx::query_as(
        r#"
        SELECT o.id, o.name, o.contact_email,
               o.subscription_plan, o.subscription_override_plan,
               o.subscription_override_expires_at, o.suspended_at, o.created_at,
               (SELECT COUNT(*) FROM invoices i WHERE i.org_id = o.id AND i.deleted_at IS NULL) AS invoice_count,
               (SELECT COUNT(*) FROM clients c WHERE c.org_id = o.id AND c.deleted_at IS NULL) AS client_count
        FROM organizations o
        WHERE ($1::TEXT IS NULL OR o.name ILIKE $1 OR o.contact_email ILIKE $1)
        ORDER BY o.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(search)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let now = OffsetDateTime::now_utc();
    let merchants = rows
        .into_iter()
        .map(|row| MerchantSummary {
            effective_plan: resolve_plan(
                row.subscription_plan.as_deref(),
                row.subscription_override_plan.as_deref(),
                row.subscription_override_expires_at,
                now,
            ),
            has_override: row.subscription_override_plan.is_some(),
            id: row.id,
            name: row.name,
            contact_email: row.contact_email,
            suspended_at: row.suspended_at,
            invoice_count: row.invoice_count,
            client_count: row.client_count,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(merchants))
}

/// Full detail for one merchant
pub async fn get_merchant(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Json<MerchantDetail>> {
    auth_user.require_admin()?;

    let organization = load_org(&state, org_id).await?;

    let users: Vec<MerchantUser> = sqlx::query_as::<_, bildout_shared::types::User>(
        "SELECT * FROM users WHERE org_id = $1 ORDER BY created_at ASC",
    )
    .bind(org_id)
    .fetch_all(&state.pool)
    .await?
    .into_iter()
    .map(|user| MerchantUser {
        id: user.id,
        email: user.email,
        is_admin: user.is_admin,
        stripe_account_id: user.stripe_account_id,
        onboarding_complete: user.onboarding_complete,
        payouts_enabled: user.payouts_enabled,
    })
    .collect();

    let (invoice_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM invoices WHERE org_id = $1 AND deleted_at IS NULL")
            .bind(org_id)
            .fetch_one(&state.pool)
            .await?;

    let (client_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM clients WHERE org_id = $1 AND deleted_at IS NULL")
            .bind(org_id)
            .fetch_one(&state.pool)
            .await?;

    let (total_collected_cents,): (Option<i64>,) = sqlx::query_as(
        "SELECT SUM(amount_cents) FROM payments WHERE org_id = $1 AND status = 'succeeded'",
    )
    .bind(org_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(MerchantDetail {
        effective_plan: effective_plan(&organization, OffsetDateTime::now_utc()),
        organization,
        users,
        invoice_count,
        client_count,
        total_collected_cents: total_collected_cents.unwrap_or(0),
    }))
}

/// Suspend a merchant's access
pub async fn suspend_merchant(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    auth_user.require_admin()?;
    load_org(&state, org_id).await?;

    sqlx::query("UPDATE organizations SET suspended_at = NOW(), updated_at = NOW() WHERE id = $1")
        .bind(org_id)
        .execute(&state.pool)
        .await?;

    log_admin_action(
        &state.pool,
        auth_user.user_id,
        admin_action::MERCHANT_SUSPENDED,
        target_type::ORGANIZATION,
        Some(&org_id.to_string()),
        json!({}),
    )
    .await;

    tracing::info!(org_id = %org_id, admin = %auth_user.user_id, "Merchant suspended");

    Ok(Json(ActionResponse { ok: true }))
}

/// Lift a merchant suspension
pub async fn resume_merchant(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    auth_user.require_admin()?;
    load_org(&state, org_id).await?;

    sqlx::query("UPDATE organizations SET suspended_at = NULL, updated_at = NOW() WHERE id = $1")
        .bind(org_id)
        .execute(&state.pool)
        .await?;

    log_admin_action(
        &state.pool,
        auth_user.user_id,
        admin_action::MERCHANT_RESUMED,
        target_type::ORGANIZATION,
        Some(&org_id.to_string()),
        json!({}),
    )
    .await;

    Ok(Json(ActionResponse { ok: true }))
}

/// Re-pull subscription and Connect state from Stripe for a merchant
pub async fn sync_merchant(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    auth_user.require_admin()?;
    let org = load_org(&state, org_id).await?;

    let mut synced = json!({});

    if org.stripe_customer_id.is_some() {
        let plan = SubscriptionService::new(state.stripe.clone(), state.pool.clone())
            .sync_from_stripe(org_id)
            .await?;
        synced["plan"] = json!(plan);
    }

    if let Some(user_id) = primary_user(&state, org_id).await? {
        let status = ConnectService::new(state.stripe.clone(), state.pool.clone())
            .sync_account_status(user_id)
            .await?;
        synced["payouts_enabled"] = json!(status.payouts_enabled);
    }

    log_admin_action(
        &state.pool,
        auth_user.user_id,
        admin_action::MERCHANT_SYNCED,
        target_type::ORGANIZATION,
        Some(&org_id.to_string()),
        synced,
    )
    .await;

    Ok(Json(ActionResponse { ok: true }))
}

/// Create an Express dashboard login link for support
pub async fn create_login_link(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Json<LoginLinkResponse>> {
    auth_user.require_admin()?;
    load_org(&state, org_id).await?;

    let account_id: Option<(Option<String>,)> = sqlx::query_as(
        r#"
        SELECT stripe_account_id FROM users
        WHERE org_id = $1 AND stripe_account_id IS NOT NULL
        ORDER BY created_at ASC
        LIMIT 1
        "#,
    )
    .bind(org_id)
    .fetch_optional(&state.pool)
    .await?;

    let account_id = match account_id {
        Some((Some(id),)) => id,
        _ => {
            return Err(ApiError::BadRequest(
                "Merchant has no connected account".to_string(),
            ))
        }
    };

    let url = ConnectService::new(state.stripe.clone(), state.pool.clone())
        .login_link(&account_id)
        .await?;

    log_admin_action(
        &state.pool,
        auth_user.user_id,
        admin_action::LOGIN_LINK_CREATED,
        target_type::ORGANIZATION,
        Some(&org_id.to_string()),
        json!({ "account_id": account_id }),
    )
    .await;

    Ok(Json(LoginLinkResponse { url }))
}

/// Re-send payment reminders for a merchant's overdue invoices
pub async fn send_reminder(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Json<ReminderResponse>> {
    auth_user.require_admin()?;
    let org = load_org(&state, org_id).await?;

    #[derive(sqlx::FromRow)]
    struct ReminderRow {
        number: i64,
        amount_due_cents: i64,
        payment_link_token: Option<Uuid>,
        client_email: Option<String>,
    }

    let rows: Vec<ReminderRow> = sqlx::query_as(
        r#"
        SELECT i.number, i.amount_due_cents, i.payment_link_token, c.email AS client_email
        FROM invoices i
        LEFT JOIN clients c ON c.id = i.client_id
        WHERE i.org_id = $1 AND i.status = 'overdue' AND i.deleted_at IS NULL
        "#,
    )
    .bind(org_id)
    .fetch_all(&state.pool)
    .await?;

    let mut sent = 0u64;
    for row in rows {
        if let (Some(to), Some(token)) = (row.client_email, row.payment_link_token) {
            if matches!(
                send_one_reminder(&state.email, &to, &org.name, row.number, row.amount_due_cents, token).await,
                Ok(true)
            ) {
                sent += 1;
            }
        }
    }

    log_admin_action(
        &state.pool,
        auth_user.user_id,
        admin_action::REMINDER_SENT,
        target_type::ORGANIZATION,
        Some(&org_id.to_string()),
        json!({ "sent": sent }),
    )
    .await;

    Ok(Json(ReminderResponse { sent }))
}

/// Set a time-bounded (or permanent) subscription override
pub async fn set_subscription_override(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
    Json(req): Json<SetOverrideRequest>,
) -> ApiResult<Json<ActionResponse>> {
    auth_user.require_admin()?;
    load_org(&state, org_id).await?;

    let plan: SubscriptionPlan = req
        .plan
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid subscription plan: {}", req.plan)))?;

    if req.reason.trim().is_empty() {
        return Err(ApiError::Validation(
            "An override reason is required".to_string(),
        ));
    }

    if let Some(expires_at) = req.expires_at {
        if expires_at <= OffsetDateTime::now_utc() {
            return Err(ApiError::Validation(
                "Override expiry must be in the future".to_string(),
            ));
        }
    }

    sqlx::query(
        r#"
        UPDATE organizations
        SET subscription_override_plan = $1,
            subscription_override_expires_at = $2,
            subscription_override_reason = $3,
            subscription_override_granted_by = $4,
            subscription_override_granted_at = NOW(),
            updated_at = NOW()
        WHERE id = $5
        "#,
    )
    .bind(plan.to_string())
    .bind(req.expires_at)
    .bind(req.reason.trim())
    .bind(auth_user.user_id)
    .bind(org_id)
    .execute(&state.pool)
    .await?;

    log_admin_action(
        &state.pool,
        auth_user.user_id,
        admin_action::OVERRIDE_SET,
        target_type::ORGANIZATION,
        Some(&org_id.to_string()),
        json!({
            "plan": plan.to_string(),
            "expires_at": req.expires_at.map(|t| t.to_string()),
            "reason": req.reason.trim(),
        }),
    )
    .await;

    tracing::info!(
        org_id = %org_id,
        plan = %plan,
        admin = %auth_user.user_id,
        "Subscription override set"
    );

    Ok(Json(ActionResponse { ok: true }))
}

/// Clear a subscription override
pub async fn clear_subscription_override(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    auth_user.require_admin()?;
    load_org(&state, org_id).await?;

    sqlx::query(
        r#"
        UPDATE organizations
        SET subscription_override_plan = NULL,
            subscription_override_expires_at = NULL,
            subscription_override_reason = NULL,
            subscription_override_granted_by = NULL,
            subscription_override_granted_at = NULL,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(org_id)
    .execute(&state.pool)
    .await?;

    log_admin_action(
        &state.pool,
        auth_user.user_id,
        admin_action::OVERRIDE_CLEARED,
        target_type::ORGANIZATION,
        Some(&org_id.to_string()),
        json!({}),
    )
    .await;

    Ok(Json(ActionResponse { ok: true }))
}

/// Page through the admin audit trail
pub async fn list_audit_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<AuditLogQuery>,
) -> ApiResult<Json<Vec<AdminAuditLog>>> {
    auth_user.require_admin()?;

    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    let entries: Vec<AdminAuditLog> = sqlx::query_as(
        "SELECT * FROM admin_audit_log ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(entries))
}

// =============================================================================
// Helpers
// =============================================================================

async fn load_org(state: &AppState, org_id: Uuid) -> ApiResult<Organization> {
    let org: Option<Organization> = sqlx::query_as("SELECT * FROM organizations WHERE id = $1")
        .bind(org_id)
        .fetch_optional(&state.pool)
        .await?;

    org.ok_or(ApiError::NotFound)
}

async fn primary_user(state: &AppState, org_id: Uuid) -> ApiResult<Option<Uuid>> {
    let user: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE org_id = $1 ORDER BY created_at ASC LIMIT 1")
            .bind(org_id)
            .fetch_optional(&state.pool)
            .await?;

    Ok(user.map(|(id,)| id))
}

async fn send_one_reminder(
    email: &InvoiceEmailService,
    to: &str,
    org_name: &str,
    number: i64,
    amount_due_cents: i64,
    token: Uuid,
) -> ApiResult<bool> {
    Ok(email
        .send_overdue_reminder(to, org_name, number, amount_due_cents, token)
        .await?)
}
