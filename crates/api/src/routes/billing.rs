//! Merchant billing routes: subscription checkout/portal and Connect
//! onboarding

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use bildout_billing::checkout::CheckoutService;
use bildout_billing::connect::{ConnectService, ConnectStatus};
use bildout_billing::customer::CustomerService;
use bildout_billing::limits::{LimitCheck, LimitService};
use bildout_billing::plan::effective_plan;
use bildout_billing::portal::{PortalResponse, PortalService};
use bildout_shared::types::{Organization, SubscriptionPlan};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    /// The plan actually enforced after merging vendor state and override
    pub effective_plan: SubscriptionPlan,
    pub vendor_plan: Option<String>,
    pub override_plan: Option<String>,
    pub override_expires_at: Option<OffsetDateTime>,
    pub invoice_limit: LimitCheck,
    pub client_limit: LimitCheck,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a checkout session for upgrading to a paid plan
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let org: Organization = sqlx::query_as("SELECT * FROM organizations WHERE id = $1")
        .bind(auth_user.org_id)
        .fetch_one(&state.pool)
        .await?;

    let (email,): (String,) = sqlx::query_as("SELECT email FROM users WHERE id = $1")
        .bind(auth_user.user_id)
        .fetch_one(&state.pool)
        .await?;

    let customer = CustomerService::new(state.stripe.clone(), state.pool.clone())
        .get_or_create_customer(org.id, &email, &org.name)
        .await?;

    let session = CheckoutService::new(state.stripe.clone(), state.pool.clone())
        .create_subscription_checkout(org.id, customer.id.as_str(), &req.plan)
        .await?;

    let url = session
        .url
        .ok_or_else(|| ApiError::Billing("Checkout session has no URL".to_string()))?;

    Ok(Json(CheckoutResponse { url }))
}

/// Create a billing portal session for managing the subscription
pub async fn create_portal_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<PortalResponse>> {
    let customer_id = CustomerService::new(state.stripe.clone(), state.pool.clone())
        .get_customer_id(auth_user.org_id)
        .await?;

    let session = PortalService::new(state.stripe.clone())
        .create_portal_session(auth_user.org_id, customer_id.as_str())
        .await?;

    Ok(Json(session.into()))
}

/// Current subscription state: effective plan, override detail, and where
/// the organization stands against its limits
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let org: Organization = sqlx::query_as("SELECT * FROM organizations WHERE id = $1")
        .bind(auth_user.org_id)
        .fetch_one(&state.pool)
        .await?;

    let limits = LimitService::new(state.pool.clone());
    let invoice_limit = limits.check_invoice_limit(org.id).await?;
    let client_limit = limits.check_client_limit(org.id).await?;

    Ok(Json(SubscriptionResponse {
        effective_plan: effective_plan(&org, OffsetDateTime::now_utc()),
        vendor_plan: org.subscription_plan,
        override_plan: org.subscription_override_plan,
        override_expires_at: org.subscription_override_expires_at,
        invoice_limit,
        client_limit,
    }))
}

/// Start (or resume) Connect onboarding for receiving payouts
pub async fn connect_onboard(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<CheckoutResponse>> {
    let url = ConnectService::new(state.stripe.clone(), state.pool.clone())
        .onboarding_link(auth_user.user_id)
        .await?;

    Ok(Json(CheckoutResponse { url }))
}

/// Re-pull Connect verification state from Stripe
pub async fn connect_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<ConnectStatus>> {
    let status = ConnectService::new(state.stripe.clone(), state.pool.clone())
        .sync_account_status(auth_user.user_id)
        .await?;

    Ok(Json(status))
}
