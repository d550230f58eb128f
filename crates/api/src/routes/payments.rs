//! Public payment page and Stripe webhook routes
//!
//! The payment-link token is a bearer capability: no other authentication
//! protects these routes.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use bildout_billing::lifecycle;
use bildout_billing::payment_intent::{PaymentIntentResponse, PaymentIntentService};
use bildout_billing::webhook::WebhookHandler;
use bildout_shared::types::{Invoice, InvoiceItem, InvoiceStatus};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct PublicInvoiceResponse {
    pub number: i64,
    pub status: InvoiceStatus,
    pub issue_date: Date,
    pub due_date: Option<Date>,
    pub subtotal_cents: i64,
    pub tax_total_cents: i64,
    pub discount_total_cents: i64,
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub amount_due_cents: i64,
    pub deposit_required_cents: Option<i64>,
    pub notes: Option<String>,
    pub items: Vec<PublicLineItem>,
    pub client_name: Option<String>,
    // Merchant branding for the payment page
    pub org_name: String,
    pub logo_url: Option<String>,
    pub accent_color: Option<String>,
    pub invoice_prefix: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublicLineItem {
    pub description: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub amount_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    /// Custom partial amount; omitted means the full outstanding balance
    pub amount_cents: Option<i64>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Public invoice view behind the payment-link token. The first view of a
/// sent invoice flips it to viewed.
pub async fn get_public_invoice(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
) -> ApiResult<Json<PublicInvoiceResponse>> {
    let invoice: Option<Invoice> = sqlx::query_as(
        "SELECT * FROM invoices WHERE payment_link_token = $1 AND deleted_at IS NULL",
    )
    .bind(token)
    .fetch_optional(&state.pool)
    .await?;

    let mut invoice = invoice.ok_or(ApiError::NotFound)?;

    if invoice.status == InvoiceStatus::Sent {
        sqlx::query("UPDATE invoices SET status = 'viewed', updated_at = NOW() WHERE id = $1")
            .bind(invoice.id)
            .execute(&state.pool)
            .await?;

        lifecycle::record_status_change(
            &state.pool,
            invoice.id,
            Some(InvoiceStatus::Sent),
            InvoiceStatus::Viewed,
            "client:payment-page",
            None,
        )
        .await?;

        invoice.status = InvoiceStatus::Viewed;
    }

    let items: Vec<InvoiceItem> = sqlx::query_as(
        "SELECT * FROM invoice_items WHERE invoice_id = $1 ORDER BY position ASC",
    )
    .bind(invoice.id)
    .fetch_all(&state.pool)
    .await?;

    let (org_name, logo_url, accent_color, invoice_prefix): (
        String,
        Option<String>,
        Option<String>,
        Option<String>,
    ) = sqlx::query_as(
        "SELECT name, logo_url, accent_color, invoice_prefix FROM organizations WHERE id = $1",
    )
    .bind(invoice.org_id)
    .fetch_one(&state.pool)
    .await?;

    let client_name: Option<String> = match invoice.client_id {
        Some(client_id) => {
            let row: Option<(String,)> = sqlx::query_as("SELECT name FROM clients WHERE id = $1")
                .bind(client_id)
                .fetch_optional(&state.pool)
                .await?;
            row.map(|(name,)| name)
        }
        None => None,
    };

    Ok(Json(PublicInvoiceResponse {
        number: invoice.number,
        status: invoice.status,
        issue_date: invoice.issue_date,
        due_date: invoice.due_date,
        subtotal_cents: invoice.subtotal_cents,
        tax_total_cents: invoice.tax_total_cents,
        discount_total_cents: invoice.discount_total_cents,
        total_cents: invoice.total_cents,
        amount_paid_cents: invoice.amount_paid_cents,
        amount_due_cents: invoice.amount_due_cents,
        deposit_required_cents: invoice.deposit_required_cents,
        notes: invoice.notes,
        items: items
            .into_iter()
            .map(|item| PublicLineItem {
                description: item.description,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                amount_cents: item.amount_cents,
            })
            .collect(),
        client_name,
        org_name,
        logo_url,
        accent_color,
        invoice_prefix,
    }))
}

/// Create a payment intent for the invoice behind the token
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
    req: Option<Json<CreateIntentRequest>>,
) -> ApiResult<Json<PaymentIntentResponse>> {
    let amount_cents = req.and_then(|Json(req)| req.amount_cents);
    let service = PaymentIntentService::new(state.stripe.clone(), state.pool.clone());
    let response = service.create_for_token(token, amount_cents).await?;

    Ok(Json(response))
}

/// Handle Stripe webhook events
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<StatusCode> {
    tracing::info!(body_len = body.len(), "Stripe webhook received");

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing stripe-signature header".to_string())
        })?;

    let handler = WebhookHandler::new(
        state.stripe.clone(),
        state.pool.clone(),
        state.email.clone(),
    );

    let event = handler.verify_event(&body, signature).map_err(|e| {
        tracing::warn!(error = ?e, "Stripe webhook signature verification failed");
        ApiError::BadRequest("Invalid webhook signature".to_string())
    })?;

    handler.handle_event(event).await.map_err(|e| {
        tracing::error!("Webhook handling error: {}", e);
        ApiError::from(e)
    })?;

    Ok(StatusCode::OK)
}
