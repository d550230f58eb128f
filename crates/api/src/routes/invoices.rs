//! Invoice routes
//!
//! CRUD plus the status-changing endpoints (send, mark-paid, status patch,
//! duplicate) and the CSV export. Every handler re-validates organization
//! ownership before touching an invoice.

use axum::{
    extract::{Extension, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use bildout_billing::lifecycle::{self, actor_user, LineInput};
use bildout_billing::limits::LimitService;
use bildout_shared::types::{Invoice, InvoiceItem, InvoiceStatus, InvoiceStatusHistory};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub client_id: Option<Uuid>,
    pub issue_date: Option<Date>,
    pub due_date: Option<Date>,
    pub items: Vec<LineInput>,
    #[serde(default)]
    pub discount_cents: i64,
    pub tax_rate_bps: Option<i32>,
    pub deposit_required_cents: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub client_id: Option<Uuid>,
    pub issue_date: Option<Date>,
    pub due_date: Option<Date>,
    /// When present the line items are replaced wholesale
    pub items: Option<Vec<LineInput>>,
    pub discount_cents: Option<i64>,
    pub tax_rate_bps: Option<i32>,
    pub deposit_required_cents: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendInvoiceRequest {
    /// Dispatch the invoice email to the client (default true)
    pub send_email: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: InvoiceStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

// =============================================================================
// Handlers
// =============================================================================

/// List the organization's invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Invoice>>> {
    let invoices: Vec<Invoice> = sqlx::query_as(
        r#"
        SELECT * FROM invoices
        WHERE org_id = $1 AND deleted_at IS NULL
          AND ($2::VARCHAR IS NULL OR status = $2)
          AND ($3::UUID IS NULL OR client_id = $3)
        ORDER BY number DESC
        "#,
    )
    .bind(auth_user.org_id)
    .bind(query.status)
    .bind(query.client_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(invoices))
}

/// Get a single invoice with its line items
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<InvoiceDetail>> {
    let invoice = load_invoice(&state, invoice_id, auth_user.org_id).await?;
    let items = load_items(&state, invoice_id).await?;

    Ok(Json(InvoiceDetail { invoice, items }))
}

/// Create an invoice, subject to the plan's monthly invoice limit
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateInvoiceRequest>,
) -> ApiResult<(StatusCode, Json<InvoiceDetail>)> {
    let org_id = auth_user.org_id;

    let check = LimitService::new(state.pool.clone())
        .check_invoice_limit(org_id)
        .await?;
    if !check.allowed {
        return Err(ApiError::LimitReached(format!(
            "The {} plan allows {} invoices per month. Upgrade to Pro for unlimited invoicing.",
            check.plan,
            check.limit.unwrap_or(0)
        )));
    }

    validate_lines(&req.items)?;
    validate_amounts(req.discount_cents, req.deposit_required_cents)?;

    if let Some(client_id) = req.client_id {
        verify_client(&state, client_id, org_id).await?;
    }

    let (default_tax_rate_bps,): (i32,) =
        sqlx::query_as("SELECT default_tax_rate_bps FROM organizations WHERE id = $1")
            .bind(org_id)
            .fetch_one(&state.pool)
            .await?;

    let tax_rate_bps = req.tax_rate_bps.unwrap_or(default_tax_rate_bps);
    let totals = lifecycle::compute_totals(&req.items, tax_rate_bps, req.discount_cents);
    let issue_date = req
        .issue_date
        .unwrap_or_else(|| OffsetDateTime::now_utc().date());

    // Read-modify-write: the next number is the current max plus one, so two
    // concurrent creates can be assigned the same number
    let (number,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(number), 0) + 1 FROM invoices WHERE org_id = $1")
            .bind(org_id)
            .fetch_one(&state.pool)
            .await?;

    let invoice: Invoice = sqlx::query_as(
        r#"
        INSERT INTO invoices (
            org_id, client_id, number, status, issue_date, due_date,
            subtotal_cents, tax_total_cents, discount_total_cents, total_cents,
            amount_paid_cents, amount_due_cents, deposit_required_cents,
            tax_rate_bps, notes
        )
        VALUES ($1, $2, $3, 'draft', $4, $5, $6, $7, $8, $9, 0, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(org_id)
    .bind(req.client_id)
    .bind(number)
    .bind(issue_date)
    .bind(req.due_date)
    .bind(totals.subtotal_cents)
    .bind(totals.tax_total_cents)
    .bind(totals.discount_total_cents)
    .bind(totals.total_cents)
    .bind(req.deposit_required_cents)
    .bind(req.tax_rate_bps)
    .bind(req.notes.as_deref())
    .fetch_one(&state.pool)
    .await?;

    insert_lines(&state, invoice.id, &req.items).await?;

    lifecycle::record_status_change(
        &state.pool,
        invoice.id,
        None,
        InvoiceStatus::Draft,
        &actor_user(auth_user.user_id),
        None,
    )
    .await?;

    let items = load_items(&state, invoice.id).await?;

    Ok((StatusCode::CREATED, Json(InvoiceDetail { invoice, items })))
}

/// Update an invoice. Line items, when present, are replaced wholesale:
/// the old rows are deleted and the new set inserted as separate statements.
pub async fn update_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<UpdateInvoiceRequest>,
) -> ApiResult<Json<InvoiceDetail>> {
    let existing = load_invoice(&state, invoice_id, auth_user.org_id).await?;

    if existing.status.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Cannot edit a {} invoice",
            existing.status
        )));
    }

    if let Some(client_id) = req.client_id {
        verify_client(&state, client_id, auth_user.org_id).await?;
    }

    let lines = match req.items {
        Some(ref lines) => {
            validate_lines(lines)?;
            lines.clone()
        }
        None => load_items(&state, invoice_id)
            .await?
            .into_iter()
            .map(|item| LineInput {
                description: item.description,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                tax_exempt: item.tax_exempt,
            })
            .collect(),
    };

    let discount_cents = req.discount_cents.unwrap_or(existing.discount_total_cents);
    let deposit_required_cents = req.deposit_required_cents.or(existing.deposit_required_cents);
    validate_amounts(discount_cents, deposit_required_cents)?;

    let (default_tax_rate_bps,): (i32,) =
        sqlx::query_as("SELECT default_tax_rate_bps FROM organizations WHERE id = $1")
            .bind(auth_user.org_id)
            .fetch_one(&state.pool)
            .await?;

    let tax_rate_bps = req
        .tax_rate_bps
        .or(existing.tax_rate_bps)
        .unwrap_or(default_tax_rate_bps);
    let totals = lifecycle::compute_totals(&lines, tax_rate_bps, discount_cents);
    let amount_due_cents = (totals.total_cents - existing.amount_paid_cents).max(0);

    let invoice: Invoice = sqlx::query_as(
        r#"
        UPDATE invoices
        SET client_id = $1, issue_date = $2, due_date = $3,
            subtotal_cents = $4, tax_total_cents = $5, discount_total_cents = $6,
            total_cents = $7, amount_due_cents = $8, deposit_required_cents = $9,
            tax_rate_bps = $10, notes = $11, updated_at = NOW()
        WHERE id = $12
        RETURNING *
        "#,
    )
    .bind(req.client_id.or(existing.client_id))
    .bind(req.issue_date.unwrap_or(existing.issue_date))
    .bind(req.due_date.or(existing.due_date))
    .bind(totals.subtotal_cents)
    .bind(totals.tax_total_cents)
    .bind(totals.discount_total_cents)
    .bind(totals.total_cents)
    .bind(amount_due_cents)
    .bind(deposit_required_cents)
    .bind(req.tax_rate_bps.or(existing.tax_rate_bps))
    .bind(req.notes.or(existing.notes))
    .bind(invoice_id)
    .fetch_one(&state.pool)
    .await?;

    if req.items.is_some() {
        // Delete-then-insert; a failure in between loses the old line items
        sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&state.pool)
            .await?;
        insert_lines(&state, invoice_id, &lines).await?;
    }

    let items = load_items(&state, invoice_id).await?;

    Ok(Json(InvoiceDetail { invoice, items }))
}

/// Soft-delete an invoice
pub async fn delete_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query(
        "UPDATE invoices SET deleted_at = NOW() WHERE id = $1 AND org_id = $2 AND deleted_at IS NULL",
    )
    .bind(invoice_id)
    .bind(auth_user.org_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Duplicate an invoice into a fresh draft: new number, new payment link
/// token, nothing paid, same line items under new ids
pub async fn duplicate_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<InvoiceDetail>)> {
    let source = load_invoice(&state, invoice_id, auth_user.org_id).await?;
    let source_items = load_items(&state, invoice_id).await?;

    let (number,): (i64,) =
        sqlx::query_as("SELECT COALESCE(MAX(number), 0) + 1 FROM invoices WHERE org_id = $1")
            .bind(auth_user.org_id)
            .fetch_one(&state.pool)
            .await?;

    let issue_date = OffsetDateTime::now_utc().date();

    let invoice: Invoice = sqlx::query_as(
        r#"
        INSERT INTO invoices (
            org_id, client_id, number, status, issue_date, due_date,
            subtotal_cents, tax_total_cents, discount_total_cents, total_cents,
            amount_paid_cents, amount_due_cents, deposit_required_cents,
            tax_rate_bps, payment_link_token, notes
        )
        VALUES ($1, $2, $3, 'draft', $4, $5, $6, $7, $8, $9, 0, $9, $10, $11, $12, $13)
        RETURNING *
        "#,
    )
    .bind(auth_user.org_id)
    .bind(source.client_id)
    .bind(number)
    .bind(issue_date)
    .bind(source.due_date)
    .bind(source.subtotal_cents)
    .bind(source.tax_total_cents)
    .bind(source.discount_total_cents)
    .bind(source.total_cents)
    .bind(source.deposit_required_cents)
    .bind(source.tax_rate_bps)
    .bind(Uuid::new_v4())
    .bind(source.notes.as_deref())
    .fetch_one(&state.pool)
    .await?;

    for item in &source_items {
        sqlx::query(
            r#"
            INSERT INTO invoice_items (invoice_id, description, quantity, unit_price_cents, amount_cents, tax_exempt, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(invoice.id)
        .bind(&item.description)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.amount_cents)
        .bind(item.tax_exempt)
        .bind(item.position)
        .execute(&state.pool)
        .await?;
    }

    lifecycle::record_status_change(
        &state.pool,
        invoice.id,
        None,
        InvoiceStatus::Draft,
        &actor_user(auth_user.user_id),
        Some(&format!("Duplicated from invoice #{}", source.number)),
    )
    .await?;

    let items = load_items(&state, invoice.id).await?;

    Ok((StatusCode::CREATED, Json(InvoiceDetail { invoice, items })))
}

/// Send a draft invoice: generate the payment link token if absent, flip to
/// sent, and dispatch the invoice email unless the caller opted out
pub async fn send_invoice(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
    req: Option<Json<SendInvoiceRequest>>,
) -> ApiResult<Json<InvoiceDetail>> {
    let invoice = load_invoice(&state, invoice_id, auth_user.org_id).await?;

    if invoice.status != InvoiceStatus::Draft {
        return Err(ApiError::BadRequest(format!(
            "Only draft invoices can be sent (current status: {})",
            invoice.status
        )));
    }

    let send_email = req
        .and_then(|Json(req)| req.send_email)
        .unwrap_or(true);

    let client: Option<(String, Option<String>)> = match invoice.client_id {
        Some(client_id) => {
            sqlx::query_as("SELECT name, email FROM clients WHERE id = $1")
                .bind(client_id)
                .fetch_optional(&state.pool)
                .await?
        }
        None => None,
    };

    let client_email = client.as_ref().and_then(|(_, email)| email.clone());

    if send_email && client_email.is_none() {
        return Err(ApiError::BadRequest(
            "Cannot email this invoice: the client has no email address".to_string(),
        ));
    }

    let token = invoice.payment_link_token.unwrap_or_else(Uuid::new_v4);

    let invoice: Invoice = sqlx::query_as(
        r#"
        UPDATE invoices
        SET status = 'sent', payment_link_token = $1, updated_at = NOW()
        WHERE id = $2
        RETURNING *
        "#,
    )
    .bind(token)
    .bind(invoice_id)
    .fetch_one(&state.pool)
    .await?;

    lifecycle::record_status_change(
        &state.pool,
        invoice_id,
        Some(InvoiceStatus::Draft),
        InvoiceStatus::Sent,
        &actor_user(auth_user.user_id),
        None,
    )
    .await?;

    if send_email {
        if let Some(to) = client_email {
            let (org_name,): (String,) =
                sqlx::query_as("SELECT name FROM organizations WHERE id = $1")
                    .bind(auth_user.org_id)
                    .fetch_one(&state.pool)
                    .await?;

            // Email failure is non-fatal; the invoice is already sent
            let _ = state
                .email
                .send_invoice(
                    &to,
                    &org_name,
                    invoice.number,
                    invoice.amount_due_cents,
                    invoice.due_date.map(|d| d.to_string()).as_deref(),
                    token,
                )
                .await;
        }
    }

    let items = load_items(&state, invoice_id).await?;

    Ok(Json(InvoiceDetail { invoice, items }))
}

/// Manually mark an invoice paid (cash, check, bank transfer out of band)
pub async fn mark_paid(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<InvoiceDetail>> {
    let invoice = load_invoice(&state, invoice_id, auth_user.org_id).await?;

    if invoice.status == InvoiceStatus::Paid {
        return Err(ApiError::BadRequest(
            "Invoice is already paid".to_string(),
        ));
    }

    if !invoice.status.accepts_payment() {
        return Err(ApiError::BadRequest(format!(
            "Cannot mark a {} invoice paid",
            invoice.status
        )));
    }

    let updated: Invoice = sqlx::query_as(
        r#"
        UPDATE invoices
        SET status = 'paid', amount_paid_cents = total_cents, amount_due_cents = 0, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(invoice_id)
    .fetch_one(&state.pool)
    .await?;

    lifecycle::record_status_change(
        &state.pool,
        invoice_id,
        Some(invoice.status),
        InvoiceStatus::Paid,
        &actor_user(auth_user.user_id),
        Some("Manually marked paid"),
    )
    .await?;

    let items = load_items(&state, invoice_id).await?;

    Ok(Json(InvoiceDetail {
        invoice: updated,
        items,
    }))
}

/// Manually patch the invoice status. Only void and cancelled can be set
/// here; payment-driven statuses come from mark-paid and the webhook.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<InvoiceDetail>> {
    let invoice = load_invoice(&state, invoice_id, auth_user.org_id).await?;

    if !matches!(req.status, InvoiceStatus::Void | InvoiceStatus::Cancelled) {
        return Err(ApiError::BadRequest(format!(
            "Status cannot be set to {} through this endpoint",
            req.status
        )));
    }

    if invoice.status.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Invoice is already {}",
            invoice.status
        )));
    }

    let updated: Invoice = sqlx::query_as(
        "UPDATE invoices SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(req.status)
    .bind(invoice_id)
    .fetch_one(&state.pool)
    .await?;

    lifecycle::record_status_change(
        &state.pool,
        invoice_id,
        Some(invoice.status),
        req.status,
        &actor_user(auth_user.user_id),
        req.notes.as_deref(),
    )
    .await?;

    let items = load_items(&state, invoice_id).await?;

    Ok(Json(InvoiceDetail {
        invoice: updated,
        items,
    }))
}

/// Status transition history for an invoice
pub async fn get_history(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<Vec<InvoiceStatusHistory>>> {
    // Ownership check before exposing the trail
    load_invoice(&state, invoice_id, auth_user.org_id).await?;

    let history: Vec<InvoiceStatusHistory> = sqlx::query_as(
        "SELECT * FROM invoice_status_history WHERE invoice_id = $1 ORDER BY created_at ASC",
    )
    .bind(invoice_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(history))
}

// =============================================================================
// CSV Export
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ExportRow {
    number: i64,
    client_name: Option<String>,
    client_email: Option<String>,
    issue_date: Date,
    due_date: Option<Date>,
    status: InvoiceStatus,
    subtotal_cents: i64,
    tax_total_cents: i64,
    discount_total_cents: i64,
    total_cents: i64,
    amount_paid_cents: i64,
    amount_due_cents: i64,
    notes: Option<String>,
    invoice_prefix: Option<String>,
}

/// Export all invoices as CSV
pub async fn export_csv(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Response> {
    let rows: Vec<ExportRow> = sqlx::query_as(
        r#"
        SELECT i.number, c.name AS client_name, c.email AS client_email,
               i.issue_date, i.due_date, i.status,
               i.subtotal_cents, i.tax_total_cents, i.discount_total_cents,
               i.total_cents, i.amount_paid_cents, i.amount_due_cents,
               i.notes, o.invoice_prefix
        FROM invoices i
        JOIN organizations o ON o.id = i.org_id
        LEFT JOIN clients c ON c.id = i.client_id
        WHERE i.org_id = $1 AND i.deleted_at IS NULL
        ORDER BY i.number ASC
        "#,
    )
    .bind(auth_user.org_id)
    .fetch_all(&state.pool)
    .await?;

    let csv = render_csv(&rows);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"invoices.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

const CSV_HEADER: &str = "Invoice Number,Client Name,Client Email,Issue Date,Due Date,Status,Subtotal,Tax,Discount,Total,Amount Paid,Amount Due,Notes";

fn render_csv(rows: &[ExportRow]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');

    for row in rows {
        let line = [
            format_invoice_number(row.invoice_prefix.as_deref(), row.number),
            row.client_name.clone().unwrap_or_default(),
            row.client_email.clone().unwrap_or_default(),
            row.issue_date.to_string(),
            row.due_date.map(|d| d.to_string()).unwrap_or_default(),
            row.status.to_string(),
            format_dollars(row.subtotal_cents),
            format_dollars(row.tax_total_cents),
            format_dollars(row.discount_total_cents),
            format_dollars(row.total_cents),
            format_dollars(row.amount_paid_cents),
            format_dollars(row.amount_due_cents),
            // Only the free-text notes column is quote-escaped
            escape_notes(row.notes.as_deref().unwrap_or_default()),
        ]
        .join(",");

        out.push_str(&line);
        out.push('\n');
    }

    out
}

fn format_invoice_number(prefix: Option<&str>, number: i64) -> String {
    match prefix {
        Some(prefix) => format!("{}{}", prefix, number),
        None => number.to_string(),
    }
}

fn format_dollars(cents: i64) -> String {
    format!("{:.2}", cents as f64 / 100.0)
}

fn escape_notes(notes: &str) -> String {
    format!("\"{}\"", notes.replace('"', "\"\""))
}

// =============================================================================
// Helpers
// =============================================================================

async fn load_invoice(state: &AppState, invoice_id: Uuid, org_id: Uuid) -> ApiResult<Invoice> {
    let invoice: Option<Invoice> = sqlx::query_as(
        "SELECT * FROM invoices WHERE id = $1 AND org_id = $2 AND deleted_at IS NULL",
    )
    .bind(invoice_id)
    .bind(org_id)
    .fetch_optional(&state.pool)
    .await?;

    invoice.ok_or(ApiError::NotFound)
}

async fn load_items(state: &AppState, invoice_id: Uuid) -> ApiResult<Vec<InvoiceItem>> {
    let items: Vec<InvoiceItem> = sqlx::query_as(
        "SELECT * FROM invoice_items WHERE invoice_id = $1 ORDER BY position ASC",
    )
    .bind(invoice_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(items)
}

async fn verify_client(state: &AppState, client_id: Uuid, org_id: Uuid) -> ApiResult<()> {
    let exists: Option<(i32,)> = sqlx::query_as(
        "SELECT 1 FROM clients WHERE id = $1 AND org_id = $2 AND deleted_at IS NULL",
    )
    .bind(client_id)
    .bind(org_id)
    .fetch_optional(&state.pool)
    .await?;

    if exists.is_none() {
        return Err(ApiError::BadRequest(
            "Client not found in this organization".to_string(),
        ));
    }

    Ok(())
}

fn validate_lines(lines: &[LineInput]) -> ApiResult<()> {
    if lines.is_empty() {
        return Err(ApiError::Validation(
            "An invoice needs at least one line item".to_string(),
        ));
    }

    for line in lines {
        if line.description.trim().is_empty() {
            return Err(ApiError::Validation(
                "Line item description is required".to_string(),
            ));
        }
        if line.quantity <= 0 {
            return Err(ApiError::Validation(
                "Line item quantity must be positive".to_string(),
            ));
        }
        if line.unit_price_cents < 0 {
            return Err(ApiError::Validation(
                "Line item price must not be negative".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_amounts(discount_cents: i64, deposit_required_cents: Option<i64>) -> ApiResult<()> {
    if discount_cents < 0 {
        return Err(ApiError::Validation(
            "Discount must not be negative".to_string(),
        ));
    }
    if let Some(deposit) = deposit_required_cents {
        if deposit < 0 {
            return Err(ApiError::Validation(
                "Deposit must not be negative".to_string(),
            ));
        }
    }
    Ok(())
}

async fn insert_lines(state: &AppState, invoice_id: Uuid, lines: &[LineInput]) -> ApiResult<()> {
    for (position, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO invoice_items (invoice_id, description, quantity, unit_price_cents, amount_cents, tax_exempt, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(invoice_id)
        .bind(line.description.trim())
        .bind(line.quantity)
        .bind(line.unit_price_cents)
        .bind(lifecycle::line_amount_cents(line))
        .bind(line.tax_exempt)
        .bind(position as i32)
        .execute(&state.pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use time::macros::date;

    fn row(notes: Option<&str>) -> ExportRow {
        ExportRow {
            number: 42,
            client_name: Some("Acme Corp".to_string()),
            client_email: Some("billing@acme.test".to_string()),
            issue_date: date!(2025 - 03 - 01),
            due_date: Some(date!(2025 - 03 - 31)),
            status: InvoiceStatus::Sent,
            subtotal_cents: 10_000,
            tax_total_cents: 825,
            discount_total_cents: 0,
            total_cents: 10_825,
            amount_paid_cents: 0,
            amount_due_cents: 10_825,
            notes: notes.map(String::from),
            invoice_prefix: Some("INV-".to_string()),
        }
    }

    #[test]
    fn test_csv_header_column_order() {
        let csv = render_csv(&[]);
        assert_eq!(csv.lines().next().unwrap(), CSV_HEADER);
        assert_eq!(CSV_HEADER.split(',').count(), 13);
    }

    #[test]
    fn test_csv_row_rendering() {
        let csv = render_csv(&[row(Some("Thanks!"))]);
        let line = csv.lines().nth(1).unwrap();
        assert_eq!(
            line,
            "INV-42,Acme Corp,billing@acme.test,2025-03-01,2025-03-31,sent,100.00,8.25,0.00,108.25,0.00,108.25,\"Thanks!\""
        );
    }

    #[test]
    fn test_csv_escapes_quotes_in_notes_only() {
        let csv = render_csv(&[row(Some(r#"He said "pay up""#))]);
        let line = csv.lines().nth(1).unwrap();
        assert!(line.ends_with(r#""He said ""pay up""""#));
    }

    #[test]
    fn test_csv_empty_notes_still_quoted() {
        let csv = render_csv(&[row(None)]);
        let line = csv.lines().nth(1).unwrap();
        assert!(line.ends_with(",\"\""));
    }

    #[test]
    fn test_invoice_number_formatting() {
        assert_eq!(format_invoice_number(Some("INV-"), 7), "INV-7");
        assert_eq!(format_invoice_number(None, 7), "7");
    }

    #[test]
    fn test_dollar_formatting() {
        assert_eq!(format_dollars(0), "0.00");
        assert_eq!(format_dollars(5), "0.05");
        assert_eq!(format_dollars(123_456), "1234.56");
    }
}
