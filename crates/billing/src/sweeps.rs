//! Scheduled sweeps
//!
//! Batch jobs invoked by the worker binary on a cron schedule and by the
//! `/api/cron/*` endpoints. Both sweeps accumulate per-row errors and keep
//! going; one bad invoice never aborts the batch.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use bildout_shared::types::InvoiceStatus;

use crate::email::InvoiceEmailService;
use crate::lifecycle::{self, ACTOR_OVERDUE_SWEEP};

/// Result of one sweep run
#[derive(Debug, Default, Serialize)]
pub struct SweepOutcome {
    pub processed: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct OverdueCandidate {
    id: Uuid,
    number: i64,
    status: InvoiceStatus,
    amount_due_cents: i64,
    payment_link_token: Option<Uuid>,
    client_email: Option<String>,
    org_name: String,
}

/// Flip past-due sent/viewed/partial invoices to overdue and remind clients
/// that have an email on file.
pub async fn run_overdue_sweep(pool: &PgPool, email: &InvoiceEmailService) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();

    let candidates: Vec<OverdueCandidate> = match sqlx::query_as(
        r#"
        SELECT i.id, i.number, i.status, i.amount_due_cents, i.payment_link_token,
               c.email AS client_email, o.name AS org_name
        FROM invoices i
        JOIN organizations o ON o.id = i.org_id
        LEFT JOIN clients c ON c.id = i.client_id
        WHERE i.status IN ('sent', 'viewed', 'partial')
          AND i.due_date < CURRENT_DATE
          AND i.deleted_at IS NULL
        ORDER BY i.due_date ASC
        "#,
    )
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch overdue candidates");
            outcome.errors.push(format!("fetch candidates: {}", e));
            return outcome;
        }
    };

    if candidates.is_empty() {
        return outcome;
    }

    tracing::info!(count = candidates.len(), "Processing overdue invoices");

    for invoice in candidates {
        if let Err(e) = mark_overdue(pool, &invoice).await {
            tracing::error!(invoice_id = %invoice.id, error = %e, "Failed to mark invoice overdue");
            outcome.errors.push(format!("invoice {}: {}", invoice.id, e));
            continue;
        }

        outcome.processed += 1;

        // Reminder is best-effort and must not block the rest of the batch
        if let (Some(to), Some(token)) = (&invoice.client_email, invoice.payment_link_token) {
            match email
                .send_overdue_reminder(
                    to,
                    &invoice.org_name,
                    invoice.number,
                    invoice.amount_due_cents,
                    token,
                )
                .await
            {
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(invoice_id = %invoice.id, error = %e, "Overdue reminder failed");
                    outcome
                        .errors
                        .push(format!("invoice {} reminder: {}", invoice.id, e));
                }
            }
        }
    }

    tracing::info!(
        processed = outcome.processed,
        errors = outcome.errors.len(),
        "Overdue sweep complete"
    );

    outcome
}

async fn mark_overdue(pool: &PgPool, invoice: &OverdueCandidate) -> crate::BillingResult<()> {
    sqlx::query("UPDATE invoices SET status = 'overdue', updated_at = NOW() WHERE id = $1")
        .bind(invoice.id)
        .execute(pool)
        .await?;

    lifecycle::record_status_change(
        pool,
        invoice.id,
        Some(invoice.status),
        InvoiceStatus::Overdue,
        ACTOR_OVERDUE_SWEEP,
        Some("Due date passed"),
    )
    .await?;

    Ok(())
}

/// Null out subscription overrides whose expiry has passed.
///
/// The plan resolver already ignores expired overrides; this sweep clears
/// the stale fields so the row reflects reality again.
pub async fn run_override_expiry_sweep(pool: &PgPool) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();
    let now = OffsetDateTime::now_utc();

    let expired: Vec<(Uuid, String)> = match sqlx::query_as(
        r#"
        UPDATE organizations
        SET subscription_override_plan = NULL,
            subscription_override_expires_at = NULL,
            subscription_override_reason = NULL,
            subscription_override_granted_by = NULL,
            subscription_override_granted_at = NULL,
            updated_at = NOW()
        WHERE subscription_override_plan IS NOT NULL
          AND subscription_override_expires_at IS NOT NULL
          AND subscription_override_expires_at <= $1
        RETURNING id, name
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "Failed to expire subscription overrides");
            outcome.errors.push(format!("expire overrides: {}", e));
            return outcome;
        }
    };

    outcome.processed = expired.len() as u64;

    for (org_id, name) in &expired {
        tracing::info!(org_id = %org_id, org_name = %name, "Cleared expired subscription override");
    }

    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::email::{EmailConfig, InvoiceEmailService};
    use bildout_shared::db::create_pool;

    fn test_email_service() -> InvoiceEmailService {
        // No API key configured: sends are skipped, not errors
        InvoiceEmailService::new(EmailConfig {
            resend_api_key: String::new(),
            email_from: "BildOut <noreply@bildout.test>".to_string(),
            app_name: "BildOut".to_string(),
            support_email: "support@bildout.test".to_string(),
            app_base_url: "http://localhost:3000".to_string(),
        })
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_overdue_sweep_empty_database() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url).await.unwrap();
        let outcome = run_overdue_sweep(&pool, &test_email_service()).await;
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_override_expiry_sweep_runs() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url).await.unwrap();
        let outcome = run_override_expiry_sweep(&pool).await;
        assert!(outcome.errors.is_empty());
    }
}
