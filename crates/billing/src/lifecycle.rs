//! Invoice lifecycle helpers
//!
//! Derived monetary fields and the small shared predicates behind the
//! status-changing endpoints. Each endpoint still re-validates organization
//! ownership and performs its own writes; adding a status means revisiting
//! those call sites.

use bildout_shared::types::InvoiceStatus;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::BillingResult;

/// Line item input as accepted by the invoice create/update endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct LineInput {
    pub description: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub tax_exempt: bool,
}

/// Derived invoice totals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal_cents: i64,
    pub tax_total_cents: i64,
    pub discount_total_cents: i64,
    pub total_cents: i64,
}

/// Compute invoice totals from line items.
///
/// Tax applies to non-exempt lines at `tax_rate_bps` (basis points),
/// truncating to whole cents. The discount is subtracted after tax; a
/// discount larger than subtotal + tax floors the total at zero.
pub fn compute_totals(items: &[LineInput], tax_rate_bps: i32, discount_cents: i64) -> Totals {
    let mut subtotal: i64 = 0;
    let mut taxable: i64 = 0;

    for item in items {
        let amount = line_amount_cents(item);
        subtotal += amount;
        if !item.tax_exempt {
            taxable += amount;
        }
    }

    let tax = taxable * tax_rate_bps as i64 / 10_000;
    let total = (subtotal + tax - discount_cents).max(0);

    Totals {
        subtotal_cents: subtotal,
        tax_total_cents: tax,
        discount_total_cents: discount_cents,
        total_cents: total,
    }
}

/// Amount for a single line
pub fn line_amount_cents(item: &LineInput) -> i64 {
    item.quantity as i64 * item.unit_price_cents
}

/// Outcome of applying a payment to an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub status: InvoiceStatus,
    pub amount_paid_cents: i64,
    pub amount_due_cents: i64,
}

/// Apply a successful payment amount to the invoice's running totals.
/// Fully covering the balance marks the invoice paid; anything less is a
/// partial payment.
pub fn apply_payment(
    total_cents: i64,
    amount_paid_cents: i64,
    payment_cents: i64,
) -> PaymentOutcome {
    let paid = amount_paid_cents + payment_cents;
    let due = (total_cents - paid).max(0);
    let status = if due == 0 {
        InvoiceStatus::Paid
    } else {
        InvoiceStatus::Partial
    };

    PaymentOutcome {
        status,
        amount_paid_cents: paid,
        amount_due_cents: due,
    }
}

/// Actor string for a user-initiated transition
pub fn actor_user(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

/// Actor string for the overdue sweep
pub const ACTOR_OVERDUE_SWEEP: &str = "system:overdue-sweep";

/// Actor string for webhook-driven transitions
pub const ACTOR_WEBHOOK: &str = "webhook";

/// Append a row to the invoice status history trail.
///
/// Runs as its own statement after the invoice update; a failure here
/// leaves the invoice updated without a trail entry.
pub async fn record_status_change(
    pool: &PgPool,
    invoice_id: Uuid,
    from_status: Option<InvoiceStatus>,
    to_status: InvoiceStatus,
    actor: &str,
    notes: Option<&str>,
) -> BillingResult<()> {
    sqlx::query(
        r#"
        INSERT INTO invoice_status_history (invoice_id, from_status, to_status, actor, notes)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(invoice_id)
    .bind(from_status)
    .bind(to_status)
    .bind(actor)
    .bind(notes)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i32, unit_price_cents: i64, tax_exempt: bool) -> LineInput {
        LineInput {
            description: "Design work".to_string(),
            quantity,
            unit_price_cents,
            tax_exempt,
        }
    }

    #[test]
    fn test_totals_without_tax_or_discount() {
        let totals = compute_totals(&[line(2, 5_000, false), line(1, 1_500, false)], 0, 0);
        assert_eq!(totals.subtotal_cents, 11_500);
        assert_eq!(totals.tax_total_cents, 0);
        assert_eq!(totals.total_cents, 11_500);
    }

    #[test]
    fn test_totals_with_tax() {
        // 8.25% on $100.00
        let totals = compute_totals(&[line(1, 10_000, false)], 825, 0);
        assert_eq!(totals.tax_total_cents, 825);
        assert_eq!(totals.total_cents, 10_825);
    }

    #[test]
    fn test_tax_skips_exempt_lines() {
        let totals = compute_totals(&[line(1, 10_000, false), line(1, 5_000, true)], 1_000, 0);
        assert_eq!(totals.subtotal_cents, 15_000);
        // Tax only on the non-exempt $100.00
        assert_eq!(totals.tax_total_cents, 1_000);
    }

    #[test]
    fn test_discount_applies_after_tax() {
        let totals = compute_totals(&[line(1, 10_000, false)], 1_000, 2_000);
        assert_eq!(totals.total_cents, 10_000 + 1_000 - 2_000);
        assert_eq!(totals.discount_total_cents, 2_000);
    }

    #[test]
    fn test_oversized_discount_floors_at_zero() {
        let totals = compute_totals(&[line(1, 1_000, false)], 0, 5_000);
        assert_eq!(totals.total_cents, 0);
    }

    #[test]
    fn test_tax_truncates_to_whole_cents() {
        // 1.5% of $0.99 = 1.485 cents
        let totals = compute_totals(&[line(1, 99, false)], 150, 0);
        assert_eq!(totals.tax_total_cents, 1);
    }

    #[test]
    fn test_partial_payment_outcome() {
        let outcome = apply_payment(10_000, 0, 4_000);
        assert_eq!(outcome.status, InvoiceStatus::Partial);
        assert_eq!(outcome.amount_paid_cents, 4_000);
        assert_eq!(outcome.amount_due_cents, 6_000);
    }

    #[test]
    fn test_full_payment_outcome() {
        let outcome = apply_payment(10_000, 4_000, 6_000);
        assert_eq!(outcome.status, InvoiceStatus::Paid);
        assert_eq!(outcome.amount_due_cents, 0);
    }

    #[test]
    fn test_overpayment_clamps_due_at_zero() {
        let outcome = apply_payment(10_000, 9_000, 2_000);
        assert_eq!(outcome.status, InvoiceStatus::Paid);
        assert_eq!(outcome.amount_paid_cents, 11_000);
        assert_eq!(outcome.amount_due_cents, 0);
    }
}
