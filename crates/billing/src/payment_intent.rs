//! Payment intent assembly
//!
//! Resolves an invoice through its public payment-link token, validates the
//! requested amount against balance and deposit rules, and delegates to
//! Stripe to create a payment intent routed to the merchant's connected
//! account with the platform fee attached. Nothing is written locally here;
//! the invoice is only mutated later by the webhook.

use std::collections::HashMap;

use bildout_shared::types::Invoice;
use serde::Serialize;
use sqlx::PgPool;
use stripe::{CreatePaymentIntent, CreatePaymentIntentTransferData, Currency, PaymentIntent};
use uuid::Uuid;

use crate::client::{platform_fee_cents, StripeClient};
use crate::error::{BillingError, BillingResult};

/// Validate a requested payment amount against an invoice's balance and
/// deposit rules.
///
/// The amount must be positive, must not exceed the outstanding balance,
/// and must meet the configured deposit minimum unless it settles the
/// invoice in full.
pub fn validate_payment_amount(
    amount_cents: i64,
    amount_due_cents: i64,
    deposit_required_cents: Option<i64>,
) -> BillingResult<()> {
    if amount_cents <= 0 {
        return Err(BillingError::InvalidAmount(
            "Payment amount must be greater than zero".to_string(),
        ));
    }

    if amount_cents > amount_due_cents {
        return Err(BillingError::InvalidAmount(format!(
            "Payment amount exceeds the amount due ({} cents)",
            amount_due_cents
        )));
    }

    if let Some(deposit) = deposit_required_cents {
        if amount_cents < deposit && amount_cents != amount_due_cents {
            return Err(BillingError::InvalidAmount(format!(
                "A minimum payment of {} cents is required",
                deposit
            )));
        }
    }

    Ok(())
}

/// Response returned to the public payment page
#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub amount_cents: i64,
    pub platform_fee_cents: i64,
}

/// Payment intent service
pub struct PaymentIntentService {
    stripe: StripeClient,
    pool: PgPool,
}

impl PaymentIntentService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Create a payment intent for the invoice behind a payment-link token.
    ///
    /// The token is the only capability check: whoever holds it may pay.
    /// `requested_cents` of None means the full outstanding balance.
    pub async fn create_for_token(
        &self,
        token: Uuid,
        requested_cents: Option<i64>,
    ) -> BillingResult<PaymentIntentResponse> {
        let invoice: Option<Invoice> = sqlx::query_as(
            "SELECT * FROM invoices WHERE payment_link_token = $1 AND deleted_at IS NULL",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let invoice =
            invoice.ok_or_else(|| BillingError::NotFound("Invoice not found".to_string()))?;

        if !invoice.status.accepts_payment() {
            return Err(BillingError::InvoiceNotPayable(format!(
                "Invoice is {}",
                invoice.status
            )));
        }

        let amount_cents = requested_cents.unwrap_or(invoice.amount_due_cents);
        validate_payment_amount(
            amount_cents,
            invoice.amount_due_cents,
            invoice.deposit_required_cents,
        )?;

        let destination = self.connected_account_for_org(invoice.org_id).await?;
        let fee_cents = platform_fee_cents(amount_cents);

        let mut metadata = HashMap::new();
        metadata.insert("invoice_id".to_string(), invoice.id.to_string());
        metadata.insert("org_id".to_string(), invoice.org_id.to_string());

        let mut params = CreatePaymentIntent::new(amount_cents, Currency::USD);
        params.application_fee_amount = Some(fee_cents);
        params.transfer_data = Some(CreatePaymentIntentTransferData {
            amount: None,
            destination,
        });
        params.metadata = Some(metadata);

        let intent = PaymentIntent::create(self.stripe.inner(), params).await?;

        let client_secret = intent.client_secret.ok_or_else(|| {
            BillingError::StripeApi("Payment intent missing client secret".to_string())
        })?;

        tracing::info!(
            invoice_id = %invoice.id,
            org_id = %invoice.org_id,
            amount_cents,
            fee_cents,
            "Created payment intent"
        );

        Ok(PaymentIntentResponse {
            client_secret,
            amount_cents,
            platform_fee_cents: fee_cents,
        })
    }

    /// Find the Stripe Connect account that receives this org's payments
    async fn connected_account_for_org(&self, org_id: Uuid) -> BillingResult<String> {
        let account: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            SELECT stripe_account_id FROM users
            WHERE org_id = $1 AND stripe_account_id IS NOT NULL
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        match account {
            Some((Some(id),)) => Ok(id),
            _ => Err(BillingError::ConnectedAccountNotFound(org_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_and_negative_amounts() {
        assert!(validate_payment_amount(0, 10_000, None).is_err());
        assert!(validate_payment_amount(-500, 10_000, None).is_err());
    }

    #[test]
    fn test_rejects_amount_above_due() {
        let err = validate_payment_amount(10_001, 10_000, None).unwrap_err();
        assert!(matches!(err, BillingError::InvalidAmount(_)));
    }

    #[test]
    fn test_accepts_full_balance() {
        assert!(validate_payment_amount(10_000, 10_000, None).is_ok());
    }

    #[test]
    fn test_rejects_below_deposit() {
        let err = validate_payment_amount(1_000, 10_000, Some(2_500)).unwrap_err();
        assert!(matches!(err, BillingError::InvalidAmount(_)));
    }

    #[test]
    fn test_accepts_deposit_amount() {
        assert!(validate_payment_amount(2_500, 10_000, Some(2_500)).is_ok());
    }

    #[test]
    fn test_full_balance_bypasses_deposit_floor() {
        // Remaining balance below the deposit floor can still be settled in full
        assert!(validate_payment_amount(1_500, 1_500, Some(2_500)).is_ok());
    }

    #[test]
    fn test_partial_above_deposit_is_allowed() {
        assert!(validate_payment_amount(5_000, 10_000, Some(2_500)).is_ok());
    }
}
