//! Stripe webhook handling
//!
//! Verifies event signatures and applies the handful of events BildOut cares
//! about: invoice payments landing on connected accounts, merchant
//! subscription changes, and Connect account verification updates.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{Event, EventObject, EventType, PaymentIntent, Subscription, Webhook};
use uuid::Uuid;

use bildout_shared::types::{Invoice, PaymentStatus};

use crate::client::StripeClient;
use crate::email::InvoiceEmailService;
use crate::error::{BillingError, BillingResult};
use crate::lifecycle::{self, ACTOR_WEBHOOK};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp before it is rejected
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Verify a Stripe signature header against the payload.
///
/// Parses the `t=...,v1=...` header, checks the timestamp tolerance, and
/// compares the HMAC-SHA256 of `{timestamp}.{payload}`.
pub fn verify_signature(
    payload: &str,
    signature: &str,
    webhook_secret: &str,
    now_unix: i64,
) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in signature.split(',') {
        let kv: Vec<&str> = part.splitn(2, '=').collect();
        if kv.len() == 2 {
            match kv[0] {
                "t" => timestamp = kv[1].parse().ok(),
                "v1" => v1_signature = Some(kv[1].to_string()),
                _ => {}
            }
        }
    }

    let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
    let v1_signature = v1_signature.ok_or(BillingError::WebhookSignatureInvalid)?;

    if (now_unix - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        tracing::warn!(
            timestamp,
            now = now_unix,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let secret_key = webhook_secret
        .strip_prefix("whsec_")
        .unwrap_or(webhook_secret);
    let signed_payload = format!("{}.{}", timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(signed_payload.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    if computed != v1_signature {
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    stripe: StripeClient,
    pool: PgPool,
    email: InvoiceEmailService,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, pool: PgPool, email: InvoiceEmailService) -> Self {
        Self {
            stripe,
            pool,
            email,
        }
    }

    /// Verify and parse a Stripe webhook event
    ///
    /// Uses manual signature verification to work around async-stripe version
    /// incompatibility with newer Stripe API versions.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;

        // Try the standard method first
        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::warn!(
                    stripe_error = %e,
                    "Standard webhook parsing failed, trying manual verification"
                );
            }
        }

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|_| BillingError::WebhookSignatureInvalid)?
            .as_secs() as i64;

        verify_signature(payload, signature, webhook_secret, now)?;

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookSignatureInvalid
        })?;

        Ok(event)
    }

    /// Handle a verified Stripe event.
    ///
    /// Stripe retries webhooks, so each event id is claimed once through an
    /// insert; replays are acknowledged without reprocessing.
    pub async fn handle_event(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let event_type = event.type_.to_string();

        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO stripe_webhook_events (stripe_event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (stripe_event_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&event_id)
        .bind(&event_type)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_none() {
            tracing::info!(
                event_id = %event_id,
                event_type = %event_type,
                "Duplicate webhook event, skipping"
            );
            return Ok(());
        }

        tracing::info!(
            event_id = %event_id,
            event_type = %event_type,
            "Processing Stripe webhook event"
        );

        match event.type_ {
            EventType::PaymentIntentSucceeded => {
                self.handle_payment_succeeded(event).await?;
            }
            EventType::PaymentIntentPaymentFailed => {
                self.handle_payment_failed(event).await?;
            }
            EventType::CheckoutSessionCompleted => {
                self.handle_checkout_completed(event).await?;
            }
            EventType::CustomerSubscriptionUpdated => {
                self.handle_subscription_updated(event).await?;
            }
            EventType::CustomerSubscriptionDeleted => {
                self.handle_subscription_deleted(event).await?;
            }
            EventType::AccountUpdated => {
                self.handle_account_updated(event).await?;
            }
            _ => {
                tracing::info!(
                    event_type = %event_type,
                    event_id = %event_id,
                    "Received unhandled Stripe event type - no handler configured"
                );
            }
        }

        Ok(())
    }

    /// A payment intent for an invoice settled. Record the payment, roll the
    /// invoice's paid/due amounts forward, and notify the payer.
    async fn handle_payment_succeeded(&self, event: Event) -> BillingResult<()> {
        let intent = self.extract_payment_intent(event)?;
        let invoice = self.invoice_for_intent(&intent).await?;

        let amount_cents = intent.amount;
        let method = intent
            .payment_method_types
            .first()
            .cloned()
            .unwrap_or_else(|| "card".to_string());

        sqlx::query(
            r#"
            INSERT INTO payments (invoice_id, org_id, amount_cents, status, method, stripe_payment_intent_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.org_id)
        .bind(amount_cents)
        .bind(PaymentStatus::Succeeded)
        .bind(&method)
        .bind(intent.id.as_str())
        .execute(&self.pool)
        .await?;

        let outcome = lifecycle::apply_payment(
            invoice.total_cents,
            invoice.amount_paid_cents,
            amount_cents,
        );

        // Invoice update and history insert are separate statements; a crash
        // in between leaves the amounts updated without a trail entry.
        sqlx::query(
            r#"
            UPDATE invoices
            SET status = $1, amount_paid_cents = $2, amount_due_cents = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(outcome.status)
        .bind(outcome.amount_paid_cents)
        .bind(outcome.amount_due_cents)
        .bind(invoice.id)
        .execute(&self.pool)
        .await?;

        lifecycle::record_status_change(
            &self.pool,
            invoice.id,
            Some(invoice.status),
            outcome.status,
            ACTOR_WEBHOOK,
            Some(&format!("Payment of {} cents received", amount_cents)),
        )
        .await?;

        tracing::info!(
            invoice_id = %invoice.id,
            org_id = %invoice.org_id,
            amount_cents,
            new_status = %outcome.status,
            "Recorded invoice payment"
        );

        // Receipt email is best-effort
        if let Ok(Some((email, org_name))) = self.client_email_for_invoice(&invoice).await {
            let _ = self
                .email
                .send_payment_receipt(&email, &org_name, invoice.number, amount_cents)
                .await;
        }

        Ok(())
    }

    async fn handle_payment_failed(&self, event: Event) -> BillingResult<()> {
        let intent = self.extract_payment_intent(event)?;

        // A failed intent may not carry our metadata (e.g. created then
        // abandoned); nothing to record in that case
        let Ok(invoice) = self.invoice_for_intent(&intent).await else {
            tracing::warn!(
                intent_id = %intent.id,
                "Payment failed for unknown invoice, ignoring"
            );
            return Ok(());
        };

        sqlx::query(
            r#"
            INSERT INTO payments (invoice_id, org_id, amount_cents, status, method, stripe_payment_intent_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.org_id)
        .bind(intent.amount)
        .bind(PaymentStatus::Failed)
        .bind(intent.payment_method_types.first())
        .bind(intent.id.as_str())
        .execute(&self.pool)
        .await?;

        tracing::warn!(
            invoice_id = %invoice.id,
            intent_id = %intent.id,
            "Invoice payment failed"
        );

        Ok(())
    }

    /// Merchant finished checkout for a paid plan
    async fn handle_checkout_completed(&self, event: Event) -> BillingResult<()> {
        let session = match event.data.object {
            EventObject::CheckoutSession(session) => session,
            _ => {
                return Err(BillingError::WebhookEventNotSupported(
                    "Expected CheckoutSession".to_string(),
                ))
            }
        };

        let Some(metadata) = &session.metadata else {
            return Ok(());
        };
        let (Some(org_id_str), Some(plan)) = (metadata.get("org_id"), metadata.get("plan")) else {
            return Ok(());
        };

        let org_id = Uuid::parse_str(org_id_str)
            .map_err(|e| BillingError::Internal(format!("Invalid org_id: {}", e)))?;

        sqlx::query(
            "UPDATE organizations SET subscription_plan = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(plan)
        .bind(org_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(org_id = %org_id, plan = %plan, "Subscription checkout completed");

        Ok(())
    }

    async fn handle_subscription_updated(&self, event: Event) -> BillingResult<()> {
        let subscription = self.extract_subscription(event)?;
        let Some(org_id) = self.org_for_customer(&subscription).await? else {
            tracing::warn!(
                subscription_id = %subscription.id,
                "Subscription update for unknown customer, ignoring"
            );
            return Ok(());
        };

        let plan = subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .and_then(|price| self.stripe.config().plan_for_price_id(price.id.as_str()));

        let plan = match subscription.status {
            stripe::SubscriptionStatus::Active | stripe::SubscriptionStatus::Trialing => {
                plan.unwrap_or("free")
            }
            stripe::SubscriptionStatus::Canceled | stripe::SubscriptionStatus::Unpaid => "free",
            // Past-due keeps access until the subscription actually ends
            _ => plan.unwrap_or("free"),
        };

        sqlx::query(
            "UPDATE organizations SET subscription_plan = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(plan)
        .bind(org_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            org_id = %org_id,
            subscription_id = %subscription.id,
            plan = %plan,
            "Synced subscription plan"
        );

        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: Event) -> BillingResult<()> {
        let subscription = self.extract_subscription(event)?;
        let Some(org_id) = self.org_for_customer(&subscription).await? else {
            return Ok(());
        };

        sqlx::query(
            "UPDATE organizations SET subscription_plan = 'free', updated_at = NOW() WHERE id = $1",
        )
        .bind(org_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(org_id = %org_id, "Subscription deleted, reverted to free plan");

        Ok(())
    }

    /// Mirror Connect verification flags onto the merchant's user row
    async fn handle_account_updated(&self, event: Event) -> BillingResult<()> {
        let account = match event.data.object {
            EventObject::Account(account) => account,
            _ => {
                return Err(BillingError::WebhookEventNotSupported(
                    "Expected Account".to_string(),
                ))
            }
        };

        let onboarding_complete = account.details_submitted.unwrap_or(false);
        let payouts_enabled = account.payouts_enabled.unwrap_or(false);

        let result = sqlx::query(
            r#"
            UPDATE users
            SET onboarding_complete = $1, payouts_enabled = $2, updated_at = NOW()
            WHERE stripe_account_id = $3
            "#,
        )
        .bind(onboarding_complete)
        .bind(payouts_enabled)
        .bind(account.id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(
                account_id = %account.id,
                "Account update for unknown connected account"
            );
        }

        Ok(())
    }

    // =========================================================================
    // Extraction helpers
    // =========================================================================

    fn extract_payment_intent(&self, event: Event) -> BillingResult<PaymentIntent> {
        match event.data.object {
            EventObject::PaymentIntent(intent) => Ok(intent),
            _ => Err(BillingError::WebhookEventNotSupported(
                "Expected PaymentIntent".to_string(),
            )),
        }
    }

    fn extract_subscription(&self, event: Event) -> BillingResult<Subscription> {
        match event.data.object {
            EventObject::Subscription(subscription) => Ok(subscription),
            _ => Err(BillingError::WebhookEventNotSupported(
                "Expected Subscription".to_string(),
            )),
        }
    }

    async fn invoice_for_intent(&self, intent: &PaymentIntent) -> BillingResult<Invoice> {
        let invoice_id = intent
            .metadata
            .get("invoice_id")
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| {
                BillingError::Internal("Payment intent missing invoice_id metadata".to_string())
            })?;

        let invoice: Option<Invoice> = sqlx::query_as("SELECT * FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .fetch_optional(&self.pool)
            .await?;

        invoice.ok_or_else(|| BillingError::NotFound(format!("Invoice {} not found", invoice_id)))
    }

    async fn org_for_customer(&self, subscription: &Subscription) -> BillingResult<Option<Uuid>> {
        let customer_id = subscription.customer.id();

        let org: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM organizations WHERE stripe_customer_id = $1")
                .bind(customer_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(org.map(|(id,)| id))
    }

    async fn client_email_for_invoice(
        &self,
        invoice: &Invoice,
    ) -> BillingResult<Option<(String, String)>> {
        let Some(client_id) = invoice.client_id else {
            return Ok(None);
        };

        let row: Option<(Option<String>, String)> = sqlx::query_as(
            r#"
            SELECT c.email, o.name
            FROM clients c
            JOIN organizations o ON o.id = c.org_id
            WHERE c.id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(email, org_name)| email.map(|e| (e, org_name))))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";

    fn sign(payload: &str, timestamp: i64) -> String {
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(
            SECRET.strip_prefix("whsec_").unwrap().as_bytes(),
        )
        .unwrap();
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = r#"{"id":"evt_123"}"#;
        let now = 1_700_000_000;
        let header = format!("t={},v1={}", now, sign(payload, now));
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let now = 1_700_000_000;
        let header = format!("t={},v1={}", now, sign(r#"{"id":"evt_123"}"#, now));
        let result = verify_signature(r#"{"id":"evt_999"}"#, &header, SECRET, now);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = r#"{"id":"evt_123"}"#;
        let then = 1_700_000_000;
        let header = format!("t={},v1={}", then, sign(payload, then));
        // 10 minutes later - beyond the 5-minute tolerance
        let result = verify_signature(payload, &header, SECRET, then + 600);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let result = verify_signature("{}", "not-a-signature-header", SECRET, 1_700_000_000);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }
}
