//! Merchant subscription sync
//!
//! Webhooks keep `organizations.subscription_plan` current; this service is
//! the admin-triggered fallback that re-pulls the truth from Stripe when a
//! webhook was missed.

use sqlx::PgPool;
use stripe::{CustomerId, ErrorCode, ListSubscriptions, StripeError, Subscription};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

pub struct SubscriptionService {
    stripe: StripeClient,
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Re-derive the organization's plan from its Stripe subscriptions and
    /// store it. Returns the plan that was written.
    ///
    /// A customer that no longer exists on Stripe clears the stale local
    /// reference and reverts the org to free.
    pub async fn sync_from_stripe(&self, org_id: Uuid) -> BillingResult<String> {
        let customer: Option<(Option<String>,)> =
            sqlx::query_as("SELECT stripe_customer_id FROM organizations WHERE id = $1")
                .bind(org_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((Some(customer_id),)) = customer else {
            return Err(BillingError::CustomerNotFound(org_id.to_string()));
        };

        let parsed: CustomerId = customer_id
            .parse()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let mut params = ListSubscriptions::new();
        params.customer = Some(parsed);

        let subscriptions = match Subscription::list(self.stripe.inner(), &params).await {
            Ok(list) => list,
            Err(StripeError::Stripe(ref req)) if req.code == Some(ErrorCode::ResourceMissing) => {
                tracing::warn!(
                    org_id = %org_id,
                    customer_id = %customer_id,
                    "Stripe customer no longer exists, clearing stale reference"
                );
                sqlx::query(
                    r#"
                    UPDATE organizations
                    SET stripe_customer_id = NULL, subscription_plan = 'free', updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(org_id)
                .execute(&self.pool)
                .await?;
                return Ok("free".to_string());
            }
            Err(e) => return Err(e.into()),
        };

        let active = subscriptions.data.iter().find(|sub| {
            matches!(
                sub.status,
                stripe::SubscriptionStatus::Active | stripe::SubscriptionStatus::Trialing
            )
        });

        let plan = active
            .and_then(|sub| sub.items.data.first())
            .and_then(|item| item.price.as_ref())
            .and_then(|price| self.stripe.config().plan_for_price_id(price.id.as_str()))
            .unwrap_or("free");

        sqlx::query(
            "UPDATE organizations SET subscription_plan = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(plan)
        .bind(org_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(org_id = %org_id, plan = %plan, "Synced subscription plan from Stripe");

        Ok(plan.to_string())
    }
}
