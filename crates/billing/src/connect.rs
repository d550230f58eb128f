//! Stripe Connect account management
//!
//! Merchants collect invoice payments through an Express connected account.
//! This module owns account creation, onboarding links, dashboard login
//! links, and the status sync that mirrors Stripe's verification flags onto
//! the user row.

use bildout_shared::types::User;
use sqlx::PgPool;
use stripe::{
    Account, AccountId, AccountLink, AccountLinkType, AccountType, CreateAccount,
    CreateAccountLink, ErrorCode, LoginLink, StripeError,
};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Connected-account service
pub struct ConnectService {
    stripe: StripeClient,
    pool: PgPool,
}

/// Snapshot of a connected account's verification state
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectStatus {
    pub account_id: Option<String>,
    pub onboarding_complete: bool,
    pub payouts_enabled: bool,
}

impl ConnectService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Get the user's connected account id, creating an Express account on
    /// first use
    pub async fn ensure_account(&self, user_id: Uuid) -> BillingResult<String> {
        let user = self.load_user(user_id).await?;

        if let Some(account_id) = user.stripe_account_id {
            return Ok(account_id);
        }

        let mut params = CreateAccount::new();
        params.type_ = Some(AccountType::Express);
        params.email = Some(&user.email);

        let account = Account::create(self.stripe.inner(), params).await?;

        sqlx::query(
            "UPDATE users SET stripe_account_id = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(account.id.as_str())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            account_id = %account.id,
            "Created Stripe Connect account"
        );

        Ok(account.id.to_string())
    }

    /// Create an onboarding link for the user's connected account
    pub async fn onboarding_link(&self, user_id: Uuid) -> BillingResult<String> {
        let account_id = self.ensure_account(user_id).await?;
        let account_id = parse_account_id(&account_id)?;

        let refresh_url = format!(
            "{}/settings/payments?refresh=1",
            self.stripe.config().app_base_url
        );
        let return_url = format!("{}/settings/payments", self.stripe.config().app_base_url);

        let mut params = CreateAccountLink::new(account_id, AccountLinkType::AccountOnboarding);
        params.refresh_url = Some(&refresh_url);
        params.return_url = Some(&return_url);

        let link = AccountLink::create(self.stripe.inner(), params).await?;
        Ok(link.url)
    }

    /// Create an Express dashboard login link (admin support tooling)
    pub async fn login_link(&self, account_id: &str) -> BillingResult<String> {
        let link: LoginLink = self
            .stripe
            .inner()
            .post(&format!("/accounts/{}/login_links", account_id))
            .await?;
        Ok(link.url)
    }

    /// Re-pull the account's verification flags from Stripe and mirror them
    /// onto the user row. A stale account id (deleted on the Stripe side)
    /// is cleared rather than surfaced as an error.
    pub async fn sync_account_status(&self, user_id: Uuid) -> BillingResult<ConnectStatus> {
        let user = self.load_user(user_id).await?;

        let Some(account_id) = user.stripe_account_id else {
            return Ok(ConnectStatus {
                account_id: None,
                onboarding_complete: false,
                payouts_enabled: false,
            });
        };

        let parsed = parse_account_id(&account_id)?;
        let account = match Account::retrieve(self.stripe.inner(), &parsed, &[]).await {
            Ok(account) => account,
            Err(StripeError::Stripe(ref req)) if req.code == Some(ErrorCode::ResourceMissing) => {
                tracing::warn!(
                    user_id = %user_id,
                    account_id = %account_id,
                    "Connected account no longer exists on Stripe, clearing stale reference"
                );
                sqlx::query(
                    r#"
                    UPDATE users
                    SET stripe_account_id = NULL,
                        onboarding_complete = FALSE,
                        payouts_enabled = FALSE,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(user_id)
                .execute(&self.pool)
                .await?;

                return Ok(ConnectStatus {
                    account_id: None,
                    onboarding_complete: false,
                    payouts_enabled: false,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let onboarding_complete = account.details_submitted.unwrap_or(false);
        let payouts_enabled = account.payouts_enabled.unwrap_or(false);

        sqlx::query(
            r#"
            UPDATE users
            SET onboarding_complete = $1, payouts_enabled = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(onboarding_complete)
        .bind(payouts_enabled)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(ConnectStatus {
            account_id: Some(account_id),
            onboarding_complete,
            payouts_enabled,
        })
    }

    async fn load_user(&self, user_id: Uuid) -> BillingResult<User> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        user.ok_or_else(|| BillingError::NotFound(format!("User {} not found", user_id)))
    }
}

fn parse_account_id(account_id: &str) -> BillingResult<AccountId> {
    account_id
        .parse()
        .map_err(|e| BillingError::StripeApi(format!("Invalid account ID: {}", e)))
}
