//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use bildout_billing::email::{EmailConfig, InvoiceEmailService};
use bildout_billing::{StripeClient, StripeConfig};

use crate::config::Config;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub stripe: StripeClient,
    pub email: InvoiceEmailService,
}

/// Slimmed-down state for the auth middleware layer
#[derive(Clone)]
pub struct AuthState {
    pub pool: PgPool,
    pub jwt_secret: String,
}

impl AppState {
    /// Build application state from loaded config
    pub fn new(config: Config, pool: PgPool) -> Self {
        let stripe = StripeClient::new(StripeConfig {
            secret_key: config.stripe_secret_key.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
            price_ids: bildout_billing::client::PriceIds {
                pro: config.stripe_price_pro.clone(),
                agency: config.stripe_price_agency.clone(),
            },
            app_base_url: config.app_base_url.clone(),
        });

        let email = InvoiceEmailService::new(EmailConfig {
            resend_api_key: config.resend_api_key.clone(),
            email_from: config.email_from.clone(),
            app_name: "BildOut".to_string(),
            support_email: std::env::var("SUPPORT_EMAIL")
                .unwrap_or_else(|_| "support@bildout.com".to_string()),
            app_base_url: config.app_base_url.clone(),
        });

        Self {
            pool,
            config: Arc::new(config),
            stripe,
            email,
        }
    }

    /// State handed to the auth middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            pool: self.pool.clone(),
            jwt_secret: self.config.jwt_secret.clone(),
        }
    }
}
