//! Stripe client configuration

use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Platform fee charged on invoice payments, in basis points (1.5%)
pub const PLATFORM_FEE_BPS: i64 = 150;

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe webhook signing secret
    pub webhook_secret: String,
    /// Price IDs for each subscription plan
    pub price_ids: PriceIds,
    /// Base URL for success/cancel redirects and payment links
    pub app_base_url: String,
}

/// Stripe price IDs for merchant subscription plans
/// Plan hierarchy: Free (no price) → Pro ($12) → Agency ($39)
#[derive(Debug, Clone)]
pub struct PriceIds {
    pub pro: String,
    pub agency: String,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?,
            price_ids: PriceIds {
                pro: std::env::var("STRIPE_PRICE_PRO")
                    .map_err(|_| BillingError::Config("STRIPE_PRICE_PRO not set".to_string()))?,
                agency: std::env::var("STRIPE_PRICE_AGENCY")
                    .map_err(|_| BillingError::Config("STRIPE_PRICE_AGENCY not set".to_string()))?,
            },
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    /// Get price ID for a plan
    pub fn price_id_for_plan(&self, plan: &str) -> Option<&str> {
        match plan.to_lowercase().as_str() {
            "pro" => Some(&self.price_ids.pro),
            "agency" => Some(&self.price_ids.agency),
            _ => None,
        }
    }

    /// Get plan from price ID
    pub fn plan_for_price_id(&self, price_id: &str) -> Option<&'static str> {
        if price_id == self.price_ids.pro {
            Some("pro")
        } else if price_id == self.price_ids.agency {
            Some("agency")
        } else {
            None
        }
    }
}

/// Compute the platform fee for a payment amount, truncating to whole cents
pub fn platform_fee_cents(amount_cents: i64) -> i64 {
    amount_cents * PLATFORM_FEE_BPS / 10_000
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_fee_truncates() {
        // 1.5% of $100.00
        assert_eq!(platform_fee_cents(10_000), 150);
        // 1.5% of $0.67 = 1.005 cents, truncated
        assert_eq!(platform_fee_cents(67), 1);
        // Sub-cent fees truncate to zero
        assert_eq!(platform_fee_cents(66), 0);
    }

    #[test]
    fn test_plan_price_id_mapping() {
        let config = StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: "whsec_test".to_string(),
            price_ids: PriceIds {
                pro: "price_pro_123".to_string(),
                agency: "price_agency_456".to_string(),
            },
            app_base_url: "http://localhost:3000".to_string(),
        };

        assert_eq!(config.price_id_for_plan("pro"), Some("price_pro_123"));
        assert_eq!(config.price_id_for_plan("Agency"), Some("price_agency_456"));
        assert_eq!(config.price_id_for_plan("free"), None);

        assert_eq!(config.plan_for_price_id("price_pro_123"), Some("pro"));
        assert_eq!(config.plan_for_price_id("price_unknown"), None);
    }
}
