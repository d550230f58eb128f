//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub app_base_url: String,

    // Database
    pub database_url: String,

    // Authentication
    pub jwt_secret: String,

    // Scheduled endpoint gate
    pub cron_secret: String,

    // Stripe
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_price_pro: String,
    pub stripe_price_agency: String,

    // Email
    pub resend_api_key: String,
    pub email_from: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                // Signing key must be cryptographically strong
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },

            // Scheduled endpoint gate
            cron_secret: {
                let secret =
                    env::var("CRON_SECRET").map_err(|_| ConfigError::Missing("CRON_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "CRON_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },

            // Stripe
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            stripe_price_pro: env::var("STRIPE_PRICE_PRO")
                .unwrap_or_else(|_| "price_pro".to_string()),
            stripe_price_agency: env::var("STRIPE_PRICE_AGENCY")
                .unwrap_or_else(|_| "price_agency".to_string()),

            // Email
            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "BildOut <noreply@localhost>".to_string()),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure config tests run serially (they modify shared env vars)
    static CONFIG_TEST_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set required env vars for testing
    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        // Must be at least 32 characters
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
        env::set_var(
            "CRON_SECRET",
            "test-cron-secret-must-be-at-least-32-chars",
        );
    }

    /// Helper to clear env vars after tests
    fn cleanup_config() {
        env::remove_var("DATABASE_URL");
        env::remove_var("JWT_SECRET");
        env::remove_var("CRON_SECRET");
    }

    /// Combined secret validation tests - runs serially to avoid env var races
    #[test]
    fn test_secret_validation() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();

        // === Test 1: Missing DATABASE_URL ===
        cleanup_config();
        let result = Config::from_env();
        assert!(
            matches!(result, Err(ConfigError::Missing("DATABASE_URL"))),
            "Expected Missing error for DATABASE_URL, got: {:?}",
            result
        );

        // === Test 2: Missing JWT_SECRET ===
        env::set_var("DATABASE_URL", "postgres://test");
        env::remove_var("JWT_SECRET");
        let result = Config::from_env();
        assert!(
            matches!(result, Err(ConfigError::Missing("JWT_SECRET"))),
            "Expected Missing error for JWT_SECRET, got: {:?}",
            result
        );

        // === Test 3: Short JWT_SECRET rejected ===
        env::set_var("JWT_SECRET", "too-short");
        let result = Config::from_env();
        assert!(
            matches!(result, Err(ConfigError::WeakSecret(_))),
            "Short JWT_SECRET should be rejected"
        );

        // === Test 4: Short CRON_SECRET rejected ===
        setup_minimal_config();
        env::set_var("CRON_SECRET", "short");
        let result = Config::from_env();
        assert!(
            matches!(result, Err(ConfigError::WeakSecret(_))),
            "Short CRON_SECRET should be rejected"
        );

        // === Test 5: Valid config accepted with defaults applied ===
        setup_minimal_config();
        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.stripe_price_pro, "price_pro");

        cleanup_config();
    }
}
