//! Error types for BildOut

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BildError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Plan limit reached: {0}")]
    LimitReached(String),

    #[error("Billing error: {0}")]
    Billing(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
