//! Admin audit logging
//!
//! Append-only trail of back-office actions. Writing the trail never fails
//! the action it describes; failures are logged and swallowed.

use sqlx::PgPool;
use uuid::Uuid;

/// Admin action identifiers recorded in the audit log
pub mod admin_action {
    pub const MERCHANT_SUSPENDED: &str = "merchant.suspended";
    pub const MERCHANT_RESUMED: &str = "merchant.resumed";
    pub const MERCHANT_SYNCED: &str = "merchant.synced";
    pub const LOGIN_LINK_CREATED: &str = "merchant.login_link_created";
    pub const REMINDER_SENT: &str = "merchant.reminder_sent";
    pub const OVERRIDE_SET: &str = "subscription.override_set";
    pub const OVERRIDE_CLEARED: &str = "subscription.override_cleared";
}

/// Target type identifiers for audit entries
pub mod target_type {
    pub const ORGANIZATION: &str = "organization";
    pub const USER: &str = "user";
    pub const INVOICE: &str = "invoice";
}

/// Record an admin action in the audit trail
pub async fn log_admin_action(
    pool: &PgPool,
    admin_user_id: Uuid,
    action: &str,
    target_type: &str,
    target_id: Option<&str>,
    metadata: serde_json::Value,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO admin_audit_log (admin_user_id, action, target_type, target_id, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(admin_user_id)
    .bind(action)
    .bind(target_type)
    .bind(target_id)
    .bind(metadata)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::error!(
            admin_user_id = %admin_user_id,
            action = %action,
            error = %e,
            "Failed to write admin audit log entry"
        );
    }
}
