//! Plan limit enforcement
//!
//! Read-only checks comparing current-period resource counts against the
//! static plan table. Callers use the result to accept or reject a
//! subsequent create operation; nothing is locked between the check and the
//! insert, so two concurrent creates can both pass and exceed the limit by
//! one. That window is inherited behavior, left as-is on purpose.

use bildout_shared::types::{Organization, SubscriptionPlan};
use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::plan::effective_plan;

/// Result of a limit check
#[derive(Debug, Clone, Serialize)]
pub struct LimitCheck {
    pub allowed: bool,
    /// None means unlimited
    pub limit: Option<i64>,
    pub current: i64,
    pub plan: SubscriptionPlan,
}

/// Decide whether a create is allowed given a limit and the current count.
/// `allowed` is false only when a numeric limit exists and the count has
/// reached it.
pub fn within_limit(limit: Option<i64>, current: i64) -> bool {
    match limit {
        Some(limit) => current < limit,
        None => true,
    }
}

/// First instant of the current calendar month (UTC), the window start for
/// invoice counting
pub fn current_month_start(now: OffsetDateTime) -> OffsetDateTime {
    let first = now.date().replace_day(1).unwrap_or(now.date());
    first.midnight().assume_utc()
}

/// Limit enforcement service
pub struct LimitService {
    pool: PgPool,
}

impl LimitService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check whether the organization may create another invoice this
    /// calendar month
    pub async fn check_invoice_limit(&self, org_id: Uuid) -> BillingResult<LimitCheck> {
        let now = OffsetDateTime::now_utc();
        let org = self.load_org(org_id).await?;
        let plan = effective_plan(&org, now);
        let limit = plan.max_invoices_per_month();

        let (current,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM invoices
            WHERE org_id = $1 AND deleted_at IS NULL AND created_at >= $2
            "#,
        )
        .bind(org_id)
        .bind(current_month_start(now))
        .fetch_one(&self.pool)
        .await?;

        Ok(LimitCheck {
            allowed: within_limit(limit, current),
            limit,
            current,
            plan,
        })
    }

    /// Check whether the organization may create another client
    pub async fn check_client_limit(&self, org_id: Uuid) -> BillingResult<LimitCheck> {
        let now = OffsetDateTime::now_utc();
        let org = self.load_org(org_id).await?;
        let plan = effective_plan(&org, now);
        let limit = plan.max_active_clients();

        let (current,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM clients WHERE org_id = $1 AND deleted_at IS NULL")
                .bind(org_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(LimitCheck {
            allowed: within_limit(limit, current),
            limit,
            current,
            plan,
        })
    }

    async fn load_org(&self, org_id: Uuid) -> BillingResult<Organization> {
        let org: Option<Organization> =
            sqlx::query_as("SELECT * FROM organizations WHERE id = $1")
                .bind(org_id)
                .fetch_optional(&self.pool)
                .await?;

        org.ok_or_else(|| BillingError::NotFound(format!("Organization {} not found", org_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_within_limit_unlimited() {
        assert!(within_limit(None, 0));
        assert!(within_limit(None, 1_000_000));
    }

    #[test]
    fn test_within_limit_at_boundary() {
        assert!(within_limit(Some(10), 9));
        assert!(!within_limit(Some(10), 10));
        assert!(!within_limit(Some(10), 11));
    }

    #[test]
    fn test_within_limit_zero() {
        assert!(!within_limit(Some(0), 0));
    }

    #[test]
    fn test_current_month_start() {
        let now = datetime!(2025-03-17 14:32:05 UTC);
        assert_eq!(current_month_start(now), datetime!(2025-03-01 0:00 UTC));
    }

    #[test]
    fn test_current_month_start_on_first() {
        let now = datetime!(2025-11-01 0:00 UTC);
        assert_eq!(current_month_start(now), datetime!(2025-11-01 0:00 UTC));
    }
}
