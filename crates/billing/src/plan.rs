//! Subscription Plan Resolver
//!
//! Answers the question: "which plan is actually enforced for this org right
//! now?" by merging the vendor-billing-derived plan with an optional
//! time-bounded admin override.
//!
//! ## Design Principles
//!
//! 1. **Single Source of Truth**: `effective_plan()` is THE function that determines the plan
//! 2. **Deterministic**: pure function of the organization row and the clock
//! 3. **No side effects**: expired overrides are cleared by the scheduled
//!    sweep, not here - until that sweep runs the fallback masks the stale
//!    value but the stale value still occupies the row

use bildout_shared::types::{Organization, SubscriptionPlan};
use time::OffsetDateTime;

/// Resolve the effective subscription plan for an organization.
///
/// If an admin override is set and unexpired (or permanent), it wins.
/// An expired override falls back to the vendor plan. With neither set,
/// the organization is on the free plan.
pub fn effective_plan(org: &Organization, now: OffsetDateTime) -> SubscriptionPlan {
    resolve_plan(
        org.subscription_plan.as_deref(),
        org.subscription_override_plan.as_deref(),
        org.subscription_override_expires_at,
        now,
    )
}

/// Field-level resolver for callers that project only the plan columns
pub fn resolve_plan(
    vendor_plan: Option<&str>,
    override_plan: Option<&str>,
    override_expires_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> SubscriptionPlan {
    let vendor_plan = vendor_plan
        .and_then(|p| p.parse().ok())
        .unwrap_or_default();

    let Some(override_plan) = override_plan.and_then(|p| p.parse::<SubscriptionPlan>().ok())
    else {
        return vendor_plan;
    };

    match override_expires_at {
        Some(expires_at) if expires_at <= now => vendor_plan,
        // No expiry means permanent
        _ => override_plan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use uuid::Uuid;

    fn org(
        plan: Option<&str>,
        override_plan: Option<&str>,
        override_expires_at: Option<OffsetDateTime>,
    ) -> Organization {
        let now = OffsetDateTime::now_utc();
        Organization {
            id: Uuid::new_v4(),
            name: "Acme Design Co".to_string(),
            contact_email: None,
            contact_phone: None,
            address: None,
            logo_url: None,
            accent_color: None,
            invoice_prefix: None,
            default_tax_rate_bps: 0,
            stripe_customer_id: None,
            subscription_plan: plan.map(String::from),
            subscription_override_plan: override_plan.map(String::from),
            subscription_override_expires_at: override_expires_at,
            subscription_override_reason: None,
            subscription_override_granted_by: None,
            subscription_override_granted_at: None,
            suspended_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_no_plan_no_override_is_free() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            effective_plan(&org(None, None, None), now),
            SubscriptionPlan::Free
        );
    }

    #[test]
    fn test_vendor_plan_without_override() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            effective_plan(&org(Some("pro"), None, None), now),
            SubscriptionPlan::Pro
        );
    }

    #[test]
    fn test_permanent_override_wins_over_vendor_plan() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            effective_plan(&org(Some("pro"), Some("agency"), None), now),
            SubscriptionPlan::Agency
        );
    }

    #[test]
    fn test_future_override_wins() {
        let now = OffsetDateTime::now_utc();
        let org = org(None, Some("pro"), Some(now + Duration::days(30)));
        assert_eq!(effective_plan(&org, now), SubscriptionPlan::Pro);
    }

    #[test]
    fn test_expired_override_falls_back_to_vendor_plan() {
        let now = OffsetDateTime::now_utc();
        let org = org(Some("pro"), Some("agency"), Some(now - Duration::days(1)));
        assert_eq!(effective_plan(&org, now), SubscriptionPlan::Pro);
    }

    #[test]
    fn test_expired_override_without_vendor_plan_is_free() {
        let now = OffsetDateTime::now_utc();
        let org = org(None, Some("agency"), Some(now - Duration::hours(1)));
        assert_eq!(effective_plan(&org, now), SubscriptionPlan::Free);
    }

    #[test]
    fn test_unparseable_plan_values_default_to_free() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(
            effective_plan(&org(Some("enterprise"), None, None), now),
            SubscriptionPlan::Free
        );
    }
}
