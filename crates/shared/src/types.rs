//! Core domain types for the BildOut platform

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Subscription plan for a merchant organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Free,
    Pro,
    Agency,
}

impl Default for SubscriptionPlan {
    fn default() -> Self {
        Self::Free
    }
}

impl SubscriptionPlan {
    /// Invoices an organization may create per calendar month
    /// Free (10) → Pro (unlimited) → Agency (unlimited)
    pub fn max_invoices_per_month(&self) -> Option<i64> {
        match self {
            Self::Free => Some(10),
            Self::Pro | Self::Agency => None,
        }
    }

    /// Active (non-deleted) clients an organization may keep
    /// Free (5) → Pro (unlimited) → Agency (unlimited)
    pub fn max_active_clients(&self) -> Option<i64> {
        match self {
            Self::Free => Some(5),
            Self::Pro | Self::Agency => None,
        }
    }

    /// Whether this plan requires a paid subscription
    pub fn is_paid(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl std::fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Agency => write!(f, "agency"),
        }
    }
}

impl std::str::FromStr for SubscriptionPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "agency" => Ok(Self::Agency),
            _ => Err(format!("Invalid subscription plan: {}", s)),
        }
    }
}

/// Invoice lifecycle status
///
/// draft → sent → {viewed, partial, paid, overdue} → {paid, void, cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Viewed,
    Partial,
    Paid,
    Overdue,
    Void,
    Cancelled,
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl InvoiceStatus {
    /// Whether an incoming payment may be applied in this status
    /// Paid, void and cancelled are terminal for payment acceptance
    pub fn accepts_payment(&self) -> bool {
        !matches!(self, Self::Paid | Self::Void | Self::Cancelled)
    }

    /// Whether the overdue sweep may reclassify an invoice in this status
    pub fn overdue_eligible(&self) -> bool {
        matches!(self, Self::Sent | Self::Viewed | Self::Partial)
    }

    /// Whether the invoice has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Void | Self::Cancelled)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Sent => write!(f, "sent"),
            Self::Viewed => write!(f, "viewed"),
            Self::Partial => write!(f, "partial"),
            Self::Paid => write!(f, "paid"),
            Self::Overdue => write!(f, "overdue"),
            Self::Void => write!(f, "void"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "viewed" => Ok(Self::Viewed),
            "partial" => Ok(Self::Partial),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            "void" => Ok(Self::Void),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid invoice status: {}", s)),
        }
    }
}

/// Payment record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

// =============================================================================
// Database Rows
// =============================================================================

/// Merchant organization - the tenant root and unit of data isolation
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub address: Option<String>,
    // Branding shown on invoices and the public payment page
    pub logo_url: Option<String>,
    pub accent_color: Option<String>,
    pub invoice_prefix: Option<String>,
    /// Default tax rate in basis points (825 = 8.25%)
    pub default_tax_rate_bps: i32,
    pub stripe_customer_id: Option<String>,
    /// Vendor-billing-derived plan (updated by Stripe webhooks)
    pub subscription_plan: Option<String>,
    /// Admin-set override; when present and unexpired it wins over the vendor plan
    pub subscription_override_plan: Option<String>,
    pub subscription_override_expires_at: Option<OffsetDateTime>,
    pub subscription_override_reason: Option<String>,
    pub subscription_override_granted_by: Option<Uuid>,
    pub subscription_override_granted_at: Option<OffsetDateTime>,
    pub suspended_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// User identity, owned by the hosted auth provider, one per organization
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
    /// Stripe Connect account receiving invoice payments
    pub stripe_account_id: Option<String>,
    pub onboarding_complete: bool,
    pub payouts_enabled: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A merchant's client; soft-deleted so past invoices keep their reference
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Client {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub deleted_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Reusable line-item template
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Item {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub unit_price_cents: i64,
    pub tax_exempt: bool,
    pub deleted_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Invoice row
///
/// `amount_due_cents = total_cents - amount_paid_cents` is maintained at each
/// transition site rather than derived centrally.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub org_id: Uuid,
    pub client_id: Option<Uuid>,
    /// Per-organization sequence, assigned as current max + 1 at creation.
    /// Not backed by a database sequence: concurrent creates can collide.
    pub number: i64,
    pub status: InvoiceStatus,
    pub issue_date: Date,
    pub due_date: Option<Date>,
    pub subtotal_cents: i64,
    pub tax_total_cents: i64,
    pub discount_total_cents: i64,
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub amount_due_cents: i64,
    /// Minimum partial-payment amount; None means any partial amount
    pub deposit_required_cents: Option<i64>,
    /// Per-invoice tax rate override in basis points
    pub tax_rate_bps: Option<i32>,
    /// Bearer capability for the public payment page; generated on first send
    pub payment_link_token: Option<Uuid>,
    pub notes: Option<String>,
    pub deleted_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Line item owned 1:1 by an invoice; the set is replaced wholesale on edit
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub amount_cents: i64,
    pub tax_exempt: bool,
    pub position: i32,
}

/// Append-only audit trail of invoice status transitions
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InvoiceStatusHistory {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub from_status: Option<InvoiceStatus>,
    pub to_status: InvoiceStatus,
    /// "user:<uuid>", "system:overdue-sweep" or "webhook"
    pub actor: String,
    pub notes: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Record of a processor transaction tied to an invoice
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub org_id: Uuid,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub stripe_payment_intent_id: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Append-only record of admin back-office actions
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AdminAuditLog {
    pub id: Uuid,
    pub admin_user_id: Uuid,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // SubscriptionPlan Tests
    // =========================================================================

    #[test]
    fn test_plan_default() {
        assert_eq!(SubscriptionPlan::default(), SubscriptionPlan::Free);
    }

    #[test]
    fn test_plan_invoice_limits() {
        assert_eq!(SubscriptionPlan::Free.max_invoices_per_month(), Some(10));
        assert_eq!(SubscriptionPlan::Pro.max_invoices_per_month(), None);
        assert_eq!(SubscriptionPlan::Agency.max_invoices_per_month(), None);
    }

    #[test]
    fn test_plan_client_limits() {
        assert_eq!(SubscriptionPlan::Free.max_active_clients(), Some(5));
        assert_eq!(SubscriptionPlan::Pro.max_active_clients(), None);
        assert_eq!(SubscriptionPlan::Agency.max_active_clients(), None);
    }

    #[test]
    fn test_plan_parse_roundtrip() {
        for plan in [
            SubscriptionPlan::Free,
            SubscriptionPlan::Pro,
            SubscriptionPlan::Agency,
        ] {
            let parsed: SubscriptionPlan = plan.to_string().parse().unwrap();
            assert_eq!(parsed, plan);
        }
        assert!("enterprise".parse::<SubscriptionPlan>().is_err());
    }

    // =========================================================================
    // InvoiceStatus Tests
    // =========================================================================

    #[test]
    fn test_status_accepts_payment() {
        assert!(InvoiceStatus::Draft.accepts_payment());
        assert!(InvoiceStatus::Sent.accepts_payment());
        assert!(InvoiceStatus::Viewed.accepts_payment());
        assert!(InvoiceStatus::Partial.accepts_payment());
        assert!(InvoiceStatus::Overdue.accepts_payment());
        assert!(!InvoiceStatus::Paid.accepts_payment());
        assert!(!InvoiceStatus::Void.accepts_payment());
        assert!(!InvoiceStatus::Cancelled.accepts_payment());
    }

    #[test]
    fn test_status_overdue_eligible() {
        assert!(InvoiceStatus::Sent.overdue_eligible());
        assert!(InvoiceStatus::Viewed.overdue_eligible());
        assert!(InvoiceStatus::Partial.overdue_eligible());
        assert!(!InvoiceStatus::Draft.overdue_eligible());
        assert!(!InvoiceStatus::Paid.overdue_eligible());
        assert!(!InvoiceStatus::Overdue.overdue_eligible());
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::Viewed,
            InvoiceStatus::Partial,
            InvoiceStatus::Paid,
            InvoiceStatus::Overdue,
            InvoiceStatus::Void,
            InvoiceStatus::Cancelled,
        ] {
            let parsed: InvoiceStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
