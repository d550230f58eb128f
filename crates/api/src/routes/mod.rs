//! API routes

pub mod admin;
pub mod billing;
pub mod clients;
pub mod cron;
pub mod health;
pub mod invoices;
pub mod items;
pub mod organizations;
pub mod payments;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::{auth::require_auth, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public payment page routes - the token is the only capability check
    let pay_routes = Router::new()
        .route("/pay/:token", get(payments::get_public_invoice))
        .route("/pay/:token/intent", post(payments::create_payment_intent));

    // Public API routes (no auth required) - under /api/v1
    let public_api_routes = Router::new()
        // Stripe webhook (signature-verified)
        .route("/payments/webhook", post(payments::webhook))
        // Scheduled endpoints (gated by CRON_SECRET bearer match)
        .route("/cron/overdue", post(cron::overdue))
        .route("/cron/expire-overrides", post(cron::expire_overrides));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        // Organization settings
        .route("/org", get(organizations::get_org))
        .route("/org", patch(organizations::update_org))
        .route("/org/subscription", get(billing::get_subscription))
        // Clients
        .route("/clients", get(clients::list_clients))
        .route("/clients", post(clients::create_client))
        .route("/clients/:client_id", get(clients::get_client))
        .route("/clients/:client_id", patch(clients::update_client))
        .route("/clients/:client_id", delete(clients::delete_client))
        // Items
        .route("/items", get(items::list_items))
        .route("/items", post(items::create_item))
        .route("/items/:item_id", get(items::get_item))
        .route("/items/:item_id", patch(items::update_item))
        .route("/items/:item_id", delete(items::delete_item))
        // Invoices (export before :invoice_id so the path doesn't shadow it)
        .route("/invoices", get(invoices::list_invoices))
        .route("/invoices", post(invoices::create_invoice))
        .route("/invoices/export", get(invoices::export_csv))
        .route("/invoices/:invoice_id", get(invoices::get_invoice))
        .route("/invoices/:invoice_id", patch(invoices::update_invoice))
        .route("/invoices/:invoice_id", delete(invoices::delete_invoice))
        .route("/invoices/:invoice_id/duplicate", post(invoices::duplicate_invoice))
        .route("/invoices/:invoice_id/send", post(invoices::send_invoice))
        .route("/invoices/:invoice_id/mark-paid", post(invoices::mark_paid))
        .route("/invoices/:invoice_id/status", patch(invoices::update_status))
        .route("/invoices/:invoice_id/history", get(invoices::get_history))
        // Billing (merchant's own subscription + Connect onboarding)
        .route("/billing/checkout", post(billing::create_checkout))
        .route("/billing/portal", post(billing::create_portal_session))
        .route("/billing/connect/onboard", post(billing::connect_onboard))
        .route("/billing/connect/status", get(billing::connect_status))
        // Platform admin routes (role check inside handlers)
        .route("/admin/merchants", get(admin::list_merchants))
        .route("/admin/merchants/:org_id", get(admin::get_merchant))
        .route("/admin/merchants/:org_id/suspend", post(admin::suspend_merchant))
        .route("/admin/merchants/:org_id/resume", post(admin::resume_merchant))
        .route("/admin/merchants/:org_id/sync", post(admin::sync_merchant))
        .route("/admin/merchants/:org_id/login-link", post(admin::create_login_link))
        .route("/admin/merchants/:org_id/send-reminder", post(admin::send_reminder))
        .route("/admin/merchants/:org_id/subscription-override", put(admin::set_subscription_override))
        .route("/admin/merchants/:org_id/subscription-override", delete(admin::clear_subscription_override))
        .route("/admin/audit-log", get(admin::list_audit_log))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    // Combine API routes under /api/v1 prefix
    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    Router::new()
        .merge(health_routes)
        .merge(pay_routes)
        .nest("/api/v1", api_v1_routes)
        // Request payloads are small JSON bodies; cap them well below the
        // framework default
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}
