//! Scheduled endpoints
//!
//! Serverless-style triggers for the sweeps, gated by a bearer match on
//! `CRON_SECRET`. The worker binary runs the same sweeps on a schedule;
//! these endpoints exist for external schedulers and manual runs.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};

use bildout_billing::sweeps::{self, SweepOutcome};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

fn require_cron_secret(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == state.config.cron_secret => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

/// Flip past-due invoices to overdue and send reminders
pub async fn overdue(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SweepOutcome>> {
    require_cron_secret(&state, &headers)?;

    let outcome = sweeps::run_overdue_sweep(&state.pool, &state.email).await;

    Ok(Json(outcome))
}

/// Clear expired subscription overrides
pub async fn expire_overrides(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SweepOutcome>> {
    require_cron_secret(&state, &headers)?;

    let outcome = sweeps::run_override_expiry_sweep(&state.pool).await;

    Ok(Json(outcome))
}
