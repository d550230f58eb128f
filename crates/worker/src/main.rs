//! BildOut background worker
//!
//! Runs the scheduled sweeps in-process. Deployments that prefer an external
//! scheduler can hit the `/api/cron/*` endpoints instead; both paths drive
//! the same sweep functions.

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bildout_billing::email::InvoiceEmailService;
use bildout_billing::sweeps;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = bildout_shared::db::create_pool(&database_url).await?;
    let email = InvoiceEmailService::from_env();

    tracing::info!("Starting BildOut worker");

    let scheduler = JobScheduler::new().await?;

    // Overdue sweep: daily at 06:00 UTC, after most due dates have rolled over
    {
        let pool = pool.clone();
        let email = email.clone();
        scheduler
            .add(Job::new_async("0 0 6 * * *", move |_uuid, _lock| {
                let pool = pool.clone();
                let email = email.clone();
                Box::pin(async move {
                    let outcome = sweeps::run_overdue_sweep(&pool, &email).await;
                    if !outcome.errors.is_empty() {
                        tracing::warn!(
                            processed = outcome.processed,
                            errors = outcome.errors.len(),
                            "Overdue sweep finished with errors"
                        );
                    }
                })
            })?)
            .await?;
    }

    // Override expiry sweep: hourly
    {
        let pool = pool.clone();
        scheduler
            .add(Job::new_async("0 15 * * * *", move |_uuid, _lock| {
                let pool = pool.clone();
                Box::pin(async move {
                    let outcome = sweeps::run_override_expiry_sweep(&pool).await;
                    if outcome.processed > 0 {
                        tracing::info!(
                            processed = outcome.processed,
                            "Expired subscription overrides cleared"
                        );
                    }
                })
            })?)
            .await?;
    }

    scheduler.start().await?;

    tracing::info!("Worker scheduler started");

    // Keep the process alive; the scheduler runs on background tasks
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down worker");

    Ok(())
}
