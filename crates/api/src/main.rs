//! BildOut API server

use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bildout_api::{routes, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in development; deployed environments set real variables
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(bind_address = %config.bind_address, "Starting BildOut API");

    let pool = bildout_shared::db::create_pool(&config.database_url).await?;

    {
        let migration_pool = bildout_shared::db::create_migration_pool(&config.database_url).await?;
        bildout_shared::db::run_migrations(&migration_pool).await?;
        tracing::info!("Database migrations applied");
    }

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, pool);

    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
