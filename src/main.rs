//! Elidune Circulation Server
//!
//! REST API server for library lending.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    routing::{get, patch, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use elidune_circulation::{
    api,
    config::AppConfig,
    repository::{CirculationStore, Repository},
    services::{
        notifications::{EmailNotifier, LogNotifier, Notifier},
        Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("elidune_circulation={},tower_http=debug", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Elidune Circulation Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let notifier: Arc<dyn Notifier> = if config.email.enabled {
        Arc::new(EmailNotifier::new(config.email.clone()))
    } else {
        tracing::info!("Email disabled, reminders will only be logged");
        Arc::new(LogNotifier)
    };

    let store: Arc<dyn CirculationStore> = Arc::new(Repository::new(pool.clone()));
    let services = Services::new(store, config.circulation.clone(), notifier);

    let sweep_period = config.circulation.sweep_interval_secs;
    let _sweep = (sweep_period > 0)
        .then(|| services.sweep.clone().spawn(Duration::from_secs(sweep_period)));

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
        db: pool,
    };

    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Books
        .route("/books", get(api::books::list_books).post(api::books::create_book))
        .route("/books/:id", get(api::books::get_book).put(api::books::update_book))
        .route("/books/:id/copies", put(api::books::adjust_copies))
        // Borrows
        .route("/borrow", post(api::borrows::checkout))
        .route("/borrow/:id", get(api::borrows::get_borrow))
        .route("/borrow/:id/renew", patch(api::borrows::renew_borrow))
        .route("/borrow/:id/return", patch(api::borrows::return_borrow))
        .route("/borrow/:id/write-off", patch(api::borrows::write_off_borrow))
        .route("/borrow/:id/notes", post(api::borrows::add_note))
        .route("/borrow/:id/download", post(api::borrows::record_download))
        .route("/borrow/:id/reminder", get(api::borrows::pending_reminder))
        .route("/borrow/:id/reminders", post(api::borrows::record_reminder))
        .route("/users/:id/borrows", get(api::borrows::get_user_borrows))
        // Fines
        .route("/borrow/:id/fines", post(api::borrows::issue_fine))
        .route("/borrow/:id/fines/:fine_id/pay", patch(api::borrows::pay_fine))
        .route("/borrow/:id/fines/:fine_id/waive", patch(api::borrows::waive_fine))
        .with_state(state);

    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
}
