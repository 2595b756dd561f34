//! services/api/src/bin/api.rs

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use presensi_api::{
    adapters::{DbAdapter, SystemClock},
    config::Config,
    error::ApiError,
    web::{
        self,
        rest::ApiDoc,
        state::{AppState, IDLE_SESSION_TTL},
    },
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");
    match config.office {
        Some(office) => info!(
            lat = office.lat,
            lng = office.lng,
            radius = config.office_radius_meters,
            enforced = config.enforce_geofence,
            "Office geofence configured"
        ),
        None => info!("No office location configured; punches are not distance-checked"),
    }

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        db_adapter.clone(),
        db_adapter,
        Arc::new(SystemClock),
        config.clone(),
    ));

    // Idle users' state machines are swept in the background.
    let sweeper_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(IDLE_SESSION_TTL / 6);
        loop {
            interval.tick().await;
            sweeper_state.prune_idle(IDLE_SESSION_TTL).await;
        }
    });

    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| {
            ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
        })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
