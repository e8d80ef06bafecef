// Allow dead code and unused imports for work-in-progress features
#![allow(dead_code)]
#![allow(unused_imports)]

use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod handlers;
mod models;
mod services;

pub use config::Config;
pub use error::AppError;
// Re-export specific items to avoid ambiguous glob re-exports
pub use models::{
    AgentProfile, AgentStatus, CreateDeliveryRequest, CreateDeliveryResponse, DeliveryAgent,
    DeliveryIssue, DeliverySettings, DeliveryStatus, FeeMethod, IssueType, StatusFilter,
    TrackingPoint, VehicleType,
};
pub use services::{
    AgentService, CoverageService, DeliveryService, IssueService, RateLimiterService,
    RatingService, SettingsService, StatsJob, StatsJobConfig, StatsService, TrackingService,
};

/// Application state shared across handlers
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Config,
    pub rate_limiter: RateLimiterService,
}

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "courier"
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    info!("Starting courier server on {}:{}", config.host, config.port);

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to create database pool");

    info!("Database connection pool established");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");

    info!("Database migrations completed");

    // Initialize rate limiter with default configuration
    let rate_limiter = RateLimiterService::default();
    info!("Rate limiter initialized with default configuration");

    // Start the agent stats refresh background job
    let stats_job = StatsJob::new(
        db_pool.clone(),
        StatsJobConfig {
            interval: Duration::from_secs(config.stats_refresh_interval_secs),
            enabled: true,
        },
    );
    let _stats_shutdown = stats_job.start();
    info!("Stats refresh job started");

    let app_state = web::Data::new(AppState {
        db: db_pool.clone(),
        config: config.clone(),
        rate_limiter,
    });

    let server_addr = format!("{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            // Storefront clients link with and without trailing slashes
            .wrap(middleware::NormalizePath::trim())
            .route("/health", web::get().to(health_check))
            // The module answers under both prefixes while clients migrate
            // from the legacy mount; the trees must stay identical.
            .service(web::scope("/delivery").configure(handlers::configure_all_routes))
            .service(web::scope("/delivery-new").configure(handlers::configure_all_routes))
    })
    .bind(&server_addr)?
    .run()
    .await
}
