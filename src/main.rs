//! ClubCourt Backend Server
//!
//! Court reservations, club settings and the member credit ledger over HTTP.

use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use clubcourt_api::AppState;
use clubcourt_cache::CacheBackend;
use clubcourt_core::AppConfig;
use clubcourt_db::{create_pool, run_migrations};
use std::env;
use std::io;
use std::time::Duration;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "clubcourt",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Configure API routes
fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            // Settings, reservations and ledger endpoints
            .configure(clubcourt_api::configure),
    );
}

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "clubcourt={0},clubcourt_api={0},clubcourt_services={0},clubcourt_db={0},clubcourt_cache={0},actix_web=info,sqlx=warn",
            log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting ClubCourt v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().map_err(|e| startup_error("Invalid configuration", e))?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .map_err(|e| startup_error("Failed to create database pool", e))?;

    if config.database.run_migrations {
        run_migrations(&pool)
            .await
            .map_err(|e| startup_error("Failed to run migrations", e))?;
    }

    let cache = CacheBackend::connect(config.redis.url.as_deref())
        .await
        .map_err(|e| startup_error("Failed to connect to cache", e))?;
    info!(backend = cache.name(), "Settings cache ready");

    let state = AppState::new(pool, cache, &config);

    let bind_addr = config.server_addr();
    let workers = config.server.workers;
    let timeout = Duration::from_secs(config.server.timeout_secs);
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, workers
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_query",
                        "message": error_message
                    })),
                )
                .into()
            }))
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_body",
                        "message": error_message
                    })),
                )
                .into()
            }))
            // Middleware
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_routes)
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .client_request_timeout(timeout)
    .bind(&bind_addr)?
    .run()
    .await
}
