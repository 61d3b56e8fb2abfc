//! Application entry point for the `cropwise-advisor` service.
//!
//! This binary orchestrates the full startup sequence for the crop
//! recommendation API, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Loading the regional defaults table and classifier artifacts
//! - Wiring the sensor store, document store and weather clients into the
//!   recommendation engine
//! - Creating the document store schema if a database is configured
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving until Ctrl-C
//!
//! # Environment Variables
//! See [`cropwise_advisor::config::load_from_env`] for the full list. Logging
//! is controlled separately:
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//! - `FORCE_COLOR` (optional) – override TTY color detection
//!
//! This module follows the Explicit Module Boundary Pattern (EMBP) by
//! delegating schema setup to `schema`, configuration parsing to `config`,
//! and route registration to `routes`.
use std::env;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use cropwise_advisor::config::{self, Config};
use cropwise_advisor::engine::RecommendationEngine;
use cropwise_advisor::ensemble::{load_models, Aggregator, EnsembleRunner};
use cropwise_advisor::regional::RegionalTable;
use cropwise_advisor::sensor::{HttpSensorStore, PgDocumentStore, SensorGateway};
use cropwise_advisor::weather::{OpenMeteoClient, WeatherGateway, WeatherService};
use cropwise_advisor::{routes, schema};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let engine = Arc::new(build_engine(&cfg).await?);
    tracing::info!(
        "Engine ready with {} model(s): {:?}",
        engine.model_ids().len(),
        engine.model_ids()
    );

    let shutdown = CancellationToken::new();

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(engine, shutdown.clone());

    tracing::info!("Listening on {}", cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

// ---

/// Assemble the engine from configuration. Unset upstreams are left out of
/// the fallback chain rather than treated as errors.
async fn build_engine(cfg: &Config) -> Result<RecommendationEngine> {
    // ---
    let regional = Arc::new(match &cfg.regional_defaults_path {
        Some(path) => RegionalTable::from_file(path)?,
        None => RegionalTable::builtin(),
    });
    tracing::info!("Regional defaults: {} region(s)", regional.regions().len());

    let mut sensors = SensorGateway::new(Arc::clone(&regional), cfg.sensor_cache_ttl)
        .with_utc_offset_minutes(cfg.utc_offset_minutes);

    if let Some(url) = &cfg.sensor_store_url {
        sensors = sensors.with_primary(Arc::new(HttpSensorStore::new(url, cfg.upstream_timeout)?));
    }

    if let Some(db_url) = &cfg.db_url {
        // Lazy: an unreachable database must not block startup
        let pool = PgPoolOptions::new()
            .max_connections(cfg.db_pool_max)
            .acquire_timeout(cfg.upstream_timeout)
            .connect_lazy(db_url)
            .map_err(|e| anyhow::anyhow!("Invalid DATABASE_URL: {}", e))?;

        match schema::create_schema(&pool).await {
            Ok(()) => tracing::info!("Document store schema ready"),
            Err(e) => tracing::warn!("Document store unavailable at startup: {}", e),
        }
        sensors = sensors.with_secondary(Arc::new(PgDocumentStore::new(pool, cfg.upstream_timeout)));
    }

    let weather_service: Option<Arc<dyn WeatherService>> = if cfg.weather_enabled {
        Some(Arc::new(OpenMeteoClient::new(&cfg.weather_api_url, cfg.upstream_timeout)?))
    } else {
        None
    };
    let weather = WeatherGateway::new(weather_service, Arc::clone(&regional));

    let models = load_models(&cfg.model_dir);
    if models.is_empty() {
        tracing::warn!(
            "No classifier artifacts loaded from {}; rule-based fallback only",
            cfg.model_dir.display()
        );
    }
    let runner = EnsembleRunner::new(models).with_default_confidence(cfg.default_confidence);

    Ok(RecommendationEngine::new(
        Arc::new(sensors),
        Arc::new(weather),
        regional,
        runner,
        Aggregator::new(cfg.aggregator_config()),
    ))
}

/// Resolve on Ctrl-C, cancelling `token` so in-flight requests stop.
async fn shutdown_signal(token: CancellationToken) {
    // ---
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown requested");
    token.cancel();
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `AXUM_LOG_LEVEL` env var
///
/// Upstream HTTP and SQL chatter is held at `warn` so the fallback chain
/// stays readable at `debug`.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AXUM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper_util=warn,reqwest=warn"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
