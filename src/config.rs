//! Configuration loader for the `cropwise-advisor` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Every variable is optional: an unset upstream
//! simply means that link of the fallback chain is skipped, and the engine
//! still answers from regional defaults.
//!
//! Tuning values for the ensemble (agreement boost, top-K, default
//! confidence, risk cap) are loaded here as well so they can be adjusted per
//! deployment without a rebuild.
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::ensemble::{AggregatorConfig, RiskThresholds};

/// Parse an optional environment variable into `$ty`, falling back to `$default`.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable; empty counts as unset.
macro_rules! optional_env {
    ($var_name:expr) => {
        env::var($var_name).ok().filter(|v| !v.trim().is_empty())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Base URL of the primary time-series sensor store.
    pub sensor_store_url: Option<String>,

    /// PostgreSQL connection string for the secondary document store.
    pub db_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    pub weather_api_url: String,
    pub weather_enabled: bool,

    /// Bound applied to every external call.
    pub upstream_timeout: Duration,

    pub sensor_cache_ttl: Duration,

    /// Directory holding `*.json` classifier artifacts.
    pub model_dir: PathBuf,

    /// Replacement regional defaults table.
    pub regional_defaults_path: Option<PathBuf>,

    /// Offset of local time from UTC, used for diurnal temperature buckets.
    pub utc_offset_minutes: i32,

    pub agreement_boost: f64,
    pub top_k: usize,
    pub default_confidence: f64,
    pub max_general_risks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            sensor_store_url: None,
            db_url: None,
            db_pool_max: 5,
            weather_api_url: "https://api.open-meteo.com".to_string(),
            weather_enabled: true,
            upstream_timeout: Duration::from_secs(10),
            sensor_cache_ttl: crate::cache::DEFAULT_TTL,
            model_dir: PathBuf::from("models"),
            regional_defaults_path: None,
            utc_offset_minutes: crate::sensor::DEFAULT_UTC_OFFSET_MINUTES,
            agreement_boost: crate::ensemble::aggregator::DEFAULT_AGREEMENT_BOOST,
            top_k: crate::ensemble::aggregator::DEFAULT_TOP_K,
            default_confidence: crate::ensemble::runner::DEFAULT_CONFIDENCE,
            max_general_risks: RiskThresholds::default().max_general,
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `LISTEN_ADDR` – bind address (default: `0.0.0.0:8080`)
/// - `SENSOR_STORE_URL` – primary sensor store base URL
/// - `DATABASE_URL` – PostgreSQL connection string for the document store
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `WEATHER_API_URL` – weather API base URL (default: Open-Meteo)
/// - `WEATHER_ENABLED` – set to `false` to skip weather lookups
/// - `UPSTREAM_TIMEOUT_SECS` – per-call upstream timeout (default: 10)
/// - `SENSOR_CACHE_TTL_SECS` – sensor reading cache TTL (default: 30)
/// - `MODEL_DIR` – classifier artifact directory (default: `models`)
/// - `REGIONAL_DEFAULTS_PATH` – JSON file replacing the built-in regions
/// - `LOCAL_UTC_OFFSET_MINUTES` – local time offset (default: 345)
/// - `ENSEMBLE_AGREEMENT_BOOST`, `ENSEMBLE_TOP_K`,
///   `ENSEMBLE_DEFAULT_CONFIDENCE`, `MAX_GENERAL_RISKS` – ensemble tuning
///
/// Returns an error if any variable is set but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let defaults = Config::default();

    let listen_addr = parse_env!("LISTEN_ADDR", SocketAddr, defaults.listen_addr);
    let sensor_store_url = optional_env!("SENSOR_STORE_URL");
    let db_url = optional_env!("DATABASE_URL");
    let db_pool_max = parse_env!("DB_POOL_MAX", u32, defaults.db_pool_max);
    let weather_api_url = optional_env!("WEATHER_API_URL").unwrap_or(defaults.weather_api_url);
    let weather_enabled = parse_env!("WEATHER_ENABLED", bool, defaults.weather_enabled);
    let upstream_timeout_secs = parse_env!("UPSTREAM_TIMEOUT_SECS", u64, defaults.upstream_timeout.as_secs());
    let cache_ttl_secs = parse_env!("SENSOR_CACHE_TTL_SECS", u64, defaults.sensor_cache_ttl.as_secs());
    let model_dir = optional_env!("MODEL_DIR").map(PathBuf::from).unwrap_or(defaults.model_dir);
    let regional_defaults_path = optional_env!("REGIONAL_DEFAULTS_PATH").map(PathBuf::from);
    let utc_offset_minutes = parse_env!("LOCAL_UTC_OFFSET_MINUTES", i32, defaults.utc_offset_minutes);
    let agreement_boost = parse_env!("ENSEMBLE_AGREEMENT_BOOST", f64, defaults.agreement_boost);
    let top_k = parse_env!("ENSEMBLE_TOP_K", usize, defaults.top_k);
    let default_confidence = parse_env!("ENSEMBLE_DEFAULT_CONFIDENCE", f64, defaults.default_confidence);
    let max_general_risks = parse_env!("MAX_GENERAL_RISKS", usize, defaults.max_general_risks);

    if upstream_timeout_secs == 0 {
        return Err(anyhow!("UPSTREAM_TIMEOUT_SECS must be at least 1"));
    }
    if top_k == 0 {
        return Err(anyhow!("ENSEMBLE_TOP_K must be at least 1"));
    }
    if !agreement_boost.is_finite() || agreement_boost < 1.0 {
        return Err(anyhow!("ENSEMBLE_AGREEMENT_BOOST must be a number >= 1.0"));
    }
    if !(0.0..=1.0).contains(&default_confidence) {
        return Err(anyhow!("ENSEMBLE_DEFAULT_CONFIDENCE must be within [0, 1]"));
    }

    Ok(Config {
        listen_addr,
        sensor_store_url,
        db_url,
        db_pool_max,
        weather_api_url,
        weather_enabled,
        upstream_timeout: Duration::from_secs(upstream_timeout_secs),
        sensor_cache_ttl: Duration::from_secs(cache_ttl_secs),
        model_dir,
        regional_defaults_path,
        utc_offset_minutes,
        agreement_boost,
        top_k,
        default_confidence,
        max_general_risks,
    })
}

/// Replace the password in a connection string with `****`.
fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            // A colon before "//" is the scheme, not a password separator
            if !db_url[colon_pos..].starts_with("://") {
                return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
            }
        }
    }
    db_url.to_string()
}

impl Config {
    /// Aggregator settings derived from the ensemble tuning values.
    pub fn aggregator_config(&self) -> AggregatorConfig {
        // ---
        AggregatorConfig {
            agreement_boost: self.agreement_boost,
            top_k: self.top_k,
            risk: RiskThresholds {
                max_general: self.max_general_risks,
                ..Default::default()
            },
        }
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the database password while showing all configuration values
    /// that were loaded.
    pub fn log_config(&self) {
        // ---
        let unset = || "(unset)".to_string();
        let masked_db_url = self.db_url.as_deref().map(mask_db_url).unwrap_or_else(unset);
        let regional = self
            .regional_defaults_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-in)".to_string());

        tracing::info!("Configuration loaded:");
        tracing::info!("  LISTEN_ADDR                 : {}", self.listen_addr);
        tracing::info!(
            "  SENSOR_STORE_URL            : {}",
            self.sensor_store_url.clone().unwrap_or_else(unset)
        );
        tracing::info!("  DATABASE_URL                : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX                 : {}", self.db_pool_max);
        tracing::info!("  WEATHER_API_URL             : {}", self.weather_api_url);
        tracing::info!("  WEATHER_ENABLED             : {}", self.weather_enabled);
        tracing::info!("  UPSTREAM_TIMEOUT_SECS       : {}", self.upstream_timeout.as_secs());
        tracing::info!("  SENSOR_CACHE_TTL_SECS       : {}", self.sensor_cache_ttl.as_secs());
        tracing::info!("  MODEL_DIR                   : {}", self.model_dir.display());
        tracing::info!("  REGIONAL_DEFAULTS_PATH      : {}", regional);
        tracing::info!("  LOCAL_UTC_OFFSET_MINUTES    : {}", self.utc_offset_minutes);
        tracing::info!("  ENSEMBLE_AGREEMENT_BOOST    : {}", self.agreement_boost);
        tracing::info!("  ENSEMBLE_TOP_K              : {}", self.top_k);
        tracing::info!("  ENSEMBLE_DEFAULT_CONFIDENCE : {}", self.default_confidence);
        tracing::info!("  MAX_GENERAL_RISKS           : {}", self.max_general_risks);
    }
}
