//! Sensor Reading Gateway.
//!
//! `fetch_latest` never fails. It walks the fallback chain
//!
//! 1. fresh cache entry
//! 2. primary store, each path convention in order
//! 3. secondary document store
//! 4. synthesized regional default
//!
//! and caches whatever it ends up with.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;

use crate::cache::TtlCache;
use crate::models::SensorReading;
use crate::regional::RegionalTable;

mod health;
mod parse;
mod store;

pub use health::{assess, HealthGrade, SensorHealth};
pub use parse::{default_parsers, parse_payload, PayloadParser};
pub use store::{primary_paths, HttpSensorStore, PgDocumentStore, SensorStore};

/// Nepal Time, UTC+05:45.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 345;

/// Largest real-world UTC offset, in minutes.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

// ---

/// Part of the local day a synthesized reading is generated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiurnalBucket {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl DiurnalBucket {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            _ => Self::Night,
        }
    }

    /// Offset (°C) applied to the regional mean temperature.
    pub fn temperature_offset(self) -> f64 {
        match self {
            Self::Morning => -1.5,
            Self::Afternoon => 3.0,
            Self::Evening => 0.5,
            Self::Night => -3.5,
        }
    }
}

// ---

pub struct SensorGateway {
    primary: Option<Arc<dyn SensorStore>>,
    secondary: Option<Arc<dyn SensorStore>>,
    parsers: Vec<Box<dyn PayloadParser>>,
    cache: TtlCache<String, SensorReading>,
    regional: Arc<RegionalTable>,
    utc_offset_minutes: i32,
}

impl SensorGateway {
    /// Gateway with no upstream stores; every read synthesizes a default
    /// until stores are attached.
    pub fn new(regional: Arc<RegionalTable>, cache_ttl: Duration) -> Self {
        // ---
        Self {
            primary: None,
            secondary: None,
            parsers: default_parsers(),
            cache: TtlCache::new(cache_ttl),
            regional,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
        }
    }

    pub fn with_primary(mut self, store: Arc<dyn SensorStore>) -> Self {
        self.primary = Some(store);
        self
    }

    pub fn with_secondary(mut self, store: Arc<dyn SensorStore>) -> Self {
        self.secondary = Some(store);
        self
    }

    /// Local time zone used to pick the diurnal bucket.
    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes.clamp(-MAX_UTC_OFFSET_MINUTES, MAX_UTC_OFFSET_MINUTES);
        self
    }

    /// Latest reading for `sensor_id`. Never fails; see module docs.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn fetch_latest(&self, sensor_id: &str, region: &str, use_cache: bool) -> SensorReading {
        // ---
        if use_cache {
            if let Some(reading) = self.cache.get(&sensor_id.to_string()) {
                tracing::debug!("Cache hit for sensor {}", sensor_id);
                return reading;
            }
            tracing::debug!("Cache miss for sensor {}", sensor_id);
        }

        let now = Utc::now();
        let reading = match self.read_upstream(sensor_id, region, now).await {
            Some(reading) => reading,
            None => {
                tracing::warn!(
                    "No usable payload for sensor {}, synthesizing default for region {}",
                    sensor_id,
                    region
                );
                self.synthesize_default(sensor_id, region, now)
            }
        };

        self.cache.put(sensor_id.to_string(), reading.clone());
        reading
    }

    /// Advisory health report for `sensor_id`, using the cache.
    pub async fn health_status(&self, sensor_id: &str, region: &str) -> SensorHealth {
        // ---
        let reading = self.fetch_latest(sensor_id, region, true).await;
        assess(&reading, Utc::now())
    }

    /// Deterministic stand-in reading: regional pH and humidity baselines,
    /// regional temperature shifted by the local time-of-day bucket.
    pub fn synthesize_default(&self, sensor_id: &str, region: &str, now: DateTime<Utc>) -> SensorReading {
        // ---
        let defaults = self.regional.lookup(region);
        let local = now + chrono::Duration::minutes(self.utc_offset_minutes.into());
        let bucket = DiurnalBucket::from_hour(local.hour());
        tracing::debug!(
            "Synthesized reading for {} uses {:?} bucket at {}",
            sensor_id,
            bucket,
            defaults.region
        );

        SensorReading::synthesized(
            sensor_id,
            &defaults.region,
            defaults.ph,
            defaults.temperature + bucket.temperature_offset(),
            defaults.humidity,
            now,
        )
    }

    async fn read_upstream(&self, sensor_id: &str, region: &str, now: DateTime<Utc>) -> Option<SensorReading> {
        // ---
        if let Some(primary) = &self.primary {
            for path in primary_paths(sensor_id) {
                if let Some(reading) = self.try_store(primary.as_ref(), &path, sensor_id, region, now).await {
                    return Some(reading);
                }
            }
        }

        if let Some(secondary) = &self.secondary {
            if let Some(reading) = self.try_store(secondary.as_ref(), sensor_id, sensor_id, region, now).await {
                return Some(reading);
            }
        }

        None
    }

    async fn try_store(
        &self,
        store: &dyn SensorStore,
        key: &str,
        sensor_id: &str,
        region: &str,
        now: DateTime<Utc>,
    ) -> Option<SensorReading> {
        // ---
        let payload = match store.fetch(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tracing::debug!("{} store has nothing at '{}'", store.name(), key);
                return None;
            }
            Err(e) => {
                tracing::warn!("{} store read of '{}' failed: {}", store.name(), key, e);
                return None;
            }
        };

        match parse_payload(&self.parsers, &payload) {
            Some((parser, raw)) => {
                tracing::debug!("Parsed '{}' from {} store with {}", key, store.name(), parser);
                Some(raw.to_reading(sensor_id, region, now))
            }
            None => {
                tracing::debug!("Unrecognised payload at '{}': {}", key, payload);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::ReadingStatus;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store that counts reads.
    struct MapStore {
        payloads: HashMap<String, Value>,
        reads: AtomicUsize,
    }

    impl MapStore {
        fn new(entries: &[(&str, Value)]) -> Arc<Self> {
            Arc::new(Self {
                payloads: entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                reads: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SensorStore for MapStore {
        fn name(&self) -> &'static str {
            "map"
        }

        async fn fetch(&self, key: &str) -> Result<Option<Value>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.payloads.get(key).cloned())
        }
    }

    struct DownStore;

    #[async_trait]
    impl SensorStore for DownStore {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn fetch(&self, _key: &str) -> Result<Option<Value>> {
            Err(anyhow!("connection refused"))
        }
    }

    fn gateway() -> SensorGateway {
        SensorGateway::new(Arc::new(RegionalTable::builtin()), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_first_matching_path_wins() {
        // ---
        let store = MapStore::new(&[
            ("sensors/s-1", json!({"ph": 5.0, "temperature": 10.0})),
            ("sensors/s-1/readings/latest", json!({"ph": 6.2, "temperature": 22.0})),
        ]);
        let gw = gateway().with_primary(store.clone());

        let reading = gw.fetch_latest("s-1", "Chitwan", false).await;
        assert_eq!(reading.ph(), 6.2);
        assert_eq!(reading.status(), ReadingStatus::Active);
        // latest (miss) then readings/latest (hit)
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unparseable_primary_falls_to_secondary() {
        // ---
        let primary = MapStore::new(&[("sensors/s-1/latest", json!({"battery": 88}))]);
        let secondary = MapStore::new(&[("s-1", json!("7.1,28.4"))]);
        let gw = gateway().with_primary(primary).with_secondary(secondary);

        let reading = gw.fetch_latest("s-1", "Chitwan", false).await;
        assert_eq!(reading.ph(), 7.1);
        assert_eq!(reading.temperature(), 28.4);
    }

    #[tokio::test]
    async fn test_total_failure_synthesizes_default() {
        // ---
        let gw = gateway()
            .with_primary(Arc::new(DownStore))
            .with_secondary(Arc::new(DownStore));

        let reading = gw.fetch_latest("s-1", "Bhairahawa-Butwal", false).await;
        assert_eq!(reading.status(), ReadingStatus::Default);
        assert_eq!(reading.ph(), 6.8);
        assert_eq!(reading.region(), "Bhairahawa-Butwal");
    }

    #[tokio::test]
    async fn test_out_of_range_payload_is_clamped() {
        // ---
        let store = MapStore::new(&[("sensors/s-9/latest", json!({"ph": 15.5, "temperature": -120}))]);
        let gw = gateway().with_primary(store);

        let reading = gw.fetch_latest("s-9", "Chitwan", false).await;
        assert_eq!(reading.ph(), 14.0);
        assert_eq!(reading.temperature(), -50.0);
    }

    #[tokio::test]
    async fn test_cached_reading_is_reused() {
        // ---
        let store = MapStore::new(&[("sensors/s-1/latest", json!({"ph": 6.0, "temperature": 20.0}))]);
        let gw = gateway().with_primary(store.clone());

        let first = gw.fetch_latest("s-1", "Chitwan", true).await;
        let second = gw.fetch_latest("s-1", "Chitwan", true).await;
        assert_eq!(first, second);
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);

        // Bypassing the cache goes upstream again
        gw.fetch_latest("s-1", "Chitwan", false).await;
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_synthesized_default_is_cached_too() {
        // ---
        let gw = gateway();
        let first = gw.fetch_latest("s-2", "Pokhara", true).await;
        let second = gw.fetch_latest("s-2", "Pokhara", true).await;
        assert_eq!(first, second);
    }

    #[test]
    fn test_diurnal_buckets() {
        // ---
        assert_eq!(DiurnalBucket::from_hour(6), DiurnalBucket::Morning);
        assert_eq!(DiurnalBucket::from_hour(13), DiurnalBucket::Afternoon);
        assert_eq!(DiurnalBucket::from_hour(20), DiurnalBucket::Evening);
        assert_eq!(DiurnalBucket::from_hour(2), DiurnalBucket::Night);
        assert_eq!(DiurnalBucket::from_hour(23), DiurnalBucket::Night);
    }

    #[test]
    fn test_synthesized_default_follows_local_hour() {
        // ---
        let gw = gateway().with_utc_offset_minutes(0);
        let regional = RegionalTable::builtin();
        let base = regional.lookup("Chitwan");

        let afternoon = Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap();
        let r = gw.synthesize_default("s", "Chitwan", afternoon);
        assert_eq!(r.temperature(), base.temperature + 3.0);
        assert_eq!(r.ph(), base.ph);

        let night = Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap();
        let r = gw.synthesize_default("s", "Chitwan", night);
        assert_eq!(r.temperature(), base.temperature - 3.5);

        // Same instant, same answer
        assert_eq!(gw.synthesize_default("s", "Chitwan", night), r);
    }

    #[test]
    fn test_default_offset_is_nepal_time() {
        // ---
        // 08:30 UTC is 14:15 in Kathmandu
        let gw = gateway();
        let base = RegionalTable::builtin().lookup("Chitwan").temperature;
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
        assert_eq!(gw.synthesize_default("s", "Chitwan", t).temperature(), base + 3.0);
    }
}
