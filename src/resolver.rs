//! Environmental Data Resolver.
//!
//! Builds the complete feature vector for a request. Priority per field,
//! highest first:
//!
//! | fields               | sources                                   |
//! |----------------------|-------------------------------------------|
//! | N, P, K              | user, regional default                    |
//! | pH, temperature      | user, sensor, regional default            |
//! | rainfall, humidity   | user, weather (seasonal), regional default|
//!
//! A synthesized sensor reading or a weather default is not live data, so
//! those fields fall through to the regional default instead.

use std::sync::Arc;

use serde::Serialize;

use crate::models::{
    clamp_to, PredictionInput, Provenance, ReadingStatus, ResolvedValue, SensorReading, UserInput,
    HUMIDITY_RANGE, NUTRIENT_RANGE, PH_RANGE, RAINFALL_RANGE, TEMPERATURE_RANGE,
};
use crate::regional::RegionalTable;
use crate::sensor::SensorGateway;
use crate::weather::{Season, WeatherGateway, WeatherReading, WeatherSource};

/// Feature vector plus what the resolver saw along the way.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub input: PredictionInput,
    /// Canonical name of the region whose defaults were used.
    pub region: String,
    /// Status of the sensor reading, when the sensor was consulted.
    pub sensor_status: Option<ReadingStatus>,
    /// Source of the weather pair, when the weather service was consulted.
    pub weather_source: Option<WeatherSource>,
}

pub struct Resolver {
    sensors: Arc<SensorGateway>,
    weather: Arc<WeatherGateway>,
    regional: Arc<RegionalTable>,
}

/// A present user value wins, clamped into its valid range.
fn from_user(value: Option<f64>, range: (f64, f64)) -> Option<ResolvedValue> {
    value.map(|v| ResolvedValue::new(clamp_to(v, range), Provenance::User))
}

impl Resolver {
    pub fn new(sensors: Arc<SensorGateway>, weather: Arc<WeatherGateway>, regional: Arc<RegionalTable>) -> Self {
        Self {
            sensors,
            weather,
            regional,
        }
    }

    /// Resolve every feature for one request. Never fails.
    #[tracing::instrument(level = "debug", skip(self, user))]
    pub async fn resolve(
        &self,
        user: &UserInput,
        sensor_id: Option<&str>,
        region: &str,
        season: Option<Season>,
    ) -> Resolution {
        // ---
        let defaults = self.regional.lookup(region);
        let needs_sensor = user.ph.is_none() || user.temperature.is_none();
        let needs_weather = user.rainfall.is_none() || user.humidity.is_none();

        let sensor_read = async {
            match sensor_id {
                Some(id) if needs_sensor => Some(self.sensors.fetch_latest(id, region, true).await),
                _ => None,
            }
        };
        let weather_read = async {
            if !needs_weather {
                return None;
            }
            Some(match season {
                Some(season) => self.weather.seasonal_weather(region, season).await,
                None => self.weather.current_weather(region).await,
            })
        };
        let (reading, weather): (Option<SensorReading>, Option<WeatherReading>) =
            tokio::join!(sensor_read, weather_read);

        let live_reading = reading.as_ref().filter(|r| r.is_live());
        let live_weather = weather.filter(|w| w.source == WeatherSource::Live);
        let fallback = |value: f64| ResolvedValue::new(value, Provenance::RegionalDefault);

        let input = PredictionInput {
            nitrogen: from_user(user.nitrogen, NUTRIENT_RANGE).unwrap_or(fallback(defaults.nitrogen)),
            phosphorus: from_user(user.phosphorus, NUTRIENT_RANGE).unwrap_or(fallback(defaults.phosphorus)),
            potassium: from_user(user.potassium, NUTRIENT_RANGE).unwrap_or(fallback(defaults.potassium)),
            temperature: from_user(user.temperature, TEMPERATURE_RANGE)
                .or_else(|| live_reading.map(|r| ResolvedValue::new(r.temperature(), Provenance::Sensor)))
                .unwrap_or(fallback(defaults.temperature)),
            ph: from_user(user.ph, PH_RANGE)
                .or_else(|| live_reading.map(|r| ResolvedValue::new(r.ph(), Provenance::Sensor)))
                .unwrap_or(fallback(defaults.ph)),
            humidity: from_user(user.humidity, HUMIDITY_RANGE)
                .or_else(|| {
                    live_weather.map(|w| ResolvedValue::new(clamp_to(w.humidity, HUMIDITY_RANGE), Provenance::Weather))
                })
                .unwrap_or(fallback(defaults.humidity)),
            rainfall: from_user(user.rainfall, RAINFALL_RANGE)
                .or_else(|| {
                    live_weather.map(|w| ResolvedValue::new(clamp_to(w.rainfall, RAINFALL_RANGE), Provenance::Weather))
                })
                .unwrap_or(fallback(defaults.rainfall)),
        };

        tracing::debug!(
            "Resolved features {:?} with provenance {:?}",
            input.features(),
            input.provenance()
        );

        Resolution {
            input,
            region: defaults.region.clone(),
            sensor_status: reading.map(|r| r.status()),
            weather_source: weather.map(|w| w.source),
        }
    }
}
