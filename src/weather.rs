//! Weather Gateway: daily rainfall and mean humidity for a region.
//!
//! One upstream attempt per call, bounded by the client timeout. Any
//! failure returns the region's default pair immediately, tagged as a
//! default so the resolver can attribute it correctly.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::regional::{RegionalDefaults, RegionalTable};

/// Humidity bounds applied to seasonal estimates.
pub const SEASONAL_HUMIDITY_RANGE: (f64, f64) = (20.0, 95.0);

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Spring,
    Summer,
    Monsoon,
    Autumn,
    Winter,
}

impl Season {
    /// `(rainfall, humidity)` multipliers applied to current conditions.
    pub fn multipliers(self) -> (f64, f64) {
        match self {
            Self::Spring => (0.6, 0.85),
            Self::Summer => (1.0, 1.0),
            Self::Monsoon => (1.5, 1.2),
            Self::Autumn => (0.7, 0.95),
            Self::Winter => (0.3, 0.8),
        }
    }
}

impl FromStr for Season {
    type Err = RequestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // ---
        match s.trim().to_lowercase().as_str() {
            "spring" => Ok(Self::Spring),
            "summer" => Ok(Self::Summer),
            "monsoon" | "rainy" => Ok(Self::Monsoon),
            "autumn" | "fall" => Ok(Self::Autumn),
            "winter" => Ok(Self::Winter),
            _ => Err(RequestError::UnknownSeason(s.to_string())),
        }
    }
}

/// Where a weather pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherSource {
    Live,
    RegionalDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherReading {
    pub rainfall: f64,
    pub humidity: f64,
    pub source: WeatherSource,
}

/// Hourly series as returned by the weather service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HourlySeries {
    #[serde(default)]
    pub precipitation: Vec<Option<f64>>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<Option<f64>>,
}

impl HourlySeries {
    /// Sum rainfall and average humidity, skipping missing hours.
    pub fn daily_totals(&self) -> Result<(f64, f64)> {
        // ---
        let rain: Vec<f64> = self.precipitation.iter().flatten().copied().collect();
        let humidity: Vec<f64> = self.relative_humidity_2m.iter().flatten().copied().collect();
        if rain.is_empty() || humidity.is_empty() {
            return Err(anyhow!("weather series has no usable hours"));
        }
        let rainfall = rain.iter().sum::<f64>();
        let mean_humidity = humidity.iter().sum::<f64>() / humidity.len() as f64;
        Ok((rainfall, mean_humidity))
    }
}

// ---

/// Upstream weather service.
#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn hourly(&self, latitude: f64, longitude: f64) -> Result<HourlySeries>;
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: HourlySeries,
}

/// Open-Meteo forecast API client.
pub struct OpenMeteoClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // ---
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl WeatherService for OpenMeteoClient {
    async fn hourly(&self, latitude: f64, longitude: f64) -> Result<HourlySeries> {
        // ---
        let url = format!(
            "{}/v1/forecast?latitude={}&longitude={}&hourly=precipitation,relative_humidity_2m&forecast_days=1&timezone=auto",
            self.base_url, latitude, longitude
        );
        tracing::debug!("Fetching weather from: {}", url);

        let response: ForecastResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.hourly)
    }
}

// ---

pub struct WeatherGateway {
    service: Option<Arc<dyn WeatherService>>,
    regional: Arc<RegionalTable>,
}

impl WeatherGateway {
    pub fn new(service: Option<Arc<dyn WeatherService>>, regional: Arc<RegionalTable>) -> Self {
        Self { service, regional }
    }

    /// Today's rainfall total and mean humidity for `region`.
    pub async fn current_weather(&self, region: &str) -> WeatherReading {
        // ---
        let defaults = self.regional.lookup(region);
        match self.fetch_live(defaults).await {
            Ok((rainfall, humidity)) => WeatherReading {
                rainfall,
                humidity,
                source: WeatherSource::Live,
            },
            Err(e) => {
                tracing::warn!("Weather lookup for {} failed, using defaults: {}", defaults.region, e);
                Self::default_pair(defaults)
            }
        }
    }

    /// Current conditions scaled for `season`, humidity kept within
    /// [`SEASONAL_HUMIDITY_RANGE`]. Defaults are returned unscaled.
    pub async fn seasonal_weather(&self, region: &str, season: Season) -> WeatherReading {
        // ---
        let current = self.current_weather(region).await;
        if current.source == WeatherSource::RegionalDefault {
            return current;
        }

        let (rain_factor, humidity_factor) = season.multipliers();
        let (lo, hi) = SEASONAL_HUMIDITY_RANGE;
        WeatherReading {
            rainfall: current.rainfall * rain_factor,
            humidity: (current.humidity * humidity_factor).clamp(lo, hi),
            source: WeatherSource::Live,
        }
    }

    async fn fetch_live(&self, defaults: &RegionalDefaults) -> Result<(f64, f64)> {
        // ---
        let service = self
            .service
            .as_ref()
            .ok_or_else(|| anyhow!("no weather service configured"))?;
        let series = service.hourly(defaults.latitude, defaults.longitude).await?;
        series.daily_totals()
    }

    fn default_pair(defaults: &RegionalDefaults) -> WeatherReading {
        WeatherReading {
            rainfall: defaults.rainfall,
            humidity: defaults.humidity,
            source: WeatherSource::RegionalDefault,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    struct FixedService(HourlySeries);

    #[async_trait]
    impl WeatherService for FixedService {
        async fn hourly(&self, _lat: f64, _lon: f64) -> Result<HourlySeries> {
            Ok(self.0.clone())
        }
    }

    struct DownService;

    #[async_trait]
    impl WeatherService for DownService {
        async fn hourly(&self, _lat: f64, _lon: f64) -> Result<HourlySeries> {
            Err(anyhow!("timed out"))
        }
    }

    fn series(rain: &[f64], humidity: &[f64]) -> HourlySeries {
        HourlySeries {
            precipitation: rain.iter().map(|v| Some(*v)).collect(),
            relative_humidity_2m: humidity.iter().map(|v| Some(*v)).collect(),
        }
    }

    fn gateway(service: impl WeatherService + 'static) -> WeatherGateway {
        WeatherGateway::new(Some(Arc::new(service)), Arc::new(RegionalTable::builtin()))
    }

    #[test]
    fn test_daily_totals_skip_missing_hours() {
        // ---
        let s = HourlySeries {
            precipitation: vec![Some(1.5), None, Some(2.5)],
            relative_humidity_2m: vec![Some(60.0), Some(80.0), None],
        };
        assert_eq!(s.daily_totals().unwrap(), (4.0, 70.0));
        assert!(HourlySeries::default().daily_totals().is_err());
    }

    #[test]
    fn test_season_parsing() {
        // ---
        assert_eq!("Monsoon".parse::<Season>(), Ok(Season::Monsoon));
        assert_eq!(" winter ".parse::<Season>(), Ok(Season::Winter));
        assert_eq!(
            "dry".parse::<Season>(),
            Err(RequestError::UnknownSeason("dry".to_string()))
        );
    }

    #[test]
    fn test_forecast_response_shape() {
        // ---
        let body = r#"{"latitude": 27.5, "hourly": {"time": ["2025-06-01T00:00"],
            "precipitation": [0.4, null], "relative_humidity_2m": [88, 90]}}"#;
        let parsed: ForecastResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.hourly.daily_totals().unwrap(), (0.4, 89.0));
    }

    #[tokio::test]
    async fn test_current_weather_live() {
        // ---
        let gw = gateway(FixedService(series(&[10.0, 5.0], &[70.0, 90.0])));
        let w = gw.current_weather("Chitwan").await;
        assert_eq!(w.source, WeatherSource::Live);
        assert_eq!(w.rainfall, 15.0);
        assert_eq!(w.humidity, 80.0);
    }

    #[tokio::test]
    async fn test_failure_returns_regional_pair() {
        // ---
        let gw = gateway(DownService);
        let w = gw.current_weather("Bhairahawa-Butwal").await;
        assert_eq!(w.source, WeatherSource::RegionalDefault);
        assert_eq!(w.rainfall, 22.5);
        assert_eq!(w.humidity, 72.0);

        let unconfigured = WeatherGateway::new(None, Arc::new(RegionalTable::builtin()));
        let w = unconfigured.seasonal_weather("Bhairahawa-Butwal", Season::Monsoon).await;
        assert_eq!(w.rainfall, 22.5);
    }

    #[tokio::test]
    async fn test_seasonal_scaling_and_clamp() {
        // ---
        let gw = gateway(FixedService(series(&[20.0], &[85.0])));

        let monsoon = gw.seasonal_weather("Chitwan", Season::Monsoon).await;
        assert_eq!(monsoon.rainfall, 30.0);
        assert_eq!(monsoon.humidity, 95.0);

        let winter = gw.seasonal_weather("Chitwan", Season::Winter).await;
        assert!((winter.rainfall - 6.0).abs() < 1e-9);
        assert!((winter.humidity - 68.0).abs() < 1e-9);
    }
}
