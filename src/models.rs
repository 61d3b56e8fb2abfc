//! Data model shared by the gateways, the resolver and the ensemble.
//!
//! Sensor readings are clamped into their physical ranges when they are
//! built, so everything downstream can treat them as usable values.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---

/// Valid pH range.
pub const PH_RANGE: (f64, f64) = (0.0, 14.0);

/// Valid air/soil temperature range in °C.
pub const TEMPERATURE_RANGE: (f64, f64) = (-50.0, 100.0);

/// Valid relative humidity range in percent.
pub const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);

/// Valid N/P/K range (kg/ha).
pub const NUTRIENT_RANGE: (f64, f64) = (0.0, 500.0);

/// Valid rainfall range in mm.
pub const RAINFALL_RANGE: (f64, f64) = (0.0, 5000.0);

/// Readings older than this many seconds are reported as stale.
pub const STALE_AFTER_SECS: i64 = 3600;

/// Feature order expected by every classifier artifact.
pub const FEATURE_NAMES: [&str; 7] = [
    "nitrogen",
    "phosphorus",
    "potassium",
    "temperature",
    "humidity",
    "ph",
    "rainfall",
];

/// Clamp `value` into the inclusive `(lo, hi)` range.
pub fn clamp_to(value: f64, (lo, hi): (f64, f64)) -> f64 {
    value.clamp(lo, hi)
}

// ---

/// Freshness of a sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    Active,
    Default,
    Stale,
}

/// Raw values pulled out of an upstream payload, before range checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSensorReading {
    // ---
    pub ph: f64,
    pub temperature: f64,
    pub humidity: Option<f64>,
    pub soil_temperature: Option<f64>,
    pub captured_at: Option<DateTime<Utc>>,
}

/// A normalized, range-checked reading for one sensor.
///
/// Fields are private so that a reading can only be built through
/// [`RawSensorReading::to_reading`] or [`SensorReading::synthesized`], both of
/// which clamp every value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    // ---
    sensor_id: String,
    ph: f64,
    temperature: f64,
    humidity: Option<f64>,
    soil_temperature: Option<f64>,
    captured_at: DateTime<Utc>,
    region: String,
    status: ReadingStatus,
}

impl RawSensorReading {
    // ---
    /// Clamp the raw values and stamp the reading `active` or `stale`
    /// depending on its age at `now`. A payload without a timestamp is
    /// assumed to be current.
    pub fn to_reading(&self, sensor_id: &str, region: &str, now: DateTime<Utc>) -> SensorReading {
        // ---
        let captured_at = self.captured_at.unwrap_or(now);
        let status = if now - captured_at > Duration::seconds(STALE_AFTER_SECS) {
            ReadingStatus::Stale
        } else {
            ReadingStatus::Active
        };

        SensorReading {
            sensor_id: sensor_id.to_string(),
            ph: clamp_to(self.ph, PH_RANGE),
            temperature: clamp_to(self.temperature, TEMPERATURE_RANGE),
            humidity: self.humidity.map(|h| clamp_to(h, HUMIDITY_RANGE)),
            soil_temperature: self.soil_temperature.map(|t| clamp_to(t, TEMPERATURE_RANGE)),
            captured_at,
            region: region.to_string(),
            status,
        }
    }
}

impl SensorReading {
    // ---
    /// Build a `default` reading that stands in for a sensor that could not
    /// be read.
    pub fn synthesized(
        sensor_id: &str,
        region: &str,
        ph: f64,
        temperature: f64,
        humidity: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        // ---
        let temperature = clamp_to(temperature, TEMPERATURE_RANGE);
        Self {
            sensor_id: sensor_id.to_string(),
            ph: clamp_to(ph, PH_RANGE),
            temperature,
            humidity: Some(clamp_to(humidity, HUMIDITY_RANGE)),
            soil_temperature: Some(clamp_to(temperature - 2.0, TEMPERATURE_RANGE)),
            captured_at,
            region: region.to_string(),
            status: ReadingStatus::Default,
        }
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn ph(&self) -> f64 {
        self.ph
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn humidity(&self) -> Option<f64> {
        self.humidity
    }

    pub fn soil_temperature(&self) -> Option<f64> {
        self.soil_temperature
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn status(&self) -> ReadingStatus {
        self.status
    }

    /// True when the values came from a real upstream read.
    pub fn is_live(&self) -> bool {
        self.status != ReadingStatus::Default
    }
}

// ---

/// Which source ultimately supplied a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    User,
    Sensor,
    Weather,
    RegionalDefault,
}

/// One resolved feature together with where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedValue {
    pub value: f64,
    pub provenance: Provenance,
}

impl ResolvedValue {
    pub fn new(value: f64, provenance: Provenance) -> Self {
        Self { value, provenance }
    }
}

/// The fully populated feature vector handed to the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionInput {
    // ---
    pub nitrogen: ResolvedValue,
    pub phosphorus: ResolvedValue,
    pub potassium: ResolvedValue,
    pub temperature: ResolvedValue,
    pub humidity: ResolvedValue,
    pub ph: ResolvedValue,
    pub rainfall: ResolvedValue,
}

impl PredictionInput {
    /// Feature values in [`FEATURE_NAMES`] order.
    pub fn features(&self) -> [f64; 7] {
        // ---
        [
            self.nitrogen.value,
            self.phosphorus.value,
            self.potassium.value,
            self.temperature.value,
            self.humidity.value,
            self.ph.value,
            self.rainfall.value,
        ]
    }

    /// Provenance of each feature in [`FEATURE_NAMES`] order.
    pub fn provenance(&self) -> [Provenance; 7] {
        // ---
        [
            self.nitrogen.provenance,
            self.phosphorus.provenance,
            self.potassium.provenance,
            self.temperature.provenance,
            self.humidity.provenance,
            self.ph.provenance,
            self.rainfall.provenance,
        ]
    }
}

/// Optional caller-supplied overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInput {
    // ---
    pub nitrogen: Option<f64>,
    pub phosphorus: Option<f64>,
    pub potassium: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub ph: Option<f64>,
    pub rainfall: Option<f64>,
}

impl UserInput {
    /// Name of the first field holding a NaN or infinite value, if any.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        // ---
        let fields = [
            self.nitrogen,
            self.phosphorus,
            self.potassium,
            self.temperature,
            self.humidity,
            self.ph,
            self.rainfall,
        ];
        FEATURE_NAMES
            .iter()
            .zip(fields)
            .find(|(_, v)| v.is_some_and(|v| !v.is_finite()))
            .map(|(name, _)| *name)
    }
}

// ---

/// Output of one ensemble member for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelPrediction {
    pub model_id: String,
    pub crop: String,
    pub confidence: f64,
}

impl ModelPrediction {
    /// Build a prediction, normalizing the label and clamping the
    /// confidence into [0, 1].
    pub fn new(model_id: impl Into<String>, crop: &str, confidence: f64) -> Self {
        // ---
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            model_id: model_id.into(),
            crop: crop.trim().to_lowercase(),
            confidence,
        }
    }
}

/// One entry of the ranked recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCrop {
    pub crop: String,
    pub confidence: f64,
    pub supporting_models: Vec<String>,
    pub model_agreement: usize,
}

/// Final ranked answer for a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleRecommendation {
    pub rankings: Vec<RankedCrop>,
    pub rationale: String,
    pub risk_factors: Vec<String>,
}

impl EnsembleRecommendation {
    pub fn top(&self) -> Option<&RankedCrop> {
        self.rankings.first()
    }
}
