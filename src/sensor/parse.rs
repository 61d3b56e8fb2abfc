//! Payload parsing for sensor store responses.
//!
//! Deployed sensors have written several payload layouts over time. Each
//! layout gets its own [`PayloadParser`]; the gateway tries them in order and
//! keeps the first that yields a reading. New layouts are added as new
//! parsers, not by editing existing ones.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::RawSensorReading;

/// pH field names, in preference order.
const PH_KEYS: [&str; 4] = ["ph", "phValue", "pH", "ph_value"];

/// Temperature field names, in preference order.
const TEMPERATURE_KEYS: [&str; 4] = ["temperature", "airTemperature", "soilTemperature", "temp"];

const HUMIDITY_KEYS: [&str; 2] = ["humidity", "relativeHumidity"];

const SOIL_TEMPERATURE_KEYS: [&str; 2] = ["soilTemperature", "soil_temperature"];

const TIMESTAMP_KEYS: [&str; 3] = ["timestamp", "time", "createdAt"];

/// Keys under which some devices nest the actual reading.
const ENVELOPE_KEYS: [&str; 4] = ["data", "latest", "reading", "value"];

/// Epoch values above this are taken to be milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

// ---

/// One payload layout.
pub trait PayloadParser: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Extract a raw reading, or `None` if the payload is not this layout.
    fn parse(&self, payload: &Value) -> Option<RawSensorReading>;
}

/// The parsers the gateway uses, in the order they are tried.
pub fn default_parsers() -> Vec<Box<dyn PayloadParser>> {
    vec![
        Box::new(FlatFields),
        Box::new(Envelope),
        Box::new(LatestChild),
        Box::new(LegacyCsv),
    ]
}

/// Run `parsers` in order and return the first hit with the parser's name.
pub fn parse_payload(
    parsers: &[Box<dyn PayloadParser>],
    payload: &Value,
) -> Option<(&'static str, RawSensorReading)> {
    parsers
        .iter()
        .find_map(|p| p.parse(payload).map(|raw| (p.name(), raw)))
}

// ---

fn number(value: &Value) -> Option<f64> {
    // ---
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(number))
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    // ---
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let n = n.as_f64()?;
            if n > EPOCH_MILLIS_THRESHOLD {
                DateTime::from_timestamp_millis(n as i64)
            } else {
                DateTime::from_timestamp(n as i64, 0)
            }
        }
        _ => None,
    }
}

/// Flat object with numeric fields under current or legacy names.
///
/// `ph` and a temperature are required; everything else is optional.
pub struct FlatFields;

impl PayloadParser for FlatFields {
    fn name(&self) -> &'static str {
        "flat_fields"
    }

    fn parse(&self, payload: &Value) -> Option<RawSensorReading> {
        // ---
        let obj = payload.as_object()?;
        Some(RawSensorReading {
            ph: first_number(obj, &PH_KEYS)?,
            temperature: first_number(obj, &TEMPERATURE_KEYS)?,
            humidity: first_number(obj, &HUMIDITY_KEYS),
            soil_temperature: first_number(obj, &SOIL_TEMPERATURE_KEYS),
            captured_at: TIMESTAMP_KEYS
                .iter()
                .find_map(|k| obj.get(*k).and_then(timestamp)),
        })
    }
}

/// Legacy `"ph,temperature"` string, optionally followed by humidity.
pub struct LegacyCsv;

impl PayloadParser for LegacyCsv {
    fn name(&self) -> &'static str {
        "legacy_csv"
    }

    fn parse(&self, payload: &Value) -> Option<RawSensorReading> {
        // ---
        let text = payload.as_str()?;
        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        if parts.len() < 2 || parts.len() > 3 {
            return None;
        }
        let field = |i: usize| {
            parts[i]
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
        };

        Some(RawSensorReading {
            ph: field(0)?,
            temperature: field(1)?,
            humidity: if parts.len() == 3 { Some(field(2)?) } else { None },
            soil_temperature: None,
            captured_at: None,
        })
    }
}

fn parse_leaf(value: &Value) -> Option<RawSensorReading> {
    FlatFields.parse(value).or_else(|| LegacyCsv.parse(value))
}

/// Reading wrapped in a single-key envelope such as `{"data": {...}}`.
pub struct Envelope;

impl PayloadParser for Envelope {
    fn name(&self) -> &'static str {
        "envelope"
    }

    fn parse(&self, payload: &Value) -> Option<RawSensorReading> {
        // ---
        let obj = payload.as_object()?;
        ENVELOPE_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(parse_leaf))
    }
}

/// Collection of readings under push-style keys; the newest one wins.
///
/// Newest means latest timestamp, falling back to the greatest key, since
/// push keys sort chronologically.
pub struct LatestChild;

impl PayloadParser for LatestChild {
    fn name(&self) -> &'static str {
        "latest_child"
    }

    fn parse(&self, payload: &Value) -> Option<RawSensorReading> {
        // ---
        let obj = payload.as_object()?;
        if obj.is_empty() || !obj.values().all(Value::is_object) {
            return None;
        }
        obj.iter()
            .filter_map(|(key, child)| parse_leaf(child).map(|raw| (key, raw)))
            .max_by(|(ka, a), (kb, b)| a.captured_at.cmp(&b.captured_at).then(ka.cmp(kb)))
            .map(|(_, raw)| raw)
    }
}
