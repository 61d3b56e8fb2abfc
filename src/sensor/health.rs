//! Advisory health report for a sensor. Never blocks a prediction.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{ReadingStatus, SensorReading};

/// pH values outside this band are flagged as unusual.
pub const USUAL_PH: (f64, f64) = (4.0, 9.0);

/// Temperatures (°C) outside this band are flagged as unusual.
pub const USUAL_TEMPERATURE: (f64, f64) = (10.0, 50.0);

/// Overall grade derived from the number of issues found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthGrade {
    pub fn from_issue_count(issues: usize) -> Self {
        match issues {
            0 => Self::Excellent,
            1 => Self::Good,
            2 => Self::Fair,
            _ => Self::Poor,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorHealth {
    pub sensor_id: String,
    pub status: ReadingStatus,
    pub health: HealthGrade,
    pub issues: Vec<String>,
    pub age_seconds: i64,
    pub reading: SensorReading,
}

/// Grade `reading` as seen at `now`.
pub fn assess(reading: &SensorReading, now: DateTime<Utc>) -> SensorHealth {
    // ---
    let mut issues = Vec::new();

    if reading.status() == ReadingStatus::Default {
        issues.push("No live data; using synthesized default values".to_string());
    }

    let age = now - reading.captured_at();
    if age > Duration::hours(1) {
        issues.push(format!("Data is {} hours old", age.num_hours()));
    } else if age > Duration::minutes(30) {
        issues.push(format!("Data is {} minutes old", age.num_minutes()));
    }

    let ph = reading.ph();
    if ph < USUAL_PH.0 || ph > USUAL_PH.1 {
        issues.push(format!("Unusual pH reading: {ph:.1}"));
    }

    let temperature = reading.temperature();
    if temperature < USUAL_TEMPERATURE.0 || temperature > USUAL_TEMPERATURE.1 {
        issues.push(format!("Unusual temperature reading: {temperature:.1}°C"));
    }

    SensorHealth {
        sensor_id: reading.sensor_id().to_string(),
        status: reading.status(),
        health: HealthGrade::from_issue_count(issues.len()),
        issues,
        age_seconds: age.num_seconds().max(0),
        reading: reading.clone(),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::RawSensorReading;
    use chrono::TimeZone;

    fn reading(ph: f64, temperature: f64, age: Duration) -> (SensorReading, DateTime<Utc>) {
        // ---
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let raw = RawSensorReading {
            ph,
            temperature,
            captured_at: Some(now - age),
            ..Default::default()
        };
        (raw.to_reading("s-1", "Chitwan", now), now)
    }

    #[test]
    fn test_healthy_sensor_is_excellent() {
        // ---
        let (r, now) = reading(6.5, 24.0, Duration::minutes(5));
        let health = assess(&r, now);
        assert_eq!(health.health, HealthGrade::Excellent);
        assert!(health.issues.is_empty());
        assert_eq!(health.status, ReadingStatus::Active);
        assert_eq!(health.age_seconds, 300);
    }

    #[test]
    fn test_staleness_thresholds() {
        // ---
        let (r, now) = reading(6.5, 24.0, Duration::minutes(45));
        let health = assess(&r, now);
        assert_eq!(health.issues, vec!["Data is 45 minutes old"]);
        assert_eq!(health.health, HealthGrade::Good);

        let (r, now) = reading(6.5, 24.0, Duration::hours(3));
        let health = assess(&r, now);
        assert_eq!(health.issues, vec!["Data is 3 hours old"]);
        assert_eq!(health.status, ReadingStatus::Stale);
    }

    #[test]
    fn test_unusual_values_degrade_grade() {
        // ---
        let (r, now) = reading(3.2, 55.0, Duration::minutes(40));
        let health = assess(&r, now);
        assert_eq!(health.issues.len(), 3);
        assert_eq!(health.health, HealthGrade::Poor);

        let (r, now) = reading(9.5, 5.0, Duration::minutes(1));
        assert_eq!(assess(&r, now).health, HealthGrade::Fair);
    }

    #[test]
    fn test_synthesized_reading_is_reported() {
        // ---
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let r = SensorReading::synthesized("s-1", "Jumla", 6.0, 15.5, 60.0, now);
        let health = assess(&r, now);
        assert_eq!(health.status, ReadingStatus::Default);
        assert_eq!(health.health, HealthGrade::Good);
    }
}
