//! Per-region agronomic baselines, the last-resort fallback for every feature.
//!
//! The built-in table covers the main Nepali agro-regions. A JSON file can
//! replace it at startup (`REGIONAL_DEFAULTS_PATH`).

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Region used when a lookup misses.
pub const BASELINE_REGION: &str = "Kathmandu Valley";

/// One row of the defaults table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalDefaults {
    // ---
    pub region: String,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
    pub ph: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub rainfall: f64,
    pub latitude: f64,
    pub longitude: f64,
}

/// On-disk layout of a replacement table.
#[derive(Debug, Deserialize)]
struct TableFile {
    baseline: String,
    regions: Vec<RegionalDefaults>,
}

/// Lookup table with a guaranteed baseline row.
#[derive(Debug, Clone)]
pub struct RegionalTable {
    rows: HashMap<String, RegionalDefaults>,
    baseline: RegionalDefaults,
}

fn normalize(region: &str) -> String {
    region
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn row(
    region: &str,
    (nitrogen, phosphorus, potassium): (f64, f64, f64),
    ph: f64,
    temperature: f64,
    humidity: f64,
    rainfall: f64,
    (latitude, longitude): (f64, f64),
) -> RegionalDefaults {
    RegionalDefaults {
        region: region.to_string(),
        nitrogen,
        phosphorus,
        potassium,
        ph,
        temperature,
        humidity,
        rainfall,
        latitude,
        longitude,
    }
}

impl RegionalTable {
    /// Build a table from rows. Fails if `baseline` is not one of them.
    pub fn new(rows: Vec<RegionalDefaults>, baseline: &str) -> Result<Self> {
        // ---
        let rows: HashMap<_, _> = rows.into_iter().map(|r| (normalize(&r.region), r)).collect();
        let baseline = rows
            .get(&normalize(baseline))
            .cloned()
            .ok_or_else(|| anyhow!("baseline region '{}' missing from defaults table", baseline))?;
        Ok(Self { rows, baseline })
    }

    /// The compiled-in table.
    pub fn builtin() -> Self {
        // ---
        let rows = vec![
            row(BASELINE_REGION, (80.0, 45.0, 40.0), 6.2, 18.5, 70.0, 18.0, (27.7172, 85.3240)),
            row("Bhairahawa-Butwal", (85.0, 40.0, 42.0), 6.8, 25.5, 72.0, 22.5, (27.5047, 83.4507)),
            row("Chitwan", (88.0, 44.0, 45.0), 6.5, 24.8, 78.0, 25.0, (27.5291, 84.3542)),
            row("Pokhara", (75.0, 38.0, 36.0), 5.9, 20.1, 80.0, 35.0, (28.2096, 83.9856)),
            row("Biratnagar", (82.0, 42.0, 40.0), 6.6, 25.2, 76.0, 24.0, (26.4525, 87.2718)),
            row("Nepalgunj", (70.0, 36.0, 38.0), 7.2, 26.0, 65.0, 16.5, (28.0500, 81.6167)),
            row("Dhangadhi", (72.0, 37.0, 39.0), 7.0, 25.8, 66.0, 17.0, (28.6833, 80.6000)),
            row("Jumla", (55.0, 30.0, 35.0), 6.0, 12.5, 60.0, 9.5, (29.2747, 82.1838)),
        ];
        let baseline = rows[0].clone();
        let rows = rows.into_iter().map(|r| (normalize(&r.region), r)).collect();
        Self { rows, baseline }
    }

    /// Load a replacement table from a JSON file of the form
    /// `{"baseline": "...", "regions": [ ... ]}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        // ---
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading regional defaults from {}", path.display()))?;
        let file: TableFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing regional defaults in {}", path.display()))?;
        Self::new(file.regions, &file.baseline)
    }

    /// Exactly one row per lookup; unknown regions get the baseline.
    pub fn lookup(&self, region: &str) -> &RegionalDefaults {
        // ---
        self.rows.get(&normalize(region)).unwrap_or(&self.baseline)
    }

    pub fn contains(&self, region: &str) -> bool {
        self.rows.contains_key(&normalize(region))
    }

    pub fn baseline(&self) -> &RegionalDefaults {
        &self.baseline
    }

    /// Region names, sorted.
    pub fn regions(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.rows.values().map(|r| r.region.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for RegionalTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::io::Write;

    #[test]
    fn test_known_region_lookup() {
        // ---
        let table = RegionalTable::builtin();
        let row = table.lookup("Bhairahawa-Butwal");
        assert_eq!(row.ph, 6.8);
        assert_eq!(row.rainfall, 22.5);
    }

    #[test]
    fn test_lookup_ignores_case_and_spacing() {
        // ---
        let table = RegionalTable::builtin();
        assert_eq!(table.lookup("  kathmandu   VALLEY ").region, BASELINE_REGION);
        assert!(table.contains("chitwan"));
    }

    #[test]
    fn test_unknown_region_falls_back_to_baseline() {
        // ---
        let table = RegionalTable::builtin();
        assert_eq!(table.lookup("Atlantis").region, BASELINE_REGION);
        assert_eq!(table.lookup("").region, BASELINE_REGION);
    }

    #[test]
    fn test_table_requires_baseline() {
        // ---
        let rows = vec![RegionalTable::builtin().lookup("Chitwan").clone()];
        assert!(RegionalTable::new(rows.clone(), "Jumla").is_err());
        assert!(RegionalTable::new(rows, "Chitwan").is_ok());
    }

    #[test]
    fn test_load_from_file() {
        // ---
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"baseline": "Terai",
                "regions": [{{"region": "Terai", "nitrogen": 90, "phosphorus": 40,
                  "potassium": 40, "ph": 6.9, "temperature": 26, "humidity": 74,
                  "rainfall": 21, "latitude": 27.0, "longitude": 84.0}}]}}"#
        )
        .unwrap();

        let table = RegionalTable::from_file(file.path()).unwrap();
        assert_eq!(table.lookup("nowhere").region, "Terai");
        assert_eq!(table.regions(), vec!["Terai"]);
    }
}
