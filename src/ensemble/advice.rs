//! Human-readable rationale and agronomic risk flags.

use crate::models::PredictionInput;

/// Bounds used to flag general agronomic risks.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskThresholds {
    pub high_temperature: f64,
    pub low_temperature: f64,
    pub high_humidity: f64,
    pub low_humidity: f64,
    pub high_rainfall: f64,
    pub low_rainfall: f64,
    pub acidic_ph: f64,
    pub alkaline_ph: f64,
    /// Cap on general risks; crop-specific ones are appended after the cap.
    pub max_general: usize,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            high_temperature: 35.0,
            low_temperature: 10.0,
            high_humidity: 90.0,
            low_humidity: 30.0,
            high_rainfall: 500.0,
            low_rainfall: 10.0,
            acidic_ph: 5.5,
            alkaline_ph: 8.0,
            max_general: 3,
        }
    }
}

fn title_case(crop: &str) -> String {
    let mut chars = crop.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Explanation for recommending `crop` under the resolved conditions.
pub fn rationale(crop: &str, input: &PredictionInput) -> String {
    // ---
    let t = input.temperature.value;
    let h = input.humidity.value;
    let r = input.rainfall.value;

    match crop {
        "rice" => format!(
            "Rice suits these conditions: warm temperatures around {t:.1}°C, high humidity of {h:.0}% \
             and {r:.0} mm of rainfall support flooded paddy cultivation."
        ),
        "maize" => format!(
            "Maize fits a moderate climate like this one ({t:.1}°C, {h:.0}% humidity) and needs only \
             the moderate rainfall available ({r:.0} mm)."
        ),
        "wheat" => format!(
            "Wheat prefers cool growing temperatures such as {t:.1}°C and tolerates the limited \
             rainfall here ({r:.0} mm) with {h:.0}% humidity."
        ),
        "jute" => format!(
            "Jute thrives in hot, humid and wet conditions; {t:.1}°C, {h:.0}% humidity and {r:.0} mm \
             of rainfall favour strong fibre growth."
        ),
        "chickpea" => format!(
            "Chickpea is drought tolerant and performs well in dry air ({h:.0}% humidity) at \
             {t:.1}°C with low rainfall ({r:.0} mm)."
        ),
        "lentil" => format!(
            "Lentil is a good fit for {t:.1}°C with {h:.0}% humidity, and {r:.0} mm of rainfall is \
             enough for this low-water pulse."
        ),
        "cotton" => format!(
            "Cotton benefits from the warmth ({t:.1}°C) and {h:.0}% humidity; {r:.0} mm of rainfall \
             keeps waterlogging risk low."
        ),
        "banana" => format!(
            "Banana grows well in warm ({t:.1}°C), humid ({h:.0}%) conditions with steady rainfall \
             of around {r:.0} mm."
        ),
        "coffee" => format!(
            "Coffee favours the mild temperature of {t:.1}°C with {h:.0}% humidity and {r:.0} mm \
             of rainfall on slightly acidic soil."
        ),
        _ => format!(
            "{} is the best match for the current conditions: {t:.1}°C, {h:.0}% humidity and \
             {r:.0} mm of rainfall.",
            title_case(crop)
        ),
    }
}

/// Known pest and disease pressure for a crop, if any.
pub fn crop_specific_risk(crop: &str) -> Option<&'static str> {
    match crop {
        "rice" => Some("Blast and brown planthopper pressure in warm, humid paddies"),
        "maize" => Some("Fall armyworm damage during the early whorl stage"),
        "wheat" => Some("Yellow rust under cool, moist weather"),
        "jute" => Some("Stem rot when fields stay waterlogged"),
        "chickpea" => Some("Pod borer infestation at flowering"),
        "lentil" => Some("Stemphylium blight during humid spells"),
        "potato" => Some("Late blight in cool, wet weather"),
        "banana" => Some("Panama wilt in poorly drained soil"),
        _ => None,
    }
}

/// General risks from thresholding the inputs, capped at
/// `thresholds.max_general`, followed by the top crop's known risk.
pub fn risk_factors(input: &PredictionInput, top_crop: Option<&str>, thresholds: &RiskThresholds) -> Vec<String> {
    // ---
    let t = input.temperature.value;
    let h = input.humidity.value;
    let r = input.rainfall.value;
    let ph = input.ph.value;

    let checks = [
        (t > thresholds.high_temperature, "High temperature stress"),
        (t < thresholds.low_temperature, "Cold stress and frost risk"),
        (h > thresholds.high_humidity, "Fungal disease risk from high humidity"),
        (h < thresholds.low_humidity, "Moisture stress from low humidity"),
        (r > thresholds.high_rainfall, "Waterlogging risk from heavy rainfall"),
        (r < thresholds.low_rainfall, "Drought stress; irrigation needed"),
        (ph < thresholds.acidic_ph, "Acidic soil may limit nutrient uptake"),
        (ph > thresholds.alkaline_ph, "Alkaline soil may cause micronutrient deficiency"),
    ];

    let mut risks: Vec<String> = checks
        .iter()
        .filter(|(hit, _)| *hit)
        .take(thresholds.max_general)
        .map(|(_, text)| text.to_string())
        .collect();

    if let Some(specific) = top_crop.and_then(crop_specific_risk) {
        risks.push(specific.to_string());
    }
    risks
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{Provenance, ResolvedValue};

    fn input(temperature: f64, humidity: f64, rainfall: f64, ph: f64) -> PredictionInput {
        // ---
        let v = |value| ResolvedValue::new(value, Provenance::Sensor);
        PredictionInput {
            nitrogen: v(80.0),
            phosphorus: v(40.0),
            potassium: v(40.0),
            temperature: v(temperature),
            humidity: v(humidity),
            ph: v(ph),
            rainfall: v(rainfall),
        }
    }

    #[test]
    fn test_rationale_mentions_inputs() {
        // ---
        let text = rationale("rice", &input(20.87, 82.0, 202.9, 6.5));
        assert!(text.starts_with("Rice"));
        assert!(text.contains("20.9°C"));
        assert!(text.contains("82%"));
        assert!(text.contains("203 mm"));
    }

    #[test]
    fn test_rationale_changes_with_inputs() {
        // ---
        let a = rationale("maize", &input(22.0, 60.0, 80.0, 6.5));
        let b = rationale("maize", &input(26.0, 70.0, 95.0, 6.5));
        assert_ne!(a, b);
    }

    #[test]
    fn test_generic_rationale() {
        // ---
        let text = rationale("pigeonpeas", &input(27.0, 48.0, 150.0, 5.8));
        assert!(text.starts_with("Pigeonpeas is the best match"));
    }

    #[test]
    fn test_no_risks_in_mild_conditions() {
        // ---
        let risks = risk_factors(&input(24.0, 70.0, 120.0, 6.5), Some("pigeonpeas"), &RiskThresholds::default());
        assert!(risks.is_empty());
    }

    #[test]
    fn test_general_risks_capped_then_crop_risk_appended() {
        // ---
        let risks = risk_factors(&input(38.0, 95.0, 650.0, 4.8), Some("rice"), &RiskThresholds::default());
        assert_eq!(
            risks,
            vec![
                "High temperature stress",
                "Fungal disease risk from high humidity",
                "Waterlogging risk from heavy rainfall",
                "Blast and brown planthopper pressure in warm, humid paddies",
            ]
        );
    }

    #[test]
    fn test_thresholds_are_configurable() {
        // ---
        let strict = RiskThresholds {
            high_temperature: 30.0,
            max_general: 1,
            ..Default::default()
        };
        let risks = risk_factors(&input(32.0, 20.0, 5.0, 6.5), None, &strict);
        assert_eq!(risks, vec!["High temperature stress"]);
    }
}
