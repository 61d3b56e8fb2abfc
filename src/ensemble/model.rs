//! Classifier artifacts and the capability interface the runner calls.
//!
//! Artifacts are JSON files tagged with a `kind`. They are loaded once at
//! startup and are read-only afterwards, so they are shared across requests
//! behind `Arc` without locking.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::ModelError;

/// Number of features every model consumes.
pub const FEATURE_COUNT: usize = 7;

pub type Features = [f64; FEATURE_COUNT];

/// Class label with its probability.
pub type Distribution = Vec<(String, f64)>;

/// What the ensemble runner needs from a model.
///
/// Models without a probability interface leave `has_confidence_output` at
/// `false` and the runner substitutes its default confidence.
pub trait CropClassifier: Send + Sync {
    fn id(&self) -> &str;

    fn predict(&self, features: &Features) -> Result<String, ModelError>;

    fn has_confidence_output(&self) -> bool {
        false
    }

    fn predict_probability(&self, _features: &Features) -> Result<Distribution, ModelError> {
        Err(ModelError::NoProbability(self.id().to_string()))
    }
}

fn invalid(id: &str, reason: impl Into<String>) -> ModelError {
    ModelError::Invalid {
        id: id.to_string(),
        reason: reason.into(),
    }
}

/// Numerically stable softmax over `(label, score)` pairs.
fn softmax(scores: Vec<(String, f64)>) -> Distribution {
    // ---
    let max = scores
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(label, s)| (label, (s - max).exp()))
        .collect();
    let total: f64 = exp.iter().map(|(_, e)| e).sum();
    exp.into_iter().map(|(label, e)| (label, e / total)).collect()
}

fn argmax(dist: &Distribution) -> Option<&str> {
    dist.iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(label, _)| label.as_str())
}

// ---

#[derive(Debug, Clone, Deserialize)]
pub struct NbClass {
    pub label: String,
    pub prior: f64,
    pub means: Features,
    pub variances: Features,
}

/// Gaussian naive Bayes.
#[derive(Debug, Clone, Deserialize)]
pub struct GaussianNb {
    pub id: String,
    pub classes: Vec<NbClass>,
}

impl GaussianNb {
    fn validate(&self) -> Result<(), ModelError> {
        // ---
        if self.classes.is_empty() {
            return Err(invalid(&self.id, "no classes"));
        }
        for class in &self.classes {
            if class.prior <= 0.0 || class.variances.iter().any(|v| *v <= 0.0) {
                return Err(invalid(
                    &self.id,
                    format!("class '{}' needs a positive prior and variances", class.label),
                ));
            }
        }
        Ok(())
    }

    fn log_likelihood(class: &NbClass, x: &Features) -> f64 {
        // ---
        let ln_2pi = (2.0 * std::f64::consts::PI).ln();
        class.prior.ln()
            + x.iter()
                .zip(class.means.iter().zip(class.variances.iter()))
                .map(|(x, (mean, var))| -0.5 * (ln_2pi + var.ln()) - (x - mean).powi(2) / (2.0 * var))
                .sum::<f64>()
    }
}

impl CropClassifier for GaussianNb {
    fn id(&self) -> &str {
        &self.id
    }

    fn predict(&self, features: &Features) -> Result<String, ModelError> {
        let dist = self.predict_probability(features)?;
        argmax(&dist)
            .map(str::to_string)
            .ok_or_else(|| invalid(&self.id, "no classes"))
    }

    fn has_confidence_output(&self) -> bool {
        true
    }

    fn predict_probability(&self, features: &Features) -> Result<Distribution, ModelError> {
        let scores = self
            .classes
            .iter()
            .map(|c| (c.label.clone(), Self::log_likelihood(c, features)))
            .collect();
        Ok(softmax(scores))
    }
}

// ---

#[derive(Debug, Clone, Deserialize)]
pub struct Centroid {
    pub label: String,
    pub centroid: Features,
}

fn default_temperature() -> f64 {
    1.0
}

/// Nearest centroid over per-feature scaled distance. Probabilities are a
/// softmax of negative distances divided by `temperature`.
#[derive(Debug, Clone, Deserialize)]
pub struct NearestCentroid {
    pub id: String,
    pub scales: Features,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    pub classes: Vec<Centroid>,
}

impl NearestCentroid {
    fn validate(&self) -> Result<(), ModelError> {
        // ---
        if self.classes.is_empty() {
            return Err(invalid(&self.id, "no classes"));
        }
        if self.scales.iter().any(|s| *s <= 0.0) || self.temperature <= 0.0 {
            return Err(invalid(&self.id, "scales and temperature must be positive"));
        }
        Ok(())
    }

    fn distance(&self, centroid: &Features, x: &Features) -> f64 {
        x.iter()
            .zip(centroid)
            .zip(&self.scales)
            .map(|((x, c), s)| ((x - c) / s).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

impl CropClassifier for NearestCentroid {
    fn id(&self) -> &str {
        &self.id
    }

    fn predict(&self, features: &Features) -> Result<String, ModelError> {
        // ---
        self.classes
            .iter()
            .min_by(|a, b| {
                self.distance(&a.centroid, features)
                    .total_cmp(&self.distance(&b.centroid, features))
            })
            .map(|c| c.label.clone())
            .ok_or_else(|| invalid(&self.id, "no classes"))
    }

    fn has_confidence_output(&self) -> bool {
        true
    }

    fn predict_probability(&self, features: &Features) -> Result<Distribution, ModelError> {
        let scores = self
            .classes
            .iter()
            .map(|c| (c.label.clone(), -self.distance(&c.centroid, features) / self.temperature))
            .collect();
        Ok(softmax(scores))
    }
}

// ---

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go `left` when `features[feature] <= threshold`, else `right`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        label: String,
    },
}

/// Binary decision tree stored as a flat node array rooted at index 0.
/// Label only; no probability output.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
    pub id: String,
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn validate(&self) -> Result<(), ModelError> {
        // ---
        if self.nodes.is_empty() {
            return Err(invalid(&self.id, "empty tree"));
        }
        for node in &self.nodes {
            if let TreeNode::Split { feature, left, right, .. } = node {
                if *feature >= FEATURE_COUNT || *left >= self.nodes.len() || *right >= self.nodes.len() {
                    return Err(invalid(&self.id, "split references a missing feature or node"));
                }
            }
        }
        Ok(())
    }
}

impl CropClassifier for DecisionTree {
    fn id(&self) -> &str {
        &self.id
    }

    fn predict(&self, features: &Features) -> Result<String, ModelError> {
        // ---
        let mut index = 0;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes.
        for _ in 0..self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { label }) => return Ok(label.clone()),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = features
                        .get(*feature)
                        .ok_or_else(|| invalid(&self.id, "split on missing feature"))?;
                    index = if value <= threshold { *left } else { *right };
                }
                None => return Err(invalid(&self.id, format!("node {index} does not exist"))),
            }
        }
        Err(invalid(&self.id, "tree contains a cycle"))
    }
}

// ---

/// On-disk artifact, tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    GaussianNb(GaussianNb),
    NearestCentroid(NearestCentroid),
    DecisionTree(DecisionTree),
}

impl ModelArtifact {
    /// Validate and box the artifact as a classifier.
    pub fn into_classifier(self) -> Result<Arc<dyn CropClassifier>, ModelError> {
        // ---
        match self {
            Self::GaussianNb(m) => m.validate().map(|_| Arc::new(m) as Arc<dyn CropClassifier>),
            Self::NearestCentroid(m) => m.validate().map(|_| Arc::new(m) as Arc<dyn CropClassifier>),
            Self::DecisionTree(m) => m.validate().map(|_| Arc::new(m) as Arc<dyn CropClassifier>),
        }
    }
}

/// Load a single artifact file.
pub fn load_artifact(path: &Path) -> Result<Arc<dyn CropClassifier>, ModelError> {
    let text = std::fs::read_to_string(path)?;
    let artifact: ModelArtifact = serde_json::from_str(&text)?;
    artifact.into_classifier()
}

/// Load every `*.json` artifact in `dir`, in file name order.
///
/// Bad files are logged and skipped; a missing directory yields no models,
/// which the runner answers with its heuristic fallback.
pub fn load_models(dir: &Path) -> Vec<Arc<dyn CropClassifier>> {
    // ---
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Cannot read model directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut models = Vec::new();
    for path in paths {
        match load_artifact(&path) {
            Ok(model) => {
                tracing::info!("Loaded model '{}' from {}", model.id(), path.display());
                models.push(model);
            }
            Err(e) => tracing::warn!("Skipping model artifact {}: {}", path.display(), e),
        }
    }
    models
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn nb() -> GaussianNb {
        // ---
        serde_json::from_value(json!({
            "id": "nb",
            "classes": [
                {"label": "rice", "prior": 0.5,
                 "means": [80, 48, 40, 23.7, 82, 6.4, 236], "variances": [150, 60, 10, 4, 9, 0.3, 900]},
                {"label": "chickpea", "prior": 0.5,
                 "means": [40, 68, 80, 18.9, 17, 7.3, 80], "variances": [150, 60, 10, 4, 9, 0.3, 900]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_gaussian_nb_predicts_nearest_class() {
        // ---
        let model = nb();
        let x = [85.0, 45.0, 41.0, 24.0, 80.0, 6.5, 220.0];
        assert_eq!(model.predict(&x).unwrap(), "rice");

        let dist = model.predict_probability(&x).unwrap();
        let total: f64 = dist.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(dist.iter().find(|(l, _)| l == "rice").unwrap().1 > 0.99);
    }

    #[test]
    fn test_nearest_centroid() {
        // ---
        let model: NearestCentroid = serde_json::from_value(json!({
            "id": "nc",
            "scales": [20, 20, 20, 3, 10, 0.5, 50],
            "classes": [
                {"label": "maize", "centroid": [78, 48, 20, 22.4, 65, 6.2, 85]},
                {"label": "jute", "centroid": [78, 47, 40, 25, 80, 6.7, 175]}
            ]
        }))
        .unwrap();
        let x = [75.0, 50.0, 22.0, 22.0, 63.0, 6.3, 90.0];
        assert_eq!(model.predict(&x).unwrap(), "maize");
        assert!(model.has_confidence_output());
        let dist = model.predict_probability(&x).unwrap();
        assert_eq!(argmax(&dist), Some("maize"));
    }

    #[test]
    fn test_decision_tree_walk() {
        // ---
        let model: DecisionTree = serde_json::from_value(json!({
            "id": "tree",
            "nodes": [
                {"type": "split", "feature": 6, "threshold": 150.0, "left": 1, "right": 2},
                {"type": "leaf", "label": "maize"},
                {"type": "leaf", "label": "rice"}
            ]
        }))
        .unwrap();
        assert_eq!(model.predict(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 150.0]).unwrap(), "maize");
        assert_eq!(model.predict(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 150.1]).unwrap(), "rice");
        assert!(!model.has_confidence_output());
        assert!(matches!(
            model.predict_probability(&[0.0; 7]),
            Err(ModelError::NoProbability(_))
        ));
    }

    #[test]
    fn test_cyclic_tree_fails_instead_of_looping() {
        // ---
        let model: DecisionTree = serde_json::from_value(json!({
            "id": "loop",
            "nodes": [{"type": "split", "feature": 0, "threshold": 1.0, "left": 0, "right": 0}]
        }))
        .unwrap();
        assert!(model.predict(&[0.0; 7]).is_err());
    }

    #[test]
    fn test_artifact_validation() {
        // ---
        let bad_tree: ModelArtifact = serde_json::from_value(json!({
            "kind": "decision_tree", "id": "t",
            "nodes": [{"type": "split", "feature": 9, "threshold": 1.0, "left": 0, "right": 0}]
        }))
        .unwrap();
        assert!(bad_tree.into_classifier().is_err());

        let bad_nb: ModelArtifact = serde_json::from_value(json!({
            "kind": "gaussian_nb", "id": "nb",
            "classes": [{"label": "rice", "prior": 1.0,
                         "means": [0, 0, 0, 0, 0, 0, 0], "variances": [1, 1, 1, 0, 1, 1, 1]}]
        }))
        .unwrap();
        assert!(bad_nb.into_classifier().is_err());
    }

    #[test]
    fn test_load_models_skips_bad_files() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a_tree.json"),
            r#"{"kind": "decision_tree", "id": "tree", "nodes": [{"type": "leaf", "label": "wheat"}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("b_broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let models = load_models(dir.path());
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id(), "tree");

        assert!(load_models(&dir.path().join("missing")).is_empty());
    }
}
