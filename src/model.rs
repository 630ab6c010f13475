use crate::types::{FeatureRecord, Label, FEATURE_COUNT, FEATURE_NAMES};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("feature order mismatch at position {position}: expected {expected}, found {found}")]
    FeatureOrderMismatch {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("expected {expected} weights, found {found}")]
    WeightCount { expected: usize, found: usize },

    #[error("invalid tree {tree}: {reason}")]
    InvalidTree { tree: usize, reason: String },
}

/// On-disk artifact. `feature_order` must equal the canonical order exactly.
#[derive(Debug, Clone, Deserialize)]
struct ModelArtifact {
    #[serde(default = "default_version")]
    version: String,
    feature_order: Vec<String>,
    #[serde(flatten)]
    model: ModelKind,
}

fn default_version() -> String {
    "unversioned".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelKind {
    Logistic {
        intercept: f64,
        weights: Vec<f64>,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    Forest {
        trees: Vec<DecisionTree>,
    },
}

fn default_threshold() -> f64 {
    0.5
}

#[derive(Debug, Clone, Deserialize)]
struct DecisionTree {
    nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        class: u8,
    },
}

impl DecisionTree {
    /// Children must point forward, which rules out cycles.
    fn validate(&self, tree: usize) -> Result<(), ModelError> {
        let invalid = |reason: String| ModelError::InvalidTree { tree, reason };

        if self.nodes.is_empty() {
            return Err(invalid("no nodes".to_string()));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split { feature, left, right, .. } = *node {
                if feature >= FEATURE_COUNT {
                    return Err(invalid(format!("node {} splits on feature {}", idx, feature)));
                }
                for child in [left, right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(invalid(format!("node {} has bad child {}", idx, child)));
                    }
                }
            }
        }
        Ok(())
    }

    fn predict(&self, x: &[f64; FEATURE_COUNT]) -> u8 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                TreeNode::Leaf { class } => return class,
                TreeNode::Split { feature, threshold, left, right } => {
                    idx = if x[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

/// Pre-trained classifier, loaded once and shared read-only.
#[derive(Debug, Clone)]
pub struct Classifier {
    model: ModelKind,
    version: String,
    fingerprint: String,
}

impl Classifier {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = std::fs::read(path)?;
        let classifier = Self::from_slice(&content)?;
        info!(
            "Loaded {} classifier {} from {} (sha256 {})",
            classifier.kind(),
            classifier.version,
            path.display(),
            classifier.fingerprint
        );
        Ok(classifier)
    }

    pub fn from_slice(content: &[u8]) -> Result<Self, ModelError> {
        let artifact: ModelArtifact = serde_json::from_slice(content)?;
        check_feature_order(&artifact.feature_order)?;

        match &artifact.model {
            ModelKind::Logistic { weights, .. } if weights.len() != FEATURE_COUNT => {
                return Err(ModelError::WeightCount {
                    expected: FEATURE_COUNT,
                    found: weights.len(),
                });
            }
            ModelKind::Forest { trees } => {
                if trees.is_empty() {
                    return Err(ModelError::InvalidTree {
                        tree: 0,
                        reason: "forest has no trees".to_string(),
                    });
                }
                for (i, tree) in trees.iter().enumerate() {
                    tree.validate(i)?;
                }
            }
            _ => {}
        }

        Ok(Self {
            model: artifact.model,
            version: artifact.version,
            fingerprint: hex::encode(Sha256::digest(content)),
        })
    }

    pub fn predict(&self, record: &FeatureRecord) -> Label {
        Label::from_class(self.predict_class(&record.to_vector()))
    }

    fn predict_class(&self, x: &[f64; FEATURE_COUNT]) -> u8 {
        match &self.model {
            ModelKind::Logistic { intercept, weights, threshold } => {
                let z = intercept + weights.iter().zip(x.iter()).map(|(w, v)| w * v).sum::<f64>();
                let probability = 1.0 / (1.0 + (-z).exp());
                u8::from(probability >= *threshold)
            }
            ModelKind::Forest { trees } => {
                let votes = trees.iter().filter(|t| t.predict(x) == 1).count();
                // ties go to class 0
                u8::from(votes * 2 > trees.len())
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.model {
            ModelKind::Logistic { .. } => "logistic",
            ModelKind::Forest { .. } => "forest",
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn check_feature_order(order: &[String]) -> Result<(), ModelError> {
    for position in 0..FEATURE_COUNT.max(order.len()) {
        let expected = FEATURE_NAMES.get(position).copied().unwrap_or("<none>");
        let found = order.get(position).map(String::as_str).unwrap_or("<none>");
        if expected != found {
            return Err(ModelError::FeatureOrderMismatch {
                position,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    pub(crate) fn logistic_artifact(intercept: f64, weights: Vec<f64>) -> String {
        json!({
            "kind": "logistic",
            "version": "test",
            "feature_order": FEATURE_NAMES.to_vec(),
            "intercept": intercept,
            "weights": weights,
        })
        .to_string()
    }

    fn record_with(index: usize, value: f64) -> FeatureRecord {
        let mut x = [0.0; FEATURE_COUNT];
        x[index] = value;
        let map = FEATURE_NAMES
            .iter()
            .zip(x)
            .map(|(name, v)| (name.to_string(), json!(v)))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }

    #[test]
    fn test_logistic_threshold() {
        let mut weights = vec![0.0; FEATURE_COUNT];
        weights[2] = -10.0; // ip
        let classifier = Classifier::from_slice(logistic_artifact(5.0, weights).as_bytes()).unwrap();

        assert_eq!(classifier.kind(), "logistic");
        assert_eq!(classifier.predict(&record_with(2, 0.0)), Label::Legitimate);
        assert_eq!(classifier.predict(&record_with(2, 1.0)), Label::Suspicious);
    }

    #[test]
    fn test_feature_order_mismatch_rejected() {
        let mut order: Vec<&str> = FEATURE_NAMES.to_vec();
        order.swap(0, 1);
        let artifact = json!({
            "kind": "logistic",
            "feature_order": order,
            "intercept": 0.0,
            "weights": vec![0.0; FEATURE_COUNT],
        });
        let err = Classifier::from_slice(artifact.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ModelError::FeatureOrderMismatch { position: 0, .. }));

        let artifact = json!({
            "kind": "logistic",
            "feature_order": &FEATURE_NAMES[..45],
            "intercept": 0.0,
            "weights": vec![0.0; FEATURE_COUNT],
        });
        let err = Classifier::from_slice(artifact.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ModelError::FeatureOrderMismatch { position: 45, .. }));
    }

    #[test]
    fn test_weight_count_checked() {
        let err = Classifier::from_slice(logistic_artifact(0.0, vec![0.0; 3]).as_bytes()).unwrap_err();
        assert!(matches!(err, ModelError::WeightCount { found: 3, .. }));
    }

    fn stump(feature: usize, threshold: f64, left: u8, right: u8) -> serde_json::Value {
        json!({"nodes": [
            {"feature": feature, "threshold": threshold, "left": 1, "right": 2},
            {"class": left},
            {"class": right},
        ]})
    }

    #[test]
    fn test_forest_majority_vote() {
        // dns_record (43): resolvable hosts lean legitimate
        let artifact = json!({
            "kind": "forest",
            "feature_order": FEATURE_NAMES.to_vec(),
            "trees": [stump(43, 0.5, 0, 1), stump(43, 0.5, 0, 1), stump(2, 0.5, 1, 0)],
        });
        let classifier = Classifier::from_slice(artifact.to_string().as_bytes()).unwrap();
        assert_eq!(classifier.kind(), "forest");
        assert_eq!(classifier.predict(&record_with(43, 1.0)), Label::Legitimate);
        assert_eq!(classifier.predict(&record_with(43, 0.0)), Label::Suspicious);
    }

    #[test]
    fn test_forest_tie_is_suspicious() {
        let artifact = json!({
            "kind": "forest",
            "feature_order": FEATURE_NAMES.to_vec(),
            "trees": [stump(0, 10.0, 1, 0), stump(0, 10.0, 0, 1)],
        });
        let classifier = Classifier::from_slice(artifact.to_string().as_bytes()).unwrap();
        assert_eq!(classifier.predict(&record_with(0, 5.0)), Label::Suspicious);
    }

    #[test]
    fn test_invalid_trees_rejected() {
        let backwards = json!({"nodes": [
            {"feature": 0, "threshold": 1.0, "left": 0, "right": 1},
            {"class": 1},
        ]});
        let out_of_range = json!({"nodes": [
            {"feature": 99, "threshold": 1.0, "left": 1, "right": 2},
            {"class": 1},
            {"class": 0},
        ]});
        for tree in [backwards, out_of_range] {
            let artifact = json!({
                "kind": "forest",
                "feature_order": FEATURE_NAMES.to_vec(),
                "trees": [tree],
            });
            let err = Classifier::from_slice(artifact.to_string().as_bytes()).unwrap_err();
            assert!(matches!(err, ModelError::InvalidTree { tree: 0, .. }));
        }
    }

    #[test]
    fn test_load_from_file_records_fingerprint() {
        let artifact = logistic_artifact(0.0, vec![0.0; FEATURE_COUNT]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(artifact.as_bytes()).unwrap();

        let classifier = Classifier::load(file.path()).unwrap();
        assert_eq!(classifier.version(), "test");
        assert_eq!(classifier.fingerprint().len(), 64);
    }

    #[test]
    fn test_bundled_artifact_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/models/classifier.json");
        let classifier = Classifier::load(path).unwrap();
        assert_eq!(classifier.kind(), "logistic");
        assert_eq!(classifier.version(), "demo-0.1");
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let err = Classifier::load("/nonexistent/classifier.json").unwrap_err();
        assert!(matches!(err, ModelError::Io(_)));
    }
}
