//! Classifier contract, the linear artifact adapter, and the weighted registry.
//!
//! The registry is built once at startup and shared read-only (`Arc`) with the
//! ensemble. Weights are resolved at construction: known model names take
//! their recorded weight, unknown names an equal `1/n` share, and the result is
//! rescaled to sum to 1.0.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

/// Recorded weights for the standard three-model ensemble.
pub const DEFAULT_MODEL_WEIGHTS: [(&str, f64); 3] = [
    ("random_forest", 0.35),
    ("xgboost", 0.40),
    ("neural_net", 0.25),
];

const DISTRIBUTION_TOLERANCE: f64 = 1e-6;

/// Features reported per model by [`ClassifierRegistry::feature_importance`].
pub const TOP_FEATURES: usize = 15;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model {model} expects {expected} features, got {got}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        got: usize,
    },

    #[error("model {model} returned an invalid distribution: {detail}")]
    InvalidOutput { model: String, detail: String },

    #[error("model {model} failed during inference: {reason}")]
    Inference { model: String, reason: String },
}

/// A trained model that can score a feature vector.
pub trait ClassifierVote: Send + Sync {
    fn name(&self) -> &str;

    /// `[p_away_win, p_home_win]`, summing to 1.0.
    fn predict_probability(&self, features: &FeatureVector) -> Result<[f64; 2], ClassifierError>;

    /// Relative importance of each feature, in `FEATURE_NAMES` order, for
    /// models that can explain themselves.
    fn feature_importance(&self) -> Option<Vec<f64>> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedFeature {
    pub feature: &'static str,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureImportance {
    pub model: String,
    pub features: Vec<RankedFeature>,
}

/// Pair importances with feature names, most important first (stable on ties).
pub fn rank_features(importances: &[f64], top: usize) -> Vec<RankedFeature> {
    let mut ranked: Vec<RankedFeature> = FEATURE_NAMES
        .iter()
        .zip(importances)
        .map(|(name, imp)| RankedFeature {
            feature: *name,
            importance: *imp,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.importance
            .partial_cmp(&a.importance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(top);
    ranked
}

/// Reject distributions that are non-finite, negative or do not sum to one.
pub fn check_distribution(model: &str, p: [f64; 2]) -> Result<[f64; 2], ClassifierError> {
    if p.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(ClassifierError::InvalidOutput {
            model: model.to_string(),
            detail: format!("{:?}", p),
        });
    }
    let sum = p[0] + p[1];
    if (sum - 1.0).abs() > DISTRIBUTION_TOLERANCE {
        return Err(ClassifierError::InvalidOutput {
            model: model.to_string(),
            detail: format!("sums to {:.6}", sum),
        });
    }
    Ok(p)
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

/// On-disk model artifact, one JSON file per model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    Logistic {
        name: String,
        intercept: f64,
        coefficients: Vec<f64>,
    },
}

/// Linear model over the feature vector: `p_home = sigmoid(b + w·x)`.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    name: String,
    intercept: f64,
    coefficients: Vec<f64>,
}

impl LogisticModel {
    pub fn new(name: impl Into<String>, intercept: f64, coefficients: Vec<f64>) -> Self {
        LogisticModel {
            name: name.into(),
            intercept,
            coefficients,
        }
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        match artifact {
            ModelArtifact::Logistic {
                name,
                intercept,
                coefficients,
            } => LogisticModel::new(name, intercept, coefficients),
        }
    }
}

impl ClassifierVote for LogisticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_probability(&self, features: &FeatureVector) -> Result<[f64; 2], ClassifierError> {
        if self.coefficients.len() != features.len() {
            return Err(ClassifierError::DimensionMismatch {
                model: self.name.clone(),
                expected: self.coefficients.len(),
                got: features.len(),
            });
        }
        let z = self.intercept
            + self
                .coefficients
                .iter()
                .zip(features.as_slice())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        if !z.is_finite() {
            return Err(ClassifierError::Inference {
                model: self.name.clone(),
                reason: "non-finite logit".into(),
            });
        }
        let p_home = sigmoid(z);
        check_distribution(&self.name, [1.0 - p_home, p_home])
    }

    /// Coefficient magnitudes scaled to sum to 1.0.
    fn feature_importance(&self) -> Option<Vec<f64>> {
        if self.coefficients.len() != FEATURE_COUNT {
            return None;
        }
        let total: f64 = self.coefficients.iter().map(|w| w.abs()).sum();
        if !total.is_finite() || total <= 0.0 {
            return Some(vec![0.0; FEATURE_COUNT]);
        }
        Some(self.coefficients.iter().map(|w| w.abs() / total).collect())
    }
}

#[derive(Clone)]
pub struct RegisteredModel {
    pub model: Arc<dyn ClassifierVote>,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub weight: f64,
}

/// Immutable set of classifiers with resolved voting weights.
#[derive(Clone, Default)]
pub struct ClassifierRegistry {
    models: Vec<RegisteredModel>,
}

impl ClassifierRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register models using [`DEFAULT_MODEL_WEIGHTS`].
    pub fn new(models: Vec<Arc<dyn ClassifierVote>>) -> Self {
        let recorded: HashMap<String, f64> = DEFAULT_MODEL_WEIGHTS
            .iter()
            .map(|(n, w)| (n.to_string(), *w))
            .collect();
        Self::with_weights(models, &recorded)
    }

    pub fn with_weights(models: Vec<Arc<dyn ClassifierVote>>, recorded: &HashMap<String, f64>) -> Self {
        let n = models.len();
        if n == 0 {
            return Self::empty();
        }
        let fallback = 1.0 / n as f64;
        let raw: Vec<f64> = models
            .iter()
            .map(|m| {
                recorded
                    .get(m.name())
                    .copied()
                    .filter(|w| w.is_finite() && *w > 0.0)
                    .unwrap_or(fallback)
            })
            .collect();
        let total: f64 = raw.iter().sum();
        let models = models
            .into_iter()
            .zip(raw)
            .map(|(model, w)| RegisteredModel {
                model,
                weight: if total > 0.0 { w / total } else { fallback },
            })
            .collect();
        ClassifierRegistry { models }
    }

    /// Load every `*.json` artifact in `dir`. Unreadable artifacts are skipped
    /// with a warning; a missing directory yields an empty registry.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            warn!(
                "Models directory {} not found, predictions will use the baseline heuristic",
                dir.display()
            );
            return Ok(Self::empty());
        }
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read models directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut models: Vec<Arc<dyn ClassifierVote>> = Vec::new();
        for path in paths {
            match load_artifact(&path) {
                Ok(model) => {
                    info!("Loaded model: {} ({})", model.name(), path.display());
                    models.push(Arc::new(model));
                }
                Err(e) => warn!("Could not load model {}: {:#}", path.display(), e),
            }
        }
        if models.is_empty() {
            warn!("No trained models found, will use baseline predictions");
        }
        Ok(Self::new(models))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredModel> {
        self.models.iter()
    }

    pub fn total_weight(&self) -> f64 {
        self.models.iter().map(|m| m.weight).sum()
    }

    /// Ranked importances for every model that exposes them.
    pub fn feature_importance(&self, top: usize) -> Vec<FeatureImportance> {
        self.models
            .iter()
            .filter_map(|m| {
                m.model.feature_importance().map(|imp| FeatureImportance {
                    model: m.model.name().to_string(),
                    features: rank_features(&imp, top),
                })
            })
            .collect()
    }

    pub fn describe(&self) -> Vec<ModelInfo> {
        self.models
            .iter()
            .map(|m| ModelInfo {
                name: m.model.name().to_string(),
                weight: m.weight,
            })
            .collect()
    }
}

fn load_artifact(path: &Path) -> Result<LogisticModel> {
    let raw = std::fs::read_to_string(path)?;
    let artifact: ModelArtifact = serde_json::from_str(&raw).context("invalid model artifact")?;
    let model = LogisticModel::from_artifact(artifact);
    if model.coefficients.len() != FEATURE_COUNT {
        anyhow::bail!(
            "artifact has {} coefficients, expected {}",
            model.coefficients.len(),
            FEATURE_COUNT
        );
    }
    Ok(model)
}
