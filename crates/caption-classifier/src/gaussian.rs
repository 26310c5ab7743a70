//! Gaussian Naive-Bayes over fixed-length feature vectors.
//!
//! Posteriors are always accumulated in log space. Multiplying a dozen or more
//! small densities underflows to exactly zero for both classes, so the product
//! form is never used.

use std::f64::consts::PI;

use caption_types::{FeatureVector, Label, LabeledSample};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_TOTAL_SAMPLES: usize = 10;
pub const MIN_CLASS_SAMPLES: usize = 2;
pub const STD_FLOOR: f64 = 0.01;
const PDF_FLOOR: f64 = 1e-300;
pub const SEED_VERSION: &str = "seed";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredParams")]
pub struct GaussianParams {
    pub mean: f64,
    pub std: f64,
}

/// Wire form of [`GaussianParams`]; the std floor is reapplied on load.
#[derive(Deserialize)]
struct StoredParams {
    mean: f64,
    std: f64,
}

impl From<StoredParams> for GaussianParams {
    fn from(stored: StoredParams) -> Self {
        GaussianParams::new(stored.mean, stored.std)
    }
}

impl GaussianParams {
    pub fn new(mean: f64, std: f64) -> Self {
        Self {
            mean,
            std: std.max(STD_FLOOR),
        }
    }

    pub fn pdf(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.std;
        (-0.5 * z * z).exp() / (self.std * (2.0 * PI).sqrt())
    }

    /// `ln(pdf(x))` with the density floored before the logarithm.
    pub fn log_pdf(&self, x: f64) -> f64 {
        let pdf = self.pdf(x);
        if pdf.is_nan() {
            return PDF_FLOOR.ln();
        }
        pdf.max(PDF_FLOOR).ln()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassModel {
    pub params: Vec<GaussianParams>,
    pub prior: f64,
}

impl ClassModel {
    pub fn log_likelihood(&self, features: &[f64]) -> f64 {
        self.params
            .iter()
            .zip(features)
            .map(|(param, &x)| param.log_pdf(x))
            .sum()
    }

    pub fn log_posterior(&self, features: &[f64]) -> f64 {
        self.log_likelihood(features) + self.prior.max(PDF_FLOOR).ln()
    }

    fn fit(vectors: &[&FeatureVector], feature_count: usize, prior: f64) -> Self {
        let n = vectors.len() as f64;
        let params = (0..feature_count)
            .map(|i| {
                let mean = vectors.iter().map(|v| v[i]).sum::<f64>() / n;
                let variance = vectors
                    .iter()
                    .map(|v| {
                        let d = v[i] - mean;
                        d * d
                    })
                    .sum::<f64>()
                    / n;
                GaussianParams::new(mean, variance.sqrt())
            })
            .collect();
        Self { params, prior }
    }
}

/// Classifier state. Immutable during prediction; replaced wholesale by retraining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub version: String,
    pub epoch: u64,
    pub sample_count: usize,
    pub feature_count: usize,
    #[serde(rename = "in")]
    pub in_class: ClassModel,
    #[serde(rename = "out")]
    pub out_class: ClassModel,
}

impl Model {
    pub fn is_seed(&self) -> bool {
        self.sample_count == 0
    }
}

pub fn trained_version(epoch: u64) -> String {
    format!("gnb-{epoch}")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrainError {
    #[error("insufficient training data: {total} samples ({in_count} in, {out_count} out)")]
    InsufficientData {
        total: usize,
        in_count: usize,
        out_count: usize,
    },
    #[error("sample {index} has {actual} features, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

/// Minimum data required before a model is fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainConfig {
    pub min_total_samples: usize,
    pub min_class_samples: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            min_total_samples: MIN_TOTAL_SAMPLES,
            min_class_samples: MIN_CLASS_SAMPLES,
        }
    }
}

/// Fits per-class, per-feature Gaussians. `previous_epoch` is the epoch of the
/// model being replaced; the result carries the next one.
pub fn train(
    samples: &[LabeledSample],
    feature_count: usize,
    previous_epoch: u64,
) -> Result<Model, TrainError> {
    train_with(&TrainConfig::default(), samples, feature_count, previous_epoch)
}

pub fn train_with(
    config: &TrainConfig,
    samples: &[LabeledSample],
    feature_count: usize,
    previous_epoch: u64,
) -> Result<Model, TrainError> {
    if let Some((index, sample)) = samples
        .iter()
        .enumerate()
        .find(|(_, s)| s.features.len() != feature_count)
    {
        return Err(TrainError::DimensionMismatch {
            index,
            expected: feature_count,
            actual: sample.features.len(),
        });
    }

    let in_vectors: Vec<&FeatureVector> = samples
        .iter()
        .filter(|s| s.label == Label::In)
        .map(|s| &s.features)
        .collect();
    let out_vectors: Vec<&FeatureVector> = samples
        .iter()
        .filter(|s| s.label == Label::Out)
        .map(|s| &s.features)
        .collect();

    let total = samples.len();
    let min_class = config.min_class_samples.max(1);
    if total < config.min_total_samples.max(min_class * 2)
        || in_vectors.len() < min_class
        || out_vectors.len() < min_class
    {
        return Err(TrainError::InsufficientData {
            total,
            in_count: in_vectors.len(),
            out_count: out_vectors.len(),
        });
    }

    let prior_in = in_vectors.len() as f64 / total as f64;
    let epoch = previous_epoch + 1;
    let model = Model {
        version: trained_version(epoch),
        epoch,
        sample_count: total,
        feature_count,
        in_class: ClassModel::fit(&in_vectors, feature_count, prior_in),
        out_class: ClassModel::fit(&out_vectors, feature_count, 1.0 - prior_in),
    };
    log::debug!(
        "trained {} on {} samples (prior_in={:.3})",
        model.version,
        total,
        prior_in
    );
    Ok(model)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: Label,
    pub confidence: f64,
}

impl Classification {
    pub fn undecided() -> Self {
        Self {
            label: Label::In,
            confidence: 0.5,
        }
    }
}

/// Log-space Naive-Bayes prediction normalized with the log-sum-exp trick.
pub fn predict(features: &[f64], model: &Model) -> Classification {
    let log_in = model.in_class.log_posterior(features);
    let log_out = model.out_class.log_posterior(features);
    let max = log_in.max(log_out);
    if !max.is_finite() {
        return Classification::undecided();
    }

    let p_in = (log_in - max).exp();
    let p_out = (log_out - max).exp();
    let total = p_in + p_out;
    if total <= 0.0 || !total.is_finite() {
        return Classification::undecided();
    }

    let posterior_in = p_in / total;
    if posterior_in >= 0.5 {
        Classification {
            label: Label::In,
            confidence: posterior_in,
        }
    } else {
        Classification {
            label: Label::Out,
            confidence: 1.0 - posterior_in,
        }
    }
}
