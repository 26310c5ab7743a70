//! Per-class and pooled covariance, inversion, and Mahalanobis distance.
//!
//! Inversion never fails: when the Cholesky factorization finds a non-positive
//! pivot, the inverse degrades to the reciprocal diagonal (the Naive-Bayes
//! independence assumption).

use std::fmt;

use caption_types::FeatureVector;
use serde::{Deserialize, Serialize};

// Diagonal entries at or below this are treated as unit variance in the fallback.
const MIN_DIAGONAL: f64 = 1e-10;

/// Square `F x F` matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    size: usize,
    data: Vec<f64>,
}

impl CovarianceMatrix {
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            data: vec![0.0; size * size],
        }
    }

    pub fn identity(size: usize) -> Self {
        let mut matrix = Self::zeros(size);
        for i in 0..size {
            matrix.set(i, i, 1.0);
        }
        matrix
    }

    /// Builds a matrix from row-major data; `None` when the length is not a square.
    pub fn from_row_major(size: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == size * size).then_some(Self { size, data })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.size + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.size + col] = value;
    }

    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.size == other.size
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    fn scaled_add(&mut self, other: &Self, weight: f64) {
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            *dst += src * weight;
        }
    }
}

/// Sample covariance normalized by `n - 1`.
///
/// Fewer than two samples carry no variance information, so the identity is
/// returned instead of an error.
pub fn class_covariance(samples: &[&FeatureVector], feature_count: usize) -> CovarianceMatrix {
    if samples.len() < 2 {
        return CovarianceMatrix::identity(feature_count);
    }
    let n = samples.len() as f64;
    let means: Vec<f64> = (0..feature_count)
        .map(|i| samples.iter().map(|s| s[i]).sum::<f64>() / n)
        .collect();

    let mut matrix = CovarianceMatrix::zeros(feature_count);
    for i in 0..feature_count {
        for j in i..feature_count {
            let sum: f64 = samples
                .iter()
                .map(|s| (s[i] - means[i]) * (s[j] - means[j]))
                .sum();
            let value = sum / (n - 1.0);
            matrix.set(i, j, value);
            matrix.set(j, i, value);
        }
    }
    matrix
}

/// Sample-count weighted blend of the two class covariances.
pub fn pooled_covariance(
    in_samples: &[&FeatureVector],
    out_samples: &[&FeatureVector],
    feature_count: usize,
) -> CovarianceMatrix {
    let total = in_samples.len() + out_samples.len();
    if total < 2 {
        return CovarianceMatrix::identity(feature_count);
    }
    let total = total as f64;
    let in_cov = class_covariance(in_samples, feature_count);
    let out_cov = class_covariance(out_samples, feature_count);

    let mut pooled = CovarianceMatrix::zeros(feature_count);
    pooled.scaled_add(&in_cov, in_samples.len() as f64 / total);
    pooled.scaled_add(&out_cov, out_samples.len() as f64 / total);
    pooled
}

/// Lower-triangular Cholesky factor `L` with `A = L * L^T`.
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskyFactor(CovarianceMatrix);

#[derive(Debug, Clone, PartialEq)]
pub enum Factorization {
    Factorized(CholeskyFactor),
    NotPositiveDefinite { pivot: usize, value: f64 },
}

pub fn cholesky(matrix: &CovarianceMatrix) -> Factorization {
    let n = matrix.size();
    let mut lower = CovarianceMatrix::zeros(n);
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix.get(i, j);
            for k in 0..j {
                sum -= lower.get(i, k) * lower.get(j, k);
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return Factorization::NotPositiveDefinite {
                        pivot: i,
                        value: sum,
                    };
                }
                lower.set(i, i, sum.sqrt());
            } else {
                lower.set(i, j, sum / lower.get(j, j));
            }
        }
    }
    Factorization::Factorized(CholeskyFactor(lower))
}

impl CholeskyFactor {
    /// Inverts `L` by forward substitution, column by column.
    fn invert_lower(&self) -> CovarianceMatrix {
        let lower = &self.0;
        let n = lower.size();
        let mut inv = CovarianceMatrix::zeros(n);
        for col in 0..n {
            inv.set(col, col, 1.0 / lower.get(col, col));
            for row in col + 1..n {
                let mut sum = 0.0;
                for k in col..row {
                    sum -= lower.get(row, k) * inv.get(k, col);
                }
                inv.set(row, col, sum / lower.get(row, row));
            }
        }
        inv
    }

    /// `A^-1 = L^-T * L^-1`.
    pub fn inverse(&self) -> CovarianceMatrix {
        let l_inv = self.invert_lower();
        let n = l_inv.size();
        let mut result = CovarianceMatrix::zeros(n);
        for i in 0..n {
            for j in i..n {
                let start = i.max(j);
                let value: f64 = (start..n).map(|k| l_inv.get(k, i) * l_inv.get(k, j)).sum();
                result.set(i, j, value);
                result.set(j, i, value);
            }
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InversionMethod {
    Cholesky,
    Diagonal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    NotPositiveDefinite { pivot: usize, value: f64 },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NotPositiveDefinite { pivot, value } => write!(
                f,
                "covariance not positive definite (pivot {pivot} = {value:.3e})"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceInverse {
    pub matrix: CovarianceMatrix,
    pub method: InversionMethod,
    pub fallback: Option<FallbackReason>,
}

impl CovarianceInverse {
    pub fn identity(size: usize) -> Self {
        Self {
            matrix: CovarianceMatrix::identity(size),
            method: InversionMethod::Cholesky,
            fallback: None,
        }
    }

    pub fn size(&self) -> usize {
        self.matrix.size()
    }
}

fn diagonal_inverse(matrix: &CovarianceMatrix) -> CovarianceMatrix {
    let n = matrix.size();
    let mut inv = CovarianceMatrix::zeros(n);
    for i in 0..n {
        let d = matrix.get(i, i);
        let value = if d > MIN_DIAGONAL && d.is_finite() {
            1.0 / d
        } else {
            1.0
        };
        inv.set(i, i, value);
    }
    inv
}

/// Inverts a covariance matrix, degrading to a diagonal approximation.
pub fn invert_covariance(matrix: &CovarianceMatrix) -> CovarianceInverse {
    match cholesky(matrix) {
        Factorization::Factorized(factor) => CovarianceInverse {
            matrix: factor.inverse(),
            method: InversionMethod::Cholesky,
            fallback: None,
        },
        Factorization::NotPositiveDefinite { pivot, value } => {
            let reason = FallbackReason::NotPositiveDefinite { pivot, value };
            log::warn!("{reason}; using diagonal approximation");
            CovarianceInverse {
                matrix: diagonal_inverse(matrix),
                method: InversionMethod::Diagonal,
                fallback: Some(reason),
            }
        }
    }
}

/// `sqrt(max(0, (x - y)^T * S^-1 * (x - y)))`.
pub fn mahalanobis_distance(x: &[f64], y: &[f64], inverse: &CovarianceMatrix) -> f64 {
    let n = inverse.size().min(x.len()).min(y.len());
    let diff: Vec<f64> = x.iter().zip(y).take(n).map(|(a, b)| a - b).collect();
    let mut quad = 0.0;
    for i in 0..n {
        if diff[i] == 0.0 {
            continue;
        }
        let row: f64 = (0..n).map(|j| inverse.get(i, j) * diff[j]).sum();
        quad += diff[i] * row;
    }
    if !quad.is_finite() {
        return f64::INFINITY;
    }
    quad.max(0.0).sqrt()
}
