//! Classifier crate entry point with flat, easy-to-import modules.

pub mod covariance;
pub mod features;
pub mod fisher;
pub mod gaussian;
pub mod heuristic;
pub mod seed;

pub use covariance::{
    CovarianceInverse, CovarianceMatrix, Factorization, FallbackReason, InversionMethod,
    class_covariance, cholesky, invert_covariance, mahalanobis_distance, pooled_covariance,
};
pub use features::{
    FRAME_FEATURE_NAMES, FeatureError, FeatureSet, FrameContext, LabelLookup, NoLabels, extract,
    extract_frame,
};
pub use fisher::{MIN_SAMPLES_FOR_IMPORTANCE, feature_importance, fisher_scores};
pub use gaussian::{
    Classification, ClassModel, GaussianParams, MIN_CLASS_SAMPLES, MIN_TOTAL_SAMPLES, Model,
    TrainConfig, TrainError, predict, train, train_with,
};
pub use heuristic::{LayoutHints, heuristic_predict};
pub use seed::seed_model;
