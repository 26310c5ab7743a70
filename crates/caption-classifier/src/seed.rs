//! Hand-set model used until enough user labels exist to train one.

use crate::features::frame::FRAME_FEATURE_COUNT;
use crate::gaussian::{ClassModel, GaussianParams, Model, SEED_VERSION};

const SEED_PRIOR_IN: f64 = 0.3;

// (mean, std) per frame feature: top, bottom, height, clustering, aspect,
// vertical position, area, labeled-in, labeled-out.
const SEED_IN: [(f64, f64); FRAME_FEATURE_COUNT] = [
    (0.3, 0.5),
    (0.3, 0.5),
    (0.3, 0.5),
    (0.5, 0.7),
    (6.0, 4.0),
    (0.85, 0.08),
    (0.01, 0.01),
    (0.1, 0.3),
    (0.0, 0.1),
];

const SEED_OUT: [(f64, f64); FRAME_FEATURE_COUNT] = [
    (1.5, 1.2),
    (1.5, 1.2),
    (1.2, 1.0),
    (1.2, 1.0),
    (3.0, 3.0),
    (0.45, 0.25),
    (0.02, 0.03),
    (0.0, 0.1),
    (0.1, 0.3),
];

fn class_from(table: &[(f64, f64)], prior: f64) -> ClassModel {
    ClassModel {
        params: table
            .iter()
            .map(|&(mean, std)| GaussianParams::new(mean, std))
            .collect(),
        prior,
    }
}

/// The seed model for the per-frame feature configuration.
pub fn seed_model() -> Model {
    Model {
        version: SEED_VERSION.to_string(),
        epoch: 0,
        sample_count: 0,
        feature_count: FRAME_FEATURE_COUNT,
        in_class: class_from(&SEED_IN, SEED_PRIOR_IN),
        out_class: class_from(&SEED_OUT, 1.0 - SEED_PRIOR_IN),
    }
}
