use caption_classifier::{
    MIN_CLASS_SAMPLES, MIN_SAMPLES_FOR_IMPORTANCE, MIN_TOTAL_SAMPLES, TrainConfig,
};
use caption_geometry::{GeometryConfig, OUTLIER_K};
use caption_stream::{MIN_CHANGE_PROBABILITY, RecalcConfig};
use serde::{Deserialize, Serialize};

/// Tunables for the engine. Every field falls back to its documented default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub min_total_samples: usize,
    pub min_class_samples: usize,
    pub importance_min_samples: usize,
    pub batch_size: usize,
    pub reversal_window: usize,
    pub min_boxes_before_check: usize,
    pub reversal_threshold: f64,
    pub max_boxes_per_update: usize,
    pub min_change_probability: f64,
    pub outlier_k: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let recalc = RecalcConfig::default();
        Self {
            min_total_samples: MIN_TOTAL_SAMPLES,
            min_class_samples: MIN_CLASS_SAMPLES,
            importance_min_samples: MIN_SAMPLES_FOR_IMPORTANCE,
            batch_size: recalc.batch_size,
            reversal_window: recalc.reversal_window,
            min_boxes_before_check: recalc.min_boxes_before_check,
            reversal_threshold: recalc.reversal_threshold,
            max_boxes_per_update: recalc.max_boxes_per_update,
            min_change_probability: MIN_CHANGE_PROBABILITY,
            outlier_k: OUTLIER_K,
        }
    }
}

impl EngineSettings {
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            min_total_samples: self.min_total_samples,
            min_class_samples: self.min_class_samples,
        }
    }

    pub fn recalc_config(&self) -> RecalcConfig {
        RecalcConfig {
            batch_size: self.batch_size,
            reversal_window: self.reversal_window,
            min_boxes_before_check: self.min_boxes_before_check,
            reversal_threshold: self.reversal_threshold,
            max_boxes_per_update: self.max_boxes_per_update,
        }
    }

    pub fn geometry_config(&self) -> GeometryConfig {
        GeometryConfig {
            outlier_k: self.outlier_k,
        }
    }
}
