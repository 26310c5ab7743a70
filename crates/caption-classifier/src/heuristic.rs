use caption_types::{BoxBounds, FrameDims, Label, LayoutConfig};

use crate::gaussian::Classification;

const VERTICAL_WEIGHT: f64 = 0.6;
const HEIGHT_WEIGHT: f64 = 0.4;
const MIN_CONFIDENCE: f64 = 0.5;
const CONFIDENCE_SPAN: f64 = 0.3;

// Defaults relative to frame height when no layout has been analyzed yet.
const DEFAULT_BAND_CENTER: f64 = 0.85;
const DEFAULT_BAND_TOLERANCE: f64 = 0.08;
const DEFAULT_BOX_HEIGHT: f64 = 0.06;
const HEIGHT_TOLERANCE_RATIO: f64 = 0.5;
const MIN_TOLERANCE_PX: f64 = 1.0;

/// Where a caption is expected to sit, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutHints {
    pub band_center: f64,
    pub band_tolerance: f64,
    pub box_height: f64,
}

impl LayoutHints {
    pub fn defaults(dims: FrameDims) -> Self {
        let height = dims.height as f64;
        Self {
            band_center: height * DEFAULT_BAND_CENTER,
            band_tolerance: height * DEFAULT_BAND_TOLERANCE,
            box_height: height * DEFAULT_BOX_HEIGHT,
        }
    }

    pub fn from_layout(layout: &LayoutConfig, dims: FrameDims) -> Self {
        let fallback = Self::defaults(dims);
        let band_tolerance = if layout.vertical_std > 0.0 {
            layout.vertical_std
        } else {
            fallback.band_tolerance
        };
        let box_height = if layout.box_height > 0.0 {
            layout.box_height
        } else {
            fallback.box_height
        };
        Self {
            band_center: layout.vertical_position,
            band_tolerance,
            box_height,
        }
    }
}

fn proximity(value: f64, expected: f64, tolerance: f64) -> f64 {
    let z = (value - expected) / tolerance.max(MIN_TOLERANCE_PX);
    (-0.5 * z * z).exp()
}

/// Stateless fallback used when no usable model exists. Always succeeds.
pub fn heuristic_predict(bounds: &BoxBounds, hints: &LayoutHints) -> Classification {
    let vertical = proximity(bounds.center_y(), hints.band_center, hints.band_tolerance);
    let height = proximity(
        bounds.height(),
        hints.box_height,
        hints.box_height * HEIGHT_TOLERANCE_RATIO,
    );
    let score = VERTICAL_WEIGHT * vertical + HEIGHT_WEIGHT * height;
    if !score.is_finite() {
        return Classification::undecided();
    }

    let label = if score >= 0.5 { Label::In } else { Label::Out };
    let margin = ((score - 0.5).abs() * 2.0).min(1.0);
    Classification {
        label,
        confidence: MIN_CONFIDENCE + CONFIDENCE_SPAN * margin,
    }
}
