use caption_types::{
    Anchor, AnchorType, BoxBounds, CropBounds, DimensionError, FrameDims, LayoutConfig,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::density::{Edge, ProfileEdges, coverage_profile, find_edges};
use crate::stats::{binned_mode, filter_outliers, max_of, min_of, spread_around, std_dev};

pub const OUTLIER_K: f64 = 3.0;
const VERTICAL_BIN_PX: f64 = 5.0;
const SIZE_BIN_PX: f64 = 2.0;
const MODE_WINDOW_PX: f64 = 100.0;

const CENTER_TOLERANCE_RATIO: f64 = 0.05;
const CENTER_BALANCE_RATIO: f64 = 0.3;
const SIDE_DOMINANCE_RATIO: f64 = 1.2;

const MIN_VERTICAL_PAD_PX: f64 = 4.0;
const VERTICAL_PAD_RATIO: f64 = 0.2;
const ANCHOR_PAD_PX: f64 = 5.0;
// Caption glyphs are roughly square, so the box height doubles as a glyph width.
const FAR_SIDE_GLYPHS: f64 = 2.0;
const CENTER_GLYPHS: f64 = 1.0;
const FALLBACK_PAD_PX: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub outlier_k: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            outlier_k: OUTLIER_K,
        }
    }
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("no caption boxes to analyze")]
    NoData,
    #[error(transparent)]
    Dimensions(#[from] DimensionError),
}

/// Padding that grows as the edge gets fuzzier.
fn adaptive_padding(base: f64, sharpness: f64) -> f64 {
    let sharpness = if sharpness.is_finite() {
        sharpness.clamp(0.0, 1.0)
    } else {
        0.0
    };
    base * (1.0 + 2.0 * (1.0 - sharpness))
}

fn classify_anchor(edges: &ProfileEdges, center_of_mass: f64, frame_width: f64) -> AnchorType {
    let left = edges.rising.strength;
    let right = edges.falling.strength;
    let near_center =
        (center_of_mass - frame_width / 2.0).abs() <= frame_width * CENTER_TOLERANCE_RATIO;
    let stronger = left.max(right);
    let balanced = stronger > 0.0 && (left - right).abs() / stronger <= CENTER_BALANCE_RATIO;

    if near_center && balanced {
        AnchorType::Center
    } else if left >= right * SIDE_DOMINANCE_RATIO {
        AnchorType::Left
    } else if right >= left * SIDE_DOMINANCE_RATIO {
        AnchorType::Right
    } else if left >= right {
        AnchorType::Left
    } else {
        AnchorType::Right
    }
}

fn to_pixel(value: f64, limit: u32) -> u32 {
    value.round().clamp(0.0, limit as f64) as u32
}

/// Distribution statistics of one box coordinate.
struct Spread {
    mode: f64,
    std: f64,
}

fn spread(values: &[f64], bin: f64) -> Spread {
    let mode = binned_mode(values, bin).unwrap_or(0.0);
    Spread {
        mode,
        std: spread_around(values, mode, MODE_WINDOW_PX),
    }
}

/// Derives crop bounds and anchor from the boxes currently believed to be captions.
///
/// The result is a pure function of `boxes`, `dims` and `config`.
pub fn analyze_layout(
    boxes: &[BoxBounds],
    dims: FrameDims,
    config: &GeometryConfig,
) -> Result<LayoutConfig, GeometryError> {
    dims.validate()?;
    let boxes: Vec<&BoxBounds> = boxes
        .iter()
        .filter(|b| {
            b.left.is_finite() && b.top.is_finite() && b.right.is_finite() && b.bottom.is_finite()
        })
        .collect();
    if boxes.is_empty() {
        return Err(GeometryError::NoData);
    }
    let frame_width = dims.width as f64;

    let lefts = filter_outliers(
        &boxes.iter().map(|b| b.left).collect::<Vec<_>>(),
        config.outlier_k,
    );
    let rights = filter_outliers(
        &boxes.iter().map(|b| b.right).collect::<Vec<_>>(),
        config.outlier_k,
    );
    let centers: Vec<f64> = boxes.iter().map(|b| b.center_y()).collect();
    let heights: Vec<f64> = boxes.iter().map(|b| b.height()).collect();
    let tops: Vec<f64> = boxes.iter().map(|b| b.top).collect();
    let bottoms: Vec<f64> = boxes.iter().map(|b| b.bottom).collect();

    let vertical = spread(&centers, VERTICAL_BIN_PX);
    let height = spread(&heights, SIZE_BIN_PX);
    let top = spread(&tops, VERTICAL_BIN_PX);
    let bottom = spread(&bottoms, VERTICAL_BIN_PX);

    let band_half = (2.0 * vertical.std).max(height.mode);
    let mut band: Vec<&BoxBounds> = boxes
        .iter()
        .copied()
        .filter(|b| (b.center_y() - vertical.mode).abs() <= band_half)
        .collect();
    if band.is_empty() {
        band = boxes.clone();
    }

    let horizontal = find_edges(&coverage_profile(
        dims.width as usize,
        band.iter().map(|b| (b.left, b.right)),
    ));
    let vertical_edges = find_edges(&coverage_profile(
        dims.height as usize,
        band.iter().map(|b| (b.top, b.bottom)),
    ));

    let center_of_mass = band.iter().map(|b| b.center_x()).sum::<f64>() / band.len() as f64;
    let extent_left = min_of(&lefts);
    let extent_right = max_of(&rights);

    let (anchor, mut crop_left, mut crop_right) = match horizontal {
        Some(edges) => {
            let kind = classify_anchor(&edges, center_of_mass, frame_width);
            horizontal_crop(kind, &edges, center_of_mass, extent_left, extent_right, height.mode)
        }
        None => (
            Anchor {
                kind: AnchorType::Center,
                position: center_of_mass,
            },
            f64::NAN,
            f64::NAN,
        ),
    };

    let pad_base = MIN_VERTICAL_PAD_PX.max(VERTICAL_PAD_RATIO * height.mode);
    let (mut crop_top, mut crop_bottom) = match vertical_edges {
        Some(edges) => (
            edges.rising.position as f64
                - adaptive_padding(pad_base, edges.rising.sharpness(edges.peak)),
            edges.falling.position as f64
                + adaptive_padding(pad_base, edges.falling.sharpness(edges.peak)),
        ),
        None => (f64::NAN, f64::NAN),
    };

    if [crop_left, crop_right, crop_top, crop_bottom]
        .iter()
        .any(|v| v.is_nan())
    {
        log::warn!("crop bounds degenerate; falling back to observed extent with fixed padding");
        crop_left = min_of(&boxes.iter().map(|b| b.left).collect::<Vec<_>>()) - FALLBACK_PAD_PX;
        crop_right = max_of(&boxes.iter().map(|b| b.right).collect::<Vec<_>>()) + FALLBACK_PAD_PX;
        crop_top = min_of(&tops) - FALLBACK_PAD_PX;
        crop_bottom = max_of(&bottoms) + FALLBACK_PAD_PX;
    }

    let left = to_pixel(crop_left, dims.width);
    let top_px = to_pixel(crop_top, dims.height);
    let crop = CropBounds {
        left,
        top: top_px,
        right: to_pixel(crop_right, dims.width).max(left),
        bottom: to_pixel(crop_bottom, dims.height).max(top_px),
    };

    let anchor = if anchor.position.is_finite() {
        anchor
    } else {
        Anchor {
            kind: anchor.kind,
            position: (crop.left + crop.right) as f64 / 2.0,
        }
    };

    Ok(LayoutConfig {
        crop,
        anchor,
        vertical_position: vertical.mode,
        vertical_std: vertical.std,
        box_height: height.mode,
        box_height_std: height.std,
        top_edge_std: top.std,
        bottom_edge_std: bottom.std,
        left_edge_std: std_dev(&lefts),
        right_edge_std: std_dev(&rights),
        box_count: boxes.len(),
    })
}

fn horizontal_crop(
    kind: AnchorType,
    edges: &ProfileEdges,
    center_of_mass: f64,
    extent_left: f64,
    extent_right: f64,
    glyph: f64,
) -> (Anchor, f64, f64) {
    let anchor_pad = |edge: &Edge| adaptive_padding(ANCHOR_PAD_PX, edge.sharpness(edges.peak));
    let far_pad = FAR_SIDE_GLYPHS * glyph;
    match kind {
        AnchorType::Left => {
            let position = edges.rising.position as f64;
            (
                Anchor { kind, position },
                position - anchor_pad(&edges.rising),
                extent_right + far_pad,
            )
        }
        AnchorType::Right => {
            let position = edges.falling.position as f64;
            (
                Anchor { kind, position },
                extent_left - far_pad,
                position + anchor_pad(&edges.falling),
            )
        }
        AnchorType::Center => (
            Anchor {
                kind,
                position: center_of_mass,
            },
            extent_left - CENTER_GLYPHS * glyph,
            extent_right + CENTER_GLYPHS * glyph,
        ),
    }
}
