//! Shared domain models for the caption-layout workspace.
//!
//! This crate centralizes lightweight values used across the classifier,
//! streaming scheduler, geometry analyzer, engine, and CLI crates. Keep it free
//! of numeric algorithms and storage concerns so every crate can depend on it.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies one OCR box: `(frame_index, box_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BoxId {
    pub frame_index: u64,
    pub box_index: u32,
}

impl BoxId {
    pub fn new(frame_index: u64, box_index: u32) -> Self {
        Self {
            frame_index,
            box_index,
        }
    }
}

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.frame_index, self.box_index)
    }
}

#[derive(Debug, Error)]
#[error("invalid box id '{0}' (expected '<frame>:<box>')")]
pub struct BoxIdParseError(pub String);

impl FromStr for BoxId {
    type Err = BoxIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || BoxIdParseError(trimmed.to_string());
        let (frame, index) = trimmed.split_once(':').ok_or_else(invalid)?;
        let frame_index = frame.trim().parse().map_err(|_| invalid())?;
        let box_index = index.trim().parse().map_err(|_| invalid())?;
        Ok(BoxId::new(frame_index, box_index))
    }
}

/// Pixel bounds of a detected text region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxBounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoxBounds {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f64 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.bottom - self.top).max(0.0)
    }

    pub fn center_x(&self) -> f64 {
        (self.left + self.right) * 0.5
    }

    pub fn center_y(&self) -> f64 {
        (self.top + self.bottom) * 0.5
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// A detected OCR box as handed over by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrBox {
    pub id: BoxId,
    pub bounds: BoxBounds,
    #[serde(default)]
    pub text: String,
}

impl OcrBox {
    pub fn new(id: BoxId, bounds: BoxBounds, text: impl Into<String>) -> Self {
        Self {
            id,
            bounds,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDims {
    pub width: u32,
    pub height: u32,
}

impl FrameDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn validate(&self) -> Result<(), DimensionError> {
        if self.width == 0 || self.height == 0 {
            return Err(DimensionError {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("frame dimensions must be positive (got {width}x{height})")]
pub struct DimensionError {
    pub width: u32,
    pub height: u32,
}

/// Caption membership of a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    In,
    Out,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::In => "in",
            Label::Out => "out",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Label::In => Label::Out,
            Label::Out => Label::In,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown label '{0}' (expected 'in' or 'out')")]
pub struct LabelParseError(pub String);

impl FromStr for Label {
    type Err = LabelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "in" => Ok(Label::In),
            "out" => Ok(Label::Out),
            _ => Err(LabelParseError(lower)),
        }
    }
}

/// Fixed-length ordered feature values derived from a box and its frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn filled(len: usize, value: f64) -> Self {
        Self(vec![value; len])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl Deref for FeatureVector {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub features: FeatureVector,
    pub label: Label,
}

impl LabeledSample {
    pub fn new(features: impl Into<FeatureVector>, label: Label) -> Self {
        Self {
            features: features.into(),
            label,
        }
    }
}

/// A user label attached to a stored box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledBox {
    pub ocr_box: OcrBox,
    pub label: Label,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    pub confidence: f64,
    pub model_version: String,
}

impl Prediction {
    pub fn new(label: Label, confidence: f64, model_version: impl Into<String>) -> Self {
        Self {
            label,
            confidence,
            model_version: model_version.into(),
        }
    }
}

/// Frame range of the caption a box belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionSpan {
    pub start_frame: u64,
    pub end_frame: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorType {
    Left,
    Center,
    Right,
}

impl AnchorType {
    pub fn as_str(self) -> &'static str {
        match self {
            AnchorType::Left => "left",
            AnchorType::Center => "center",
            AnchorType::Right => "right",
        }
    }
}

impl fmt::Display for AnchorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    #[serde(rename = "type")]
    pub kind: AnchorType,
    pub position: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropBounds {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropBounds {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Caption crop region, anchor, and the distribution parameters it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    pub crop: CropBounds,
    pub anchor: Anchor,
    pub vertical_position: f64,
    pub vertical_std: f64,
    pub box_height: f64,
    pub box_height_std: f64,
    pub top_edge_std: f64,
    pub bottom_edge_std: f64,
    pub left_edge_std: f64,
    pub right_edge_std: f64,
    pub box_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutRecord {
    pub config: LayoutConfig,
    pub crop_bounds_version: u64,
}
