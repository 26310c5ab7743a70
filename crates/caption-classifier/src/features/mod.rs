pub mod frame;
pub mod neighborhood;
pub mod streaming;

pub use frame::{FRAME_FEATURE_COUNT, FRAME_FEATURE_NAMES, extract_frame_features};
pub use streaming::{STREAMING_FEATURE_COUNT, extract_streaming_features};

use caption_types::{BoxId, CaptionSpan, DimensionError, FeatureVector, FrameDims, Label, OcrBox};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error(transparent)]
    Dimensions(#[from] DimensionError),
}

/// Injected capability answering "was this box labeled by the user?".
pub trait LabelLookup {
    fn label(&self, id: BoxId) -> Option<Label>;
}

/// Lookup used when no label source is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLabels;

impl LabelLookup for NoLabels {
    fn label(&self, _: BoxId) -> Option<Label> {
        None
    }
}

impl<F> LabelLookup for F
where
    F: Fn(BoxId) -> Option<Label>,
{
    fn label(&self, id: BoxId) -> Option<Label> {
        self(id)
    }
}

/// The two extractor configurations kept side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSet {
    /// 9 features, used by per-frame prediction.
    Frame,
    /// 26 features, used for streaming-update similarity.
    Streaming,
}

impl FeatureSet {
    pub fn len(self) -> usize {
        match self {
            FeatureSet::Frame => FRAME_FEATURE_COUNT,
            FeatureSet::Streaming => STREAMING_FEATURE_COUNT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureSet::Frame => "frame",
            FeatureSet::Streaming => "streaming",
        }
    }
}

/// Everything the extractors need besides the target box.
pub struct FrameContext<'a> {
    pub boxes: &'a [OcrBox],
    pub dims: FrameDims,
    pub labels: &'a dyn LabelLookup,
    pub span: Option<CaptionSpan>,
}

impl<'a> FrameContext<'a> {
    pub fn new(boxes: &'a [OcrBox], dims: FrameDims, labels: &'a dyn LabelLookup) -> Self {
        Self {
            boxes,
            dims,
            labels,
            span: None,
        }
    }

    pub fn with_span(mut self, span: Option<CaptionSpan>) -> Self {
        self.span = span;
        self
    }

    pub(crate) fn others(&self, target: &OcrBox) -> impl Iterator<Item = &'a OcrBox> + '_ {
        let id = target.id;
        self.boxes.iter().filter(move |other| other.id != id)
    }

    pub(crate) fn label_flags(&self, id: BoxId) -> (f64, f64) {
        match self.labels.label(id) {
            Some(Label::In) => (1.0, 0.0),
            Some(Label::Out) => (0.0, 1.0),
            None => (0.0, 0.0),
        }
    }
}

pub fn extract(
    set: FeatureSet,
    target: &OcrBox,
    context: &FrameContext<'_>,
) -> Result<FeatureVector, FeatureError> {
    match set {
        FeatureSet::Frame => extract_frame_features(target, context),
        FeatureSet::Streaming => extract_streaming_features(target, context),
    }
}

/// Extracts features for every box of a frame in input order.
pub fn extract_frame(
    set: FeatureSet,
    context: &FrameContext<'_>,
) -> Result<Vec<(BoxId, FeatureVector)>, FeatureError> {
    context
        .boxes
        .iter()
        .map(|ocr_box| extract(set, ocr_box, context).map(|features| (ocr_box.id, features)))
        .collect()
}

pub(crate) fn aspect_ratio(target: &OcrBox) -> f64 {
    let height = target.bounds.height();
    if height <= 0.0 {
        return 0.0;
    }
    target.bounds.width() / height
}
