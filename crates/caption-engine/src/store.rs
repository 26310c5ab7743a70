use caption_classifier::Model;
use caption_types::{
    BoxId, CaptionSpan, FrameDims, Label, LabeledBox, LayoutRecord, OcrBox, Prediction,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("frame {0} is not known to the store")]
    UnknownFrame(u64),
    #[error("box {0} is not known to the store")]
    UnknownBox(BoxId),
    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Storage collaborator. Owns persistence and versioning; the engine only
/// reads snapshots from it and writes refreshed values back.
pub trait CaptionStore {
    fn frame_dims(&self) -> Result<FrameDims, StoreError>;

    /// Every frame with detected boxes, ascending.
    fn frame_indices(&self) -> Result<Vec<u64>, StoreError>;

    fn ocr_boxes_for_frame(&self, frame_index: u64) -> Result<Vec<OcrBox>, StoreError>;

    /// Caption span a frame belongs to, when the store tracks one.
    fn caption_span(&self, _frame_index: u64) -> Result<Option<CaptionSpan>, StoreError> {
        Ok(None)
    }

    fn labeled_boxes(&self) -> Result<Vec<LabeledBox>, StoreError>;

    fn label(&self, id: BoxId) -> Result<Option<Label>, StoreError>;

    fn prediction(&self, id: BoxId) -> Result<Option<Prediction>, StoreError>;

    fn put_prediction(&mut self, id: BoxId, prediction: Prediction) -> Result<(), StoreError>;

    fn model(&self) -> Result<Option<Model>, StoreError>;

    fn put_model(&mut self, model: Model) -> Result<(), StoreError>;

    fn layout(&self) -> Result<Option<LayoutRecord>, StoreError>;

    fn put_layout(&mut self, record: LayoutRecord) -> Result<(), StoreError>;
}
