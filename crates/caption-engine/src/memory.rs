use std::collections::{BTreeMap, HashMap};

use caption_classifier::Model;
use caption_types::{
    BoxId, CaptionSpan, FrameDims, Label, LabeledBox, LayoutRecord, OcrBox, Prediction,
};

use crate::store::{CaptionStore, StoreError};

/// In-process store backing tests and the snapshot CLI.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    dims: FrameDims,
    frames: BTreeMap<u64, Vec<OcrBox>>,
    spans: BTreeMap<u64, CaptionSpan>,
    labels: HashMap<BoxId, Label>,
    predictions: HashMap<BoxId, Prediction>,
    model: Option<Model>,
    layout: Option<LayoutRecord>,
}

impl MemoryStore {
    pub fn new(dims: FrameDims) -> Self {
        Self {
            dims,
            frames: BTreeMap::new(),
            spans: BTreeMap::new(),
            labels: HashMap::new(),
            predictions: HashMap::new(),
            model: None,
            layout: None,
        }
    }

    pub fn dims(&self) -> FrameDims {
        self.dims
    }

    /// Appends boxes to their frames, keyed by each box's own frame index.
    pub fn insert_boxes<I>(&mut self, boxes: I)
    where
        I: IntoIterator<Item = OcrBox>,
    {
        for ocr_box in boxes {
            self.frames
                .entry(ocr_box.id.frame_index)
                .or_default()
                .push(ocr_box);
        }
    }

    pub fn set_span(&mut self, frame_index: u64, span: CaptionSpan) {
        self.spans.insert(frame_index, span);
    }

    pub fn set_label(&mut self, id: BoxId, label: Label) -> Result<(), StoreError> {
        if self.find_box(id).is_none() {
            return Err(StoreError::UnknownBox(id));
        }
        self.labels.insert(id, label);
        Ok(())
    }

    pub fn clear_label(&mut self, id: BoxId) -> Option<Label> {
        self.labels.remove(&id)
    }

    pub fn boxes(&self) -> impl Iterator<Item = &OcrBox> {
        self.frames.values().flatten()
    }

    pub fn spans(&self) -> impl Iterator<Item = (u64, CaptionSpan)> + '_ {
        self.spans.iter().map(|(&frame, &span)| (frame, span))
    }

    pub fn labels(&self) -> impl Iterator<Item = (BoxId, Label)> + '_ {
        self.labels.iter().map(|(&id, &label)| (id, label))
    }

    pub fn predictions(&self) -> impl Iterator<Item = (BoxId, &Prediction)> {
        self.predictions.iter().map(|(&id, prediction)| (id, prediction))
    }

    pub fn stored_model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn stored_layout(&self) -> Option<&LayoutRecord> {
        self.layout.as_ref()
    }

    pub fn restore(&mut self, model: Option<Model>, layout: Option<LayoutRecord>) {
        self.model = model;
        self.layout = layout;
    }

    pub fn restore_predictions<I>(&mut self, predictions: I)
    where
        I: IntoIterator<Item = (BoxId, Prediction)>,
    {
        self.predictions.extend(predictions);
    }

    fn find_box(&self, id: BoxId) -> Option<&OcrBox> {
        self.frames
            .get(&id.frame_index)?
            .iter()
            .find(|ocr_box| ocr_box.id == id)
    }
}

impl CaptionStore for MemoryStore {
    fn frame_dims(&self) -> Result<FrameDims, StoreError> {
        Ok(self.dims)
    }

    fn frame_indices(&self) -> Result<Vec<u64>, StoreError> {
        Ok(self.frames.keys().copied().collect())
    }

    fn ocr_boxes_for_frame(&self, frame_index: u64) -> Result<Vec<OcrBox>, StoreError> {
        self.frames
            .get(&frame_index)
            .cloned()
            .ok_or(StoreError::UnknownFrame(frame_index))
    }

    fn caption_span(&self, frame_index: u64) -> Result<Option<CaptionSpan>, StoreError> {
        Ok(self.spans.get(&frame_index).copied())
    }

    fn labeled_boxes(&self) -> Result<Vec<LabeledBox>, StoreError> {
        let mut labeled: Vec<LabeledBox> = self
            .labels
            .iter()
            .map(|(&id, &label)| {
                self.find_box(id)
                    .cloned()
                    .map(|ocr_box| LabeledBox { ocr_box, label })
                    .ok_or(StoreError::UnknownBox(id))
            })
            .collect::<Result<_, _>>()?;
        labeled.sort_by_key(|entry| entry.ocr_box.id);
        Ok(labeled)
    }

    fn label(&self, id: BoxId) -> Result<Option<Label>, StoreError> {
        Ok(self.labels.get(&id).copied())
    }

    fn prediction(&self, id: BoxId) -> Result<Option<Prediction>, StoreError> {
        Ok(self.predictions.get(&id).cloned())
    }

    fn put_prediction(&mut self, id: BoxId, prediction: Prediction) -> Result<(), StoreError> {
        if self.find_box(id).is_none() {
            return Err(StoreError::UnknownBox(id));
        }
        self.predictions.insert(id, prediction);
        Ok(())
    }

    fn model(&self) -> Result<Option<Model>, StoreError> {
        Ok(self.model.clone())
    }

    fn put_model(&mut self, model: Model) -> Result<(), StoreError> {
        self.model = Some(model);
        Ok(())
    }

    fn layout(&self) -> Result<Option<LayoutRecord>, StoreError> {
        Ok(self.layout.clone())
    }

    fn put_layout(&mut self, record: LayoutRecord) -> Result<(), StoreError> {
        self.layout = Some(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caption_types::BoxBounds;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new(FrameDims::new(640, 360));
        store.insert_boxes([
            OcrBox::new(BoxId::new(3, 0), BoxBounds::new(0.0, 0.0, 10.0, 10.0), "a"),
            OcrBox::new(BoxId::new(1, 0), BoxBounds::new(0.0, 0.0, 10.0, 10.0), "b"),
            OcrBox::new(BoxId::new(3, 1), BoxBounds::new(5.0, 0.0, 10.0, 10.0), "c"),
        ]);
        store
    }

    #[test]
    fn frames_are_grouped_and_sorted() {
        let store = store();
        assert_eq!(store.frame_indices().unwrap(), vec![1, 3]);
        assert_eq!(store.ocr_boxes_for_frame(3).unwrap().len(), 2);
        assert!(matches!(
            store.ocr_boxes_for_frame(2),
            Err(StoreError::UnknownFrame(2))
        ));
    }

    #[test]
    fn labels_require_known_boxes() {
        let mut store = store();
        store.set_label(BoxId::new(3, 1), Label::In).unwrap();
        store.set_label(BoxId::new(1, 0), Label::Out).unwrap();
        assert!(store.set_label(BoxId::new(9, 9), Label::In).is_err());

        let labeled = store.labeled_boxes().unwrap();
        let ids: Vec<BoxId> = labeled.iter().map(|l| l.ocr_box.id).collect();
        assert_eq!(ids, vec![BoxId::new(1, 0), BoxId::new(3, 1)]);
        assert_eq!(store.label(BoxId::new(3, 1)).unwrap(), Some(Label::In));
        assert_eq!(store.clear_label(BoxId::new(3, 1)), Some(Label::In));
        assert_eq!(store.label(BoxId::new(3, 1)).unwrap(), None);
    }

    #[test]
    fn predictions_for_unknown_boxes_are_rejected() {
        let mut store = store();
        let prediction = Prediction::new(Label::In, 0.7, "seed");
        assert!(
            store
                .put_prediction(BoxId::new(1, 0), prediction.clone())
                .is_ok()
        );
        assert!(store.put_prediction(BoxId::new(1, 5), prediction).is_err());
    }
}
