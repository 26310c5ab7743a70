//! Orchestration of retraining, streaming refresh, and layout recompute
//! against a storage collaborator.

use std::collections::HashMap;

use caption_classifier::{
    Classification, CovarianceInverse, FeatureSet, FrameContext, LayoutHints, Model, TrainError,
    extract_frame, heuristic_predict, invert_covariance, pooled_covariance, predict,
    seed_model, train_with,
};
use caption_geometry::analyze_layout;
use caption_stream::{
    Annotation, Candidate, RankedCandidate, RecalcStats, adaptive_recalculate, select_candidates,
};
use caption_types::{
    BoxBounds, BoxId, FeatureVector, FrameDims, Label, LabeledSample, LayoutRecord, Prediction,
};
use serde::Serialize;

use crate::error::EngineError;
use crate::events::{EngineEvent, EventSink, LogEventSink};
use crate::settings::EngineSettings;
use crate::store::{CaptionStore, StoreError};

/// Model version recorded on predictions made without a usable model.
pub const HEURISTIC_VERSION: &str = "heuristic";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrainOutcome {
    pub trained: bool,
    pub model_version: String,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelUpdate {
    pub id: BoxId,
    pub label: Label,
    pub retrain: RetrainOutcome,
    pub candidates: usize,
    pub stats: RecalcStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PredictSummary {
    pub frames: usize,
    pub boxes: usize,
}

/// Pooled inverse together with the exact label set it was built from.
struct CachedInverse {
    model_version: String,
    labels: Vec<(BoxId, Label)>,
    inverse: CovarianceInverse,
}

/// Unlabeled box awaiting a possible refresh.
struct Pending {
    features: FeatureVector,
    bounds: BoxBounds,
}

pub struct Engine<S, E = LogEventSink> {
    store: S,
    events: E,
    settings: EngineSettings,
    inverse_cache: Option<CachedInverse>,
}

impl<S: CaptionStore> Engine<S, LogEventSink> {
    pub fn new(store: S, settings: EngineSettings) -> Self {
        Self::with_events(store, LogEventSink, settings)
    }
}

fn classify(
    model: Option<&Model>,
    features: &FeatureVector,
    bounds: &BoxBounds,
    hints: &LayoutHints,
) -> Prediction {
    match model.filter(|model| model.feature_count == features.len()) {
        Some(model) => {
            let Classification { label, confidence } = predict(features, model);
            Prediction::new(label, confidence, model.version.clone())
        }
        None => {
            let Classification { label, confidence } = heuristic_predict(bounds, hints);
            Prediction::new(label, confidence, HEURISTIC_VERSION)
        }
    }
}

impl<S: CaptionStore, E: EventSink> Engine<S, E> {
    pub fn with_events(store: S, events: E, settings: EngineSettings) -> Self {
        Self {
            store,
            events,
            settings,
            inverse_cache: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn label_map(&self) -> Result<HashMap<BoxId, Label>, EngineError> {
        Ok(self
            .store
            .labeled_boxes()?
            .into_iter()
            .map(|labeled| (labeled.ocr_box.id, labeled.label))
            .collect())
    }

    fn layout_hints(&self, dims: FrameDims) -> Result<LayoutHints, EngineError> {
        Ok(match self.store.layout()? {
            Some(record) => LayoutHints::from_layout(&record.config, dims),
            None => LayoutHints::defaults(dims),
        })
    }

    fn training_samples(
        &self,
        labels: &HashMap<BoxId, Label>,
    ) -> Result<Vec<LabeledSample>, EngineError> {
        let dims = self.store.frame_dims()?;
        let lookup = |id: BoxId| labels.get(&id).copied();
        let mut frames: Vec<u64> = labels.keys().map(|id| id.frame_index).collect();
        frames.sort_unstable();
        frames.dedup();

        let mut samples = Vec::with_capacity(labels.len());
        for frame_index in frames {
            let boxes = self.store.ocr_boxes_for_frame(frame_index)?;
            let span = self.store.caption_span(frame_index)?;
            let context = FrameContext::new(&boxes, dims, &lookup).with_span(span);
            for (id, features) in extract_frame(FeatureSet::Frame, &context)? {
                if let Some(&label) = labels.get(&id) {
                    samples.push(LabeledSample::new(features, label));
                }
            }
        }
        Ok(samples)
    }

    /// Retrains the per-frame model from every user label.
    ///
    /// With too little data the current model stays authoritative, except that
    /// a trained model falls back to the seed once the total drops below the
    /// minimum.
    pub fn retrain(&mut self) -> Result<RetrainOutcome, EngineError> {
        let labels = self.label_map()?;
        let samples = self.training_samples(&labels)?;
        self.retrain_from(&samples)
    }

    fn retrain_from(&mut self, samples: &[LabeledSample]) -> Result<RetrainOutcome, EngineError> {
        let current = self.store.model()?;
        let previous_epoch = current.as_ref().map_or(0, |model| model.epoch);
        let total = samples.len();

        let result = train_with(
            &self.settings.train_config(),
            samples,
            FeatureSet::Frame.len(),
            previous_epoch,
        );
        match result {
            Ok(model) => {
                let version = model.version.clone();
                self.store.put_model(model)?;
                self.events.emit(EngineEvent::ModelRetrained {
                    version: version.clone(),
                    sample_count: total,
                });
                Ok(RetrainOutcome {
                    trained: true,
                    model_version: version,
                    sample_count: total,
                })
            }
            Err(TrainError::InsufficientData { .. }) => {
                let model = match current {
                    Some(model) if model.is_seed() || total >= self.settings.min_total_samples => {
                        model
                    }
                    Some(model) => {
                        let mut seed = seed_model();
                        seed.epoch = model.epoch;
                        self.store.put_model(seed.clone())?;
                        self.events
                            .emit(EngineEvent::ModelReverted { sample_count: total });
                        seed
                    }
                    None => {
                        let seed = seed_model();
                        self.store.put_model(seed.clone())?;
                        seed
                    }
                };
                Ok(RetrainOutcome {
                    trained: false,
                    model_version: model.version,
                    sample_count: total,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn covariance_inverse(
        &mut self,
        model_version: &str,
        labels: &HashMap<BoxId, Label>,
        in_vectors: &[FeatureVector],
        out_vectors: &[FeatureVector],
    ) -> CovarianceInverse {
        let mut label_set: Vec<(BoxId, Label)> =
            labels.iter().map(|(&id, &label)| (id, label)).collect();
        label_set.sort_unstable_by_key(|&(id, _)| id);
        if let Some(cached) = self.inverse_cache.as_ref() {
            if cached.model_version == model_version && cached.labels == label_set {
                return cached.inverse.clone();
            }
        }

        let in_refs: Vec<&FeatureVector> = in_vectors.iter().collect();
        let out_refs: Vec<&FeatureVector> = out_vectors.iter().collect();
        let pooled = pooled_covariance(&in_refs, &out_refs, FeatureSet::Streaming.len());
        let inverse = invert_covariance(&pooled);
        if let Some(reason) = inverse.fallback.as_ref() {
            self.events.emit(EngineEvent::CovarianceFallback {
                reason: reason.to_string(),
            });
        }
        self.inverse_cache = Some(CachedInverse {
            model_version: model_version.to_string(),
            labels: label_set,
            inverse: inverse.clone(),
        });
        inverse
    }

    /// Folds a freshly stored label into the model and refreshes the
    /// predictions most likely to be affected by it.
    pub async fn apply_label(&mut self, id: BoxId) -> Result<LabelUpdate, EngineError> {
        let label = self.store.label(id)?.ok_or(EngineError::Unlabeled(id))?;
        let labels = self.label_map()?;
        let samples = self.training_samples(&labels)?;
        let retrain = self.retrain_from(&samples)?;

        let model = self.store.model()?;
        let dims = self.store.frame_dims()?;
        let hints = self.layout_hints(dims)?;
        let lookup = |box_id: BoxId| labels.get(&box_id).copied();

        let mut in_vectors = Vec::new();
        let mut out_vectors = Vec::new();
        let mut annotation = None;
        let mut candidates = Vec::new();
        let mut pending: HashMap<BoxId, Pending> = HashMap::new();

        for frame_index in self.store.frame_indices()? {
            let boxes = self.store.ocr_boxes_for_frame(frame_index)?;
            let span = self.store.caption_span(frame_index)?;
            let context = FrameContext::new(&boxes, dims, &lookup).with_span(span);
            let similarity = extract_frame(FeatureSet::Streaming, &context)?;
            let per_frame = extract_frame(FeatureSet::Frame, &context)?;

            for ((ocr_box, (box_id, similar)), (_, features)) in
                boxes.iter().zip(similarity).zip(per_frame)
            {
                match labels.get(&box_id) {
                    Some(&known) => {
                        if box_id == id {
                            annotation = Some(Annotation {
                                id,
                                features: similar.clone(),
                                label,
                            });
                        }
                        match known {
                            Label::In => in_vectors.push(similar),
                            Label::Out => out_vectors.push(similar),
                        }
                    }
                    None => {
                        let (current, confidence) = match self.store.prediction(box_id)? {
                            Some(prediction) => (prediction.label, prediction.confidence),
                            None => {
                                let undecided = Classification::undecided();
                                (undecided.label, undecided.confidence)
                            }
                        };
                        candidates.push(Candidate {
                            id: box_id,
                            features: similar,
                            label: current,
                            confidence,
                        });
                        pending.insert(
                            box_id,
                            Pending {
                                features,
                                bounds: ocr_box.bounds,
                            },
                        );
                    }
                }
            }
        }
        let annotation = annotation.ok_or(StoreError::UnknownBox(id))?;

        let model_version = model
            .as_ref()
            .map_or(HEURISTIC_VERSION, |model| model.version.as_str())
            .to_string();
        let inverse = self.covariance_inverse(&model_version, &labels, &in_vectors, &out_vectors);
        let ranked = select_candidates(
            &annotation,
            candidates,
            &inverse,
            self.settings.min_change_probability,
        );
        log::debug!(
            "label {id} ({label}): {} of {} unlabeled boxes selected",
            ranked.len(),
            pending.len()
        );

        let recalc = self.settings.recalc_config();
        let store = &mut self.store;
        let model = model.as_ref();
        let recompute = |batch: &[RankedCandidate]| -> Result<Vec<bool>, StoreError> {
            let mut flips = Vec::with_capacity(batch.len());
            for entry in batch {
                let candidate = &entry.candidate;
                let Some(box_state) = pending.get(&candidate.id) else {
                    flips.push(false);
                    continue;
                };
                let prediction = classify(model, &box_state.features, &box_state.bounds, &hints);
                flips.push(prediction.label != candidate.label);
                store.put_prediction(candidate.id, prediction)?;
            }
            Ok(flips)
        };
        let stats = adaptive_recalculate(&ranked, &recalc, recompute).await?;

        self.events.emit(EngineEvent::RecalcStopped {
            reason: stats.reason,
            processed: stats.total_processed,
            reversals: stats.total_reversals,
        });
        Ok(LabelUpdate {
            id,
            label,
            retrain,
            candidates: ranked.len(),
            stats,
        })
    }

    /// Predicts and stores every box of one frame.
    pub fn predict_frame(
        &mut self,
        frame_index: u64,
    ) -> Result<Vec<(BoxId, Prediction)>, EngineError> {
        let labels = self.label_map()?;
        let model = self.store.model()?;
        let dims = self.store.frame_dims()?;
        let hints = self.layout_hints(dims)?;
        self.predict_frame_with(frame_index, &labels, model.as_ref(), dims, &hints)
    }

    fn predict_frame_with(
        &mut self,
        frame_index: u64,
        labels: &HashMap<BoxId, Label>,
        model: Option<&Model>,
        dims: FrameDims,
        hints: &LayoutHints,
    ) -> Result<Vec<(BoxId, Prediction)>, EngineError> {
        let boxes = self.store.ocr_boxes_for_frame(frame_index)?;
        let span = self.store.caption_span(frame_index)?;
        let lookup = |id: BoxId| labels.get(&id).copied();
        let context = FrameContext::new(&boxes, dims, &lookup).with_span(span);
        let features = extract_frame(FeatureSet::Frame, &context)?;

        let mut predictions = Vec::with_capacity(boxes.len());
        for (ocr_box, (id, features)) in boxes.iter().zip(features) {
            let prediction = classify(model, &features, &ocr_box.bounds, hints);
            self.store.put_prediction(id, prediction.clone())?;
            predictions.push((id, prediction));
        }
        Ok(predictions)
    }

    /// Runs [`Engine::predict_frame`] over every frame. `progress` receives
    /// `(frames_done, frames_total)` after each frame.
    pub fn predict_all<F>(&mut self, mut progress: F) -> Result<PredictSummary, EngineError>
    where
        F: FnMut(usize, usize),
    {
        let labels = self.label_map()?;
        let model = self.store.model()?;
        let dims = self.store.frame_dims()?;
        let hints = self.layout_hints(dims)?;
        let frames = self.store.frame_indices()?;

        let mut boxes = 0;
        for (done, &frame_index) in frames.iter().enumerate() {
            boxes += self
                .predict_frame_with(frame_index, &labels, model.as_ref(), dims, &hints)?
                .len();
            progress(done + 1, frames.len());
        }
        Ok(PredictSummary {
            frames: frames.len(),
            boxes,
        })
    }

    /// Re-derives the caption layout from every box believed to be a caption.
    /// A user label takes precedence over the stored prediction.
    pub fn recompute_layout(&mut self) -> Result<LayoutRecord, EngineError> {
        let dims = self.store.frame_dims()?;
        let labels = self.label_map()?;

        let mut captions = Vec::new();
        for frame_index in self.store.frame_indices()? {
            for ocr_box in self.store.ocr_boxes_for_frame(frame_index)? {
                let label = match labels.get(&ocr_box.id) {
                    Some(&label) => Some(label),
                    None => self.store.prediction(ocr_box.id)?.map(|p| p.label),
                };
                if label == Some(Label::In) {
                    captions.push(ocr_box.bounds);
                }
            }
        }

        let config = analyze_layout(&captions, dims, &self.settings.geometry_config())?;
        let version = self
            .store
            .layout()?
            .map_or(0, |record| record.crop_bounds_version)
            + 1;
        let record = LayoutRecord {
            config,
            crop_bounds_version: version,
        };
        self.store.put_layout(record.clone())?;
        self.events.emit(EngineEvent::LayoutRecomputed {
            version,
            anchor: record.config.anchor.kind,
            box_count: record.config.box_count,
        });
        Ok(record)
    }

    /// Fisher scores of the trained model, once enough samples back it.
    pub fn feature_importance(&self) -> Result<Option<Vec<f64>>, EngineError> {
        let importance = self
            .store
            .model()?
            .filter(|model| !model.is_seed())
            .and_then(|model| {
                caption_classifier::feature_importance(&model, self.settings.importance_min_samples)
            });
        Ok(importance)
    }
}
