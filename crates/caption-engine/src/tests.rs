use std::sync::Arc;

use caption_classifier::FeatureSet;
use caption_geometry::GeometryError;
use caption_stream::StopReason;
use caption_types::{AnchorType, BoxBounds, BoxId, FrameDims, Label, OcrBox};

use crate::{
    CaptionStore, Engine, EngineError, EngineEvent, EngineSettings, HEURISTIC_VERSION,
    MemoryEventSink, MemoryStore,
};

const FRAMES: u64 = 30;

fn caption(frame: u64) -> BoxId {
    BoxId::new(frame, 0)
}

fn logo(frame: u64) -> BoxId {
    BoxId::new(frame, 1)
}

fn sign(frame: u64) -> BoxId {
    BoxId::new(frame, 2)
}

fn video() -> MemoryStore {
    let mut store = MemoryStore::new(FrameDims::new(1280, 720));
    for frame in 0..FRAMES {
        let j = (frame % 5) as f64;
        store.insert_boxes([
            OcrBox::new(
                caption(frame),
                BoxBounds::new(440.0 - 4.0 * j, 600.0, 840.0 + 4.0 * j, 640.0),
                "Hello there",
            ),
            OcrBox::new(
                logo(frame),
                BoxBounds::new(20.0 + j, 20.0, 140.0, 60.0),
                "LOGO",
            ),
            OcrBox::new(
                sign(frame),
                BoxBounds::new(900.0, 300.0 + 2.0 * j, 1000.0, 330.0 + 2.0 * j),
                "EXIT",
            ),
        ]);
    }
    store
}

/// Six captions in, three logos and three signs out.
fn labeled_video() -> MemoryStore {
    let mut store = video();
    for frame in 0..6 {
        store.set_label(caption(frame), Label::In).unwrap();
    }
    for frame in 0..3 {
        store.set_label(logo(frame), Label::Out).unwrap();
    }
    for frame in 3..6 {
        store.set_label(sign(frame), Label::Out).unwrap();
    }
    store
}

fn engine(store: MemoryStore) -> Engine<MemoryStore, Arc<MemoryEventSink>> {
    Engine::with_events(
        store,
        Arc::new(MemoryEventSink::new()),
        EngineSettings::default(),
    )
}

#[test]
fn too_few_labels_install_the_seed_model() {
    let mut store = video();
    store.set_label(caption(0), Label::In).unwrap();
    store.set_label(logo(0), Label::Out).unwrap();
    let mut engine = engine(store);

    let outcome = engine.retrain().unwrap();
    assert!(!outcome.trained);
    assert_eq!(outcome.model_version, "seed");
    assert_eq!(outcome.sample_count, 2);
    assert!(engine.store().model().unwrap().unwrap().is_seed());
    assert!(engine.events().events().is_empty());
}

#[test]
fn enough_labels_train_a_model() {
    let mut engine = engine(labeled_video());
    let outcome = engine.retrain().unwrap();
    assert!(outcome.trained);
    assert_eq!(outcome.model_version, "gnb-1");
    assert_eq!(outcome.sample_count, 12);

    let model = engine.store().model().unwrap().unwrap();
    assert_eq!(model.feature_count, FeatureSet::Frame.len());
    assert!((model.in_class.prior - 0.5).abs() < 1e-12);
    assert_eq!(
        engine.events().events(),
        vec![EngineEvent::ModelRetrained {
            version: "gnb-1".to_string(),
            sample_count: 12
        }]
    );
}

#[test]
fn dropping_below_the_minimum_reverts_to_seed() {
    let mut engine = engine(labeled_video());
    engine.retrain().unwrap();

    for frame in 0..4 {
        engine.store_mut().clear_label(caption(frame));
    }
    let outcome = engine.retrain().unwrap();
    assert!(!outcome.trained);
    assert_eq!(outcome.model_version, "seed");
    assert!(
        engine
            .events()
            .events()
            .contains(&EngineEvent::ModelReverted { sample_count: 8 })
    );

    for frame in 0..4 {
        engine.store_mut().set_label(caption(frame), Label::In).unwrap();
    }
    assert_eq!(engine.retrain().unwrap().model_version, "gnb-2");
}

#[test]
fn missing_model_falls_back_to_heuristic() {
    let mut engine = engine(video());
    let predictions = engine.predict_frame(7).unwrap();
    assert_eq!(predictions.len(), 3);
    for (_, prediction) in &predictions {
        assert_eq!(prediction.model_version, HEURISTIC_VERSION);
        assert!((0.5..=0.8).contains(&prediction.confidence));
    }
    assert_eq!(predictions[0].1.label, Label::In);
    assert_eq!(predictions[1].1.label, Label::Out);
    assert_eq!(
        engine.store().prediction(caption(7)).unwrap(),
        Some(predictions[0].1.clone())
    );
}

#[test]
fn trained_model_separates_unlabeled_frames() {
    let mut engine = engine(labeled_video());
    engine.retrain().unwrap();
    let mut calls = Vec::new();
    let summary = engine
        .predict_all(|done, total| calls.push((done, total)))
        .unwrap();
    assert_eq!(summary.frames, FRAMES as usize);
    assert_eq!(summary.boxes, 3 * FRAMES as usize);
    assert_eq!(calls.last(), Some(&(30, 30)));

    let store = engine.store();
    let caption_prediction = store.prediction(caption(17)).unwrap().unwrap();
    assert_eq!(caption_prediction.label, Label::In);
    assert_eq!(caption_prediction.model_version, "gnb-1");
    assert_eq!(store.prediction(logo(17)).unwrap().unwrap().label, Label::Out);
}

#[tokio::test]
async fn new_label_refreshes_unlabeled_boxes() {
    let mut engine = engine(labeled_video());
    let update = engine.apply_label(caption(5)).await.unwrap();

    assert_eq!(update.label, Label::In);
    assert!(update.retrain.trained);
    assert_eq!(update.candidates, 3 * FRAMES as usize - 12);
    assert_eq!(update.stats.total_processed, update.candidates);
    assert_eq!(update.stats.reason, StopReason::Exhausted);

    let events = engine.events().events();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, EngineEvent::CovarianceFallback { .. }))
    );
    assert!(events.contains(&EngineEvent::RecalcStopped {
        reason: StopReason::Exhausted,
        processed: update.candidates,
        reversals: update.stats.total_reversals,
    }));

    let refreshed = engine.store().prediction(caption(20)).unwrap().unwrap();
    assert_eq!(refreshed.model_version, "gnb-1");
    assert_eq!(refreshed.label, Label::In);
}

#[tokio::test]
async fn relabeling_refreshes_the_same_boxes_as_a_fresh_engine() {
    let mut store = video();
    for frame in 0..3 {
        store.set_label(caption(frame), Label::In).unwrap();
    }
    for frame in 0..2 {
        store.set_label(logo(frame), Label::Out).unwrap();
    }
    let mut live = engine(store);
    let first = live.apply_label(caption(1)).await.unwrap();
    assert_eq!(first.retrain.model_version, "seed");

    live.store_mut().set_label(caption(1), Label::Out).unwrap();
    let mut fresh = engine(live.store().clone());

    let relabeled = live.apply_label(caption(1)).await.unwrap();
    let expected = fresh.apply_label(caption(1)).await.unwrap();
    assert_eq!(relabeled.retrain.model_version, "seed");
    assert_eq!(relabeled.label, Label::Out);
    assert_eq!(relabeled.candidates, expected.candidates);
    assert_eq!(relabeled.stats, expected.stats);
    for frame in 0..FRAMES {
        for id in [caption(frame), logo(frame), sign(frame)] {
            assert_eq!(
                live.store().prediction(id).unwrap(),
                fresh.store().prediction(id).unwrap()
            );
        }
    }
}

#[tokio::test]
async fn unlabeled_box_cannot_be_applied() {
    let mut engine = engine(video());
    let err = engine.apply_label(caption(3)).await.unwrap_err();
    assert!(matches!(err, EngineError::Unlabeled(id) if id == caption(3)));
}

#[test]
fn layout_uses_labels_and_predictions() {
    let mut engine = engine(labeled_video());
    engine.retrain().unwrap();
    engine.predict_all(|_, _| {}).unwrap();

    let first = engine.recompute_layout().unwrap();
    assert_eq!(first.crop_bounds_version, 1);
    assert_eq!(first.config.anchor.kind, AnchorType::Center);
    assert_eq!(first.config.box_count, FRAMES as usize);
    assert!(first.config.crop.top <= 600 && first.config.crop.bottom >= 640);

    let second = engine.recompute_layout().unwrap();
    assert_eq!(second.crop_bounds_version, 2);
    assert_eq!(second.config, first.config);
    assert!(
        engine
            .events()
            .events()
            .contains(&EngineEvent::LayoutRecomputed {
                version: 2,
                anchor: AnchorType::Center,
                box_count: FRAMES as usize,
            })
    );
}

#[test]
fn label_overrides_prediction_for_layout() {
    let mut store = video();
    store.set_label(caption(0), Label::Out).unwrap();
    let mut engine = engine(store);
    engine.predict_all(|_, _| {}).unwrap();
    let record = engine.recompute_layout().unwrap();
    assert_eq!(record.config.box_count, FRAMES as usize - 1);
}

#[test]
fn layout_without_captions_is_an_error() {
    let mut engine = engine(video());
    let err = engine.recompute_layout().unwrap_err();
    assert!(matches!(err, EngineError::Geometry(GeometryError::NoData)));
}

#[test]
fn importance_needs_enough_samples() {
    let mut engine = engine(labeled_video());
    engine.retrain().unwrap();
    assert_eq!(engine.feature_importance().unwrap(), None);

    let settings = EngineSettings {
        importance_min_samples: 10,
        ..EngineSettings::default()
    };
    let mut engine = Engine::with_events(
        engine.into_store(),
        Arc::new(MemoryEventSink::new()),
        settings,
    );
    engine.retrain().unwrap();
    let scores = engine.feature_importance().unwrap().unwrap();
    assert_eq!(scores.len(), FeatureSet::Frame.len());
    assert!(scores.iter().any(|&score| (score - 1.0).abs() < 1e-12));
}
