//! Command execution over a snapshot-backed engine.

use std::fmt;

use caption_classifier::FRAME_FEATURE_NAMES;
use caption_engine::{
    Engine, EngineError, EventSink, LabelUpdate, MemoryStore, PredictSummary, RetrainOutcome,
};
use caption_types::LayoutRecord;
use thiserror::Error;

use crate::cli::Command;
use crate::progress::PredictProgress;
use crate::settings::{ConfigError, EffectiveSettings};
use crate::snapshot::{Snapshot, SnapshotError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureScore {
    pub name: &'static str,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Layout(LayoutRecord),
    Retrain(RetrainOutcome),
    Label(LabelUpdate),
    Predict(PredictSummary),
    Importance {
        scores: Option<Vec<FeatureScore>>,
        min_samples: usize,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Layout(record) => {
                let config = &record.config;
                write!(
                    f,
                    "layout v{}: {} anchor at {:.1}, crop [{}, {}, {}, {}] from {} boxes",
                    record.crop_bounds_version,
                    config.anchor.kind,
                    config.anchor.position,
                    config.crop.left,
                    config.crop.top,
                    config.crop.right,
                    config.crop.bottom,
                    config.box_count
                )
            }
            Outcome::Retrain(outcome) if outcome.trained => write!(
                f,
                "trained {} on {} labeled samples",
                outcome.model_version, outcome.sample_count
            ),
            Outcome::Retrain(outcome) => write!(
                f,
                "kept {} ({} labeled samples)",
                outcome.model_version, outcome.sample_count
            ),
            Outcome::Label(update) => write!(
                f,
                "labeled {} as {} ({}); refreshed {}/{} candidates with {} reversals, stopped: {}",
                update.id,
                update.label,
                update.retrain.model_version,
                update.stats.total_processed,
                update.candidates,
                update.stats.total_reversals,
                update.stats.reason.as_str()
            ),
            Outcome::Predict(summary) => write!(
                f,
                "predicted {} boxes across {} frames",
                summary.boxes, summary.frames
            ),
            Outcome::Importance {
                scores: Some(scores),
                ..
            } => {
                for (rank, entry) in scores.iter().enumerate() {
                    if rank > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{:<24} {:.4}", entry.name, entry.score)?;
                }
                Ok(())
            }
            Outcome::Importance {
                scores: None,
                min_samples,
            } => write!(
                f,
                "feature importance needs a trained model with at least {min_samples} samples"
            ),
        }
    }
}

/// Runs one command against an engine. `progress` only sees `predict` updates.
pub async fn execute<E, F>(
    engine: &mut Engine<MemoryStore, E>,
    command: &Command,
    progress: F,
) -> Result<Outcome, EngineError>
where
    E: EventSink,
    F: FnMut(usize, usize),
{
    let outcome = match command {
        Command::Layout => Outcome::Layout(engine.recompute_layout()?),
        Command::Retrain => Outcome::Retrain(engine.retrain()?),
        Command::Label { id, label } => {
            engine.store_mut().set_label(*id, *label)?;
            Outcome::Label(engine.apply_label(*id).await?)
        }
        Command::Predict => Outcome::Predict(engine.predict_all(progress)?),
        Command::Importance => Outcome::Importance {
            scores: engine.feature_importance()?.map(ranked_scores),
            min_samples: engine.settings().importance_min_samples,
        },
    };
    Ok(outcome)
}

fn ranked_scores(scores: Vec<f64>) -> Vec<FeatureScore> {
    let mut ranked: Vec<FeatureScore> = scores
        .into_iter()
        .enumerate()
        .map(|(index, score)| FeatureScore {
            name: FRAME_FEATURE_NAMES.get(index).copied().unwrap_or("unnamed"),
            score,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Loads the snapshot, runs the command, and writes the snapshot back when asked to.
pub async fn run_session(
    settings: &EffectiveSettings,
    command: &Command,
) -> Result<Outcome, AppError> {
    let store = Snapshot::load(&settings.snapshot)?.into_store()?;
    log::debug!(
        "loaded snapshot {} ({} boxes)",
        settings.snapshot.display(),
        store.boxes().count()
    );
    let mut engine = Engine::new(store, settings.engine);

    let outcome = if matches!(command, Command::Predict) {
        let progress = PredictProgress::new(command.name());
        let outcome = execute(&mut engine, command, |done, total| {
            progress.observe(done, total)
        })
        .await;
        progress.finish();
        outcome?
    } else {
        execute(&mut engine, command, |_, _| {}).await?
    };

    if settings.write_snapshot {
        Snapshot::from_store(engine.store()).save(&settings.output, settings.pretty)?;
        log::debug!("wrote snapshot {}", settings.output.display());
    }
    Ok(outcome)
}
