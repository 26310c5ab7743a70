//! Snapshot-driven command line front end for the caption engine.

pub mod cli;
pub mod progress;
pub mod run;
pub mod settings;
pub mod snapshot;

pub use run::{AppError, FeatureScore, Outcome, execute, run_session};
pub use settings::{ConfigError, EffectiveSettings, resolve_settings};
pub use snapshot::{Snapshot, SnapshotError};
