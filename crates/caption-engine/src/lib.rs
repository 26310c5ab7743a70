//! Caption inference engine: retraining, streaming prediction refresh, and
//! layout recompute over an injected storage collaborator.

pub mod engine;
pub mod error;
pub mod events;
pub mod memory;
pub mod settings;
pub mod store;

pub use engine::{Engine, HEURISTIC_VERSION, LabelUpdate, PredictSummary, RetrainOutcome};
pub use error::EngineError;
pub use events::{EngineEvent, EventSink, LogEventSink, MemoryEventSink};
pub use memory::MemoryStore;
pub use settings::EngineSettings;
pub use store::{CaptionStore, StoreError};

#[cfg(test)]
mod tests;
