//! Incremental prediction refresh after a single new label.

pub mod change;
pub mod scheduler;

pub use change::{
    Annotation, Candidate, MIN_CHANGE_PROBABILITY, RankedCandidate, estimate_change_probability,
    select_candidates,
};
pub use scheduler::{
    RecalcConfig, RecalcError, RecalcStats, ReversalWindow, StopReason, adaptive_recalculate,
};
