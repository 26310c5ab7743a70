use std::sync::{Arc, Mutex};

use caption_stream::StopReason;
use caption_types::AnchorType;
use serde::Serialize;

/// Structured notifications for the caller to route to its own telemetry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ModelRetrained {
        version: String,
        sample_count: usize,
    },
    ModelReverted {
        sample_count: usize,
    },
    CovarianceFallback {
        reason: String,
    },
    RecalcStopped {
        reason: StopReason,
        processed: usize,
        reversals: usize,
    },
    LayoutRecomputed {
        version: u64,
        anchor: AnchorType,
        box_count: usize,
    },
}

pub trait EventSink {
    fn emit(&self, event: EngineEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: EngineEvent) {
        (**self).emit(event);
    }
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::ModelRetrained {
                version,
                sample_count,
            } => log::info!("model {version} retrained on {sample_count} samples"),
            EngineEvent::ModelReverted { sample_count } => {
                log::warn!("only {sample_count} labeled samples left; reverted to seed model")
            }
            EngineEvent::CovarianceFallback { reason } => {
                log::warn!("covariance fallback: {reason}")
            }
            EngineEvent::RecalcStopped {
                reason,
                processed,
                reversals,
            } => log::info!(
                "recalculation stopped ({}): {processed} boxes, {reversals} reversals",
                reason.as_str()
            ),
            EngineEvent::LayoutRecomputed {
                version,
                anchor,
                box_count,
            } => log::info!("layout v{version} recomputed from {box_count} boxes ({anchor} anchor)"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn take(&self) -> Vec<EngineEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: EngineEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_a_tag() {
        let json = serde_json::to_value(EngineEvent::RecalcStopped {
            reason: StopReason::ReversalRate,
            processed: 100,
            reversals: 0,
        })
        .unwrap();
        assert_eq!(json["event"], "recalc_stopped");
        assert_eq!(json["reason"], "reversal_rate");
        assert_eq!(json["processed"], 100);
    }

    #[test]
    fn memory_sink_collects_through_arc() {
        let sink = Arc::new(MemoryEventSink::new());
        let shared: Arc<MemoryEventSink> = Arc::clone(&sink);
        shared.emit(EngineEvent::ModelReverted { sample_count: 3 });
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.take().len(), 1);
        assert!(sink.events().is_empty());
    }
}
