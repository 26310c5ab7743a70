//! JSON session snapshots: everything the in-memory store holds, on disk.

use std::fs;
use std::path::{Path, PathBuf};

use caption_classifier::Model;
use caption_engine::{MemoryStore, StoreError};
use caption_types::{BoxId, CaptionSpan, FrameDims, Label, LayoutRecord, OcrBox, Prediction};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write snapshot {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid snapshot {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEntry {
    pub frame_index: u64,
    #[serde(flatten)]
    pub span: CaptionSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub id: BoxId,
    pub label: Label,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEntry {
    pub id: BoxId,
    #[serde(flatten)]
    pub prediction: Prediction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub dims: FrameDims,
    #[serde(default)]
    pub boxes: Vec<OcrBox>,
    #[serde(default)]
    pub spans: Vec<SpanEntry>,
    #[serde(default)]
    pub labels: Vec<LabelEntry>,
    #[serde(default)]
    pub predictions: Vec<PredictionEntry>,
    #[serde(default)]
    pub model: Option<Model>,
    #[serde(default)]
    pub layout: Option<LayoutRecord>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let contents = fs::read_to_string(path).map_err(|source| SnapshotError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| SnapshotError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path, pretty: bool) -> Result<(), SnapshotError> {
        let encoded = if pretty {
            serde_json::to_vec_pretty(self)
        } else {
            serde_json::to_vec(self)
        }
        .map_err(SnapshotError::Encode)?;

        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SnapshotError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, encoded).map_err(|source| SnapshotError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rebuilds a store; labels must point at boxes present in the snapshot.
    pub fn into_store(self) -> Result<MemoryStore, SnapshotError> {
        let mut store = MemoryStore::new(self.dims);
        store.insert_boxes(self.boxes);
        for entry in self.spans {
            store.set_span(entry.frame_index, entry.span);
        }
        for entry in self.labels {
            store.set_label(entry.id, entry.label)?;
        }
        store.restore_predictions(
            self.predictions
                .into_iter()
                .map(|entry| (entry.id, entry.prediction)),
        );
        store.restore(self.model, self.layout);
        Ok(store)
    }

    /// Captures a store with entries sorted by box id so diffs stay stable.
    pub fn from_store(store: &MemoryStore) -> Self {
        let mut labels: Vec<LabelEntry> = store
            .labels()
            .map(|(id, label)| LabelEntry { id, label })
            .collect();
        labels.sort_by_key(|entry| entry.id);

        let mut predictions: Vec<PredictionEntry> = store
            .predictions()
            .map(|(id, prediction)| PredictionEntry {
                id,
                prediction: prediction.clone(),
            })
            .collect();
        predictions.sort_by_key(|entry| entry.id);

        Self {
            dims: store.dims(),
            boxes: store.boxes().cloned().collect(),
            spans: store
                .spans()
                .map(|(frame_index, span)| SpanEntry { frame_index, span })
                .collect(),
            labels,
            predictions,
            model: store.stored_model().cloned(),
            layout: store.stored_layout().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use caption_types::BoxBounds;

    use super::*;

    #[test]
    fn minimal_snapshot_only_needs_dims() {
        let snapshot: Snapshot =
            serde_json::from_str(r#"{"dims":{"width":640,"height":360}}"#).unwrap();
        assert_eq!(snapshot.dims, FrameDims::new(640, 360));
        assert!(snapshot.boxes.is_empty());
        assert!(snapshot.model.is_none());
    }

    #[test]
    fn label_for_missing_box_is_rejected() {
        let snapshot = Snapshot {
            dims: FrameDims::new(640, 360),
            boxes: vec![OcrBox::new(
                BoxId::new(0, 0),
                BoxBounds::new(10.0, 300.0, 200.0, 330.0),
                "hi",
            )],
            spans: Vec::new(),
            labels: vec![LabelEntry {
                id: BoxId::new(0, 1),
                label: Label::In,
            }],
            predictions: Vec::new(),
            model: None,
            layout: None,
        };
        let err = snapshot.into_store().unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Store(StoreError::UnknownBox(id)) if id == BoxId::new(0, 1)
        ));
    }

    #[test]
    fn prediction_entries_are_flat() {
        let entry = PredictionEntry {
            id: BoxId::new(3, 1),
            prediction: Prediction::new(Label::Out, 0.75, "gnb-2"),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"]["frame_index"], 3);
        assert_eq!(json["label"], "out");
        assert_eq!(json["model_version"], "gnb-2");
    }
}
