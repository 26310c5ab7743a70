use caption_classifier::{FeatureError, TrainError};
use caption_geometry::GeometryError;
use caption_stream::RecalcError;
use caption_types::BoxId;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Recalc(#[from] RecalcError<StoreError>),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("box {0} has no user label")]
    Unlabeled(BoxId),
}
