//! Caption layout inference from box position statistics.

pub mod analyzer;
pub mod density;
pub mod stats;

pub use analyzer::{GeometryConfig, GeometryError, OUTLIER_K, analyze_layout};
pub use stats::{MAX_OUTLIER_FRACTION, binned_mode, filter_outliers};
