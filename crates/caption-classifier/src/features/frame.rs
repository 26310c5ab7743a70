//! Nine-feature configuration used by per-frame prediction.

use caption_types::{FeatureVector, OcrBox};

use super::neighborhood::{nearest, neighborhood_score};
use super::{FeatureError, FrameContext, aspect_ratio};

pub const FRAME_FEATURE_COUNT: usize = 9;

pub const TOP_ALIGNMENT: usize = 0;
pub const BOTTOM_ALIGNMENT: usize = 1;
pub const HEIGHT_SIMILARITY: usize = 2;
pub const HORIZONTAL_CLUSTERING: usize = 3;
pub const ASPECT_RATIO: usize = 4;
pub const VERTICAL_POSITION: usize = 5;
pub const AREA: usize = 6;
pub const LABELED_IN: usize = 7;
pub const LABELED_OUT: usize = 8;

/// Display names indexed like the frame feature vector.
pub const FRAME_FEATURE_NAMES: [&str; FRAME_FEATURE_COUNT] = [
    "top_alignment",
    "bottom_alignment",
    "height_similarity",
    "horizontal_clustering",
    "aspect_ratio",
    "vertical_position",
    "area",
    "labeled_in",
    "labeled_out",
];

fn vertical_distance(a: &OcrBox, b: &OcrBox) -> f64 {
    (a.bounds.center_y() - b.bounds.center_y()).abs()
}

fn horizontal_distance(a: &OcrBox, b: &OcrBox) -> f64 {
    (a.bounds.center_x() - b.bounds.center_x()).abs()
}

pub fn extract_frame_features(
    target: &OcrBox,
    context: &FrameContext<'_>,
) -> Result<FeatureVector, FeatureError> {
    context.dims.validate()?;
    let frame_height = context.dims.height as f64;

    let row_neighbors = nearest(target, context.others(target), vertical_distance);
    let column_neighbors = nearest(target, context.others(target), horizontal_distance);

    let mut values = vec![0.0; FRAME_FEATURE_COUNT];
    values[TOP_ALIGNMENT] = neighborhood_score(target, &row_neighbors, |b| b.bounds.top);
    values[BOTTOM_ALIGNMENT] = neighborhood_score(target, &row_neighbors, |b| b.bounds.bottom);
    values[HEIGHT_SIMILARITY] = neighborhood_score(target, &row_neighbors, |b| b.bounds.height());
    values[HORIZONTAL_CLUSTERING] =
        neighborhood_score(target, &column_neighbors, |b| b.bounds.center_x());
    values[ASPECT_RATIO] = aspect_ratio(target);
    values[VERTICAL_POSITION] = target.bounds.center_y() / frame_height;
    values[AREA] = target.bounds.area() / context.dims.area();

    let (labeled_in, labeled_out) = context.label_flags(target.id);
    values[LABELED_IN] = labeled_in;
    values[LABELED_OUT] = labeled_out;

    Ok(FeatureVector::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::NoLabels;
    use caption_types::{BoxBounds, BoxId, FrameDims, Label};

    fn caption_row() -> Vec<OcrBox> {
        (0..6)
            .map(|i| {
                let left = 100.0 + i as f64 * 120.0;
                let top = 600.0 + (i % 2) as f64;
                let bottom = 640.0 + (i % 3) as f64;
                OcrBox::new(
                    BoxId::new(3, i),
                    BoxBounds::new(left, top, left + 100.0, bottom),
                    "word",
                )
            })
            .collect()
    }

    #[test]
    fn aligned_row_scores_small_deviation() {
        let boxes = caption_row();
        let labels = NoLabels;
        let context = FrameContext::new(&boxes, FrameDims::new(1280, 720), &labels);
        let features = extract_frame_features(&boxes[2], &context).unwrap();
        assert_eq!(features.len(), FRAME_FEATURE_COUNT);
        assert!(features[TOP_ALIGNMENT] < 3.0);
        assert!(features[BOTTOM_ALIGNMENT] < 3.0);
        assert!(features[HEIGHT_SIMILARITY] < 3.0);
        // 100 x 42
        assert!((features[ASPECT_RATIO] - 100.0 / 42.0).abs() < 1e-12);
        assert!((features[VERTICAL_POSITION] - 621.0 / 720.0).abs() < 1e-12);
    }

    #[test]
    fn misaligned_box_deviates_from_row() {
        let mut boxes = caption_row();
        boxes.push(OcrBox::new(
            BoxId::new(3, 99),
            BoxBounds::new(400.0, 610.0, 480.0, 700.0),
            "logo",
        ));
        let labels = NoLabels;
        let context = FrameContext::new(&boxes, FrameDims::new(1280, 720), &labels);
        let features = extract_frame_features(&boxes[6], &context).unwrap();
        assert!(features[BOTTOM_ALIGNMENT] > 5.0);
        assert!(features[HEIGHT_SIMILARITY] > 5.0);
    }

    #[test]
    fn label_lookup_sets_binary_flags() {
        let boxes = caption_row();
        let labels = |id: BoxId| (id.box_index == 1).then_some(Label::Out);
        let context = FrameContext::new(&boxes, FrameDims::new(1280, 720), &labels);
        let labeled = extract_frame_features(&boxes[1], &context).unwrap();
        let unlabeled = extract_frame_features(&boxes[0], &context).unwrap();
        assert_eq!((labeled[LABELED_IN], labeled[LABELED_OUT]), (0.0, 1.0));
        assert_eq!((unlabeled[LABELED_IN], unlabeled[LABELED_OUT]), (0.0, 0.0));
    }

    #[test]
    fn zero_sized_frame_is_rejected() {
        let boxes = caption_row();
        let labels = NoLabels;
        let context = FrameContext::new(&boxes, FrameDims::new(0, 720), &labels);
        assert!(extract_frame_features(&boxes[0], &context).is_err());
    }
}
