use caption_classifier::{CovarianceInverse, mahalanobis_distance};
use caption_types::{BoxId, FeatureVector, Label};

const UNCERTAINTY_WEIGHT: f64 = 0.4;
const SIMILARITY_WEIGHT: f64 = 0.4;
const BOUNDARY_WEIGHT: f64 = 0.2;
const SIMILARITY_SIGMA: f64 = 3.0;

pub const MIN_CHANGE_PROBABILITY: f64 = 0.05;

/// An unlabeled box together with its current prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: BoxId,
    pub features: FeatureVector,
    pub label: Label,
    pub confidence: f64,
}

/// The label that triggered the update.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: BoxId,
    pub features: FeatureVector,
    pub label: Label,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub probability: f64,
}

fn similarity(candidate: &Candidate, annotation: &Annotation, inverse: &CovarianceInverse) -> f64 {
    let distance = mahalanobis_distance(&candidate.features, &annotation.features, &inverse.matrix);
    if !distance.is_finite() {
        return 0.0;
    }
    (-(distance * distance) / (2.0 * SIMILARITY_SIGMA * SIMILARITY_SIGMA)).exp()
}

/// How likely `candidate` is to flip because of `annotation`, in `[0, 1]`.
pub fn estimate_change_probability(
    candidate: &Candidate,
    annotation: &Annotation,
    inverse: &CovarianceInverse,
) -> f64 {
    let confidence = candidate.confidence.clamp(0.0, 1.0);
    let uncertainty = 1.0 - confidence;
    let boundary = (1.0 - 2.0 * (confidence - 0.5).abs()).max(0.0);
    let probability = UNCERTAINTY_WEIGHT * uncertainty
        + SIMILARITY_WEIGHT * similarity(candidate, annotation, inverse)
        + BOUNDARY_WEIGHT * boundary;
    if probability.is_nan() {
        return 0.0;
    }
    probability.clamp(0.0, 1.0)
}

/// Candidates at or above `min_probability`, most likely to flip first.
pub fn select_candidates<I>(
    annotation: &Annotation,
    candidates: I,
    inverse: &CovarianceInverse,
    min_probability: f64,
) -> Vec<RankedCandidate>
where
    I: IntoIterator<Item = Candidate>,
{
    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .filter(|candidate| candidate.id != annotation.id)
        .filter_map(|candidate| {
            let probability = estimate_change_probability(&candidate, annotation, inverse);
            (probability >= min_probability).then_some(RankedCandidate {
                candidate,
                probability,
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(index: u32, features: &[f64], confidence: f64) -> Candidate {
        Candidate {
            id: BoxId::new(1, index),
            features: FeatureVector::new(features.to_vec()),
            label: Label::Out,
            confidence,
        }
    }

    fn annotation(features: &[f64]) -> Annotation {
        Annotation {
            id: BoxId::new(0, 0),
            features: FeatureVector::new(features.to_vec()),
            label: Label::In,
        }
    }

    #[test]
    fn undecided_identical_box_is_certain_to_be_revisited() {
        let inverse = CovarianceInverse::identity(3);
        let p = estimate_change_probability(
            &candidate(0, &[1.0, 2.0, 3.0], 0.5),
            &annotation(&[1.0, 2.0, 3.0]),
            &inverse,
        );
        assert!((p - 0.4 * 0.5 - 0.4 - 0.2).abs() < 1e-12);
    }

    #[test]
    fn distant_confident_box_scores_near_zero() {
        let inverse = CovarianceInverse::identity(2);
        let p = estimate_change_probability(
            &candidate(0, &[100.0, 100.0], 1.0),
            &annotation(&[0.0, 0.0]),
            &inverse,
        );
        assert!(p < 1e-6);
    }

    #[test]
    fn probability_stays_in_unit_interval() {
        let inverse = CovarianceInverse::identity(2);
        let target = annotation(&[0.0, 0.0]);
        for confidence in [-1.0, 0.0, 0.3, 0.5, 0.9, 1.0, 2.0, f64::NAN] {
            for offset in [0.0, 0.5, 3.0, 1e9, f64::INFINITY] {
                let p = estimate_change_probability(
                    &candidate(0, &[offset, 0.0], confidence),
                    &target,
                    &inverse,
                );
                assert!((0.0..=1.0).contains(&p), "{confidence} {offset} -> {p}");
            }
        }
    }

    #[test]
    fn selection_filters_and_ranks() {
        let inverse = CovarianceInverse::identity(2);
        let target = annotation(&[0.0, 0.0]);
        let ranked = select_candidates(
            &target,
            vec![
                candidate(0, &[50.0, 50.0], 0.99),
                candidate(1, &[4.0, 0.0], 0.8),
                candidate(2, &[0.0, 0.0], 0.55),
            ],
            &inverse,
            MIN_CHANGE_PROBABILITY,
        );
        let ids: Vec<u32> = ranked.iter().map(|r| r.candidate.id.box_index).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(ranked[0].probability >= ranked[1].probability);
    }

    #[test]
    fn the_annotated_box_itself_is_skipped() {
        let inverse = CovarianceInverse::identity(1);
        let target = annotation(&[0.0]);
        let mut same = candidate(0, &[0.0], 0.5);
        same.id = target.id;
        assert!(select_candidates(&target, vec![same], &inverse, 0.0).is_empty());
    }
}
