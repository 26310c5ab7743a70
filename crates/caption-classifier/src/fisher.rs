use crate::gaussian::{ClassModel, Model};

/// Below this many training samples the scores are noise; callers gate on it.
pub const MIN_SAMPLES_FOR_IMPORTANCE: usize = 50;
const MIN_DIVISOR: f64 = 1e-10;

/// Per-feature `(mu_in - mu_out)^2 / (var_in + var_out)`, scaled so the best feature is 1.
pub fn fisher_scores(in_class: &ClassModel, out_class: &ClassModel) -> Vec<f64> {
    let raw: Vec<f64> = in_class
        .params
        .iter()
        .zip(&out_class.params)
        .map(|(a, b)| {
            let spread = a.std * a.std + b.std * b.std;
            let gap = a.mean - b.mean;
            if spread > 0.0 { gap * gap / spread } else { 0.0 }
        })
        .collect();
    let max = raw.iter().copied().fold(0.0_f64, f64::max).max(MIN_DIVISOR);
    raw.into_iter().map(|score| score / max).collect()
}

/// Fisher scores for a trained model with enough samples behind it.
pub fn feature_importance(model: &Model, min_samples: usize) -> Option<Vec<f64>> {
    if model.sample_count < min_samples {
        return None;
    }
    Some(fisher_scores(&model.in_class, &model.out_class))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaussian::GaussianParams;
    use crate::seed::seed_model;

    fn class(params: &[(f64, f64)]) -> ClassModel {
        ClassModel {
            params: params
                .iter()
                .map(|&(m, s)| GaussianParams::new(m, s))
                .collect(),
            prior: 0.5,
        }
    }

    #[test]
    fn scores_are_normalized_to_the_strongest_feature() {
        let a = class(&[(0.0, 1.0), (4.0, 1.0), (1.0, 1.0)]);
        let b = class(&[(0.0, 1.0), (0.0, 1.0), (0.0, 1.0)]);
        let scores = fisher_scores(&a, &b);
        assert_eq!(scores[0], 0.0);
        assert!((scores[1] - 1.0).abs() < 1e-12);
        assert!((scores[2] - 1.0 / 16.0).abs() < 1e-12);
    }

    #[test]
    fn identical_classes_score_zero_everywhere() {
        let a = class(&[(1.0, 1.0), (2.0, 0.5)]);
        let scores = fisher_scores(&a, &a.clone());
        assert!(scores.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn importance_is_gated_on_sample_count() {
        let model = seed_model();
        assert!(feature_importance(&model, MIN_SAMPLES_FOR_IMPORTANCE).is_none());
        let mut trained = model.clone();
        trained.sample_count = 60;
        let scores = feature_importance(&trained, MIN_SAMPLES_FOR_IMPORTANCE).unwrap();
        assert_eq!(scores.len(), trained.feature_count);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }
}
