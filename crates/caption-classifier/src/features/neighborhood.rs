//! k-nearest neighbourhood statistics shared by both extractor configurations.

use caption_types::OcrBox;

// Never look at fewer than this many neighbours when the frame has them.
const MIN_NEIGHBORS: usize = 5;
const NEIGHBOR_FRACTION: f64 = 0.2;

/// k = max(5, ceil(0.2 * other_count)).
pub fn neighbor_count(other_count: usize) -> usize {
    let scaled = (other_count as f64 * NEIGHBOR_FRACTION).ceil() as usize;
    MIN_NEIGHBORS.max(scaled)
}

/// Returns the `k` boxes closest to `target` under `distance`, nearest first.
///
/// Ties keep frame order so the selection is deterministic.
pub fn nearest<'a, I, D>(target: &OcrBox, others: I, distance: D) -> Vec<&'a OcrBox>
where
    I: IntoIterator<Item = &'a OcrBox>,
    D: Fn(&OcrBox, &OcrBox) -> f64,
{
    let mut scored: Vec<(f64, &'a OcrBox)> = others
        .into_iter()
        .map(|other| (distance(target, other), other))
        .filter(|(d, _)| d.is_finite())
        .collect();
    let k = neighbor_count(scored.len());
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
    scored.truncate(k);
    scored.into_iter().map(|(_, other)| other).collect()
}

/// `|value - mean| / std` over the neighbourhood, 0 when it is too small or flat.
pub fn deviation_score(value: f64, neighborhood: &[f64]) -> f64 {
    if neighborhood.len() < 2 {
        return 0.0;
    }
    let n = neighborhood.len() as f64;
    let mean = neighborhood.iter().sum::<f64>() / n;
    let variance = neighborhood
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std = variance.sqrt();
    if std <= 0.0 || !std.is_finite() {
        return 0.0;
    }
    (value - mean).abs() / std
}

/// Scores `target` against its neighbours on one dimension.
pub fn neighborhood_score<F>(target: &OcrBox, neighbors: &[&OcrBox], dimension: F) -> f64
where
    F: Fn(&OcrBox) -> f64,
{
    let values: Vec<f64> = neighbors.iter().map(|other| dimension(other)).collect();
    deviation_score(dimension(target), &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use caption_types::{BoxBounds, BoxId};

    fn boxed(index: u32, top: f64) -> OcrBox {
        OcrBox::new(
            BoxId::new(0, index),
            BoxBounds::new(0.0, top, 10.0, top + 10.0),
            "",
        )
    }

    #[test]
    fn neighbor_count_has_floor_of_five() {
        assert_eq!(neighbor_count(0), 5);
        assert_eq!(neighbor_count(10), 5);
        assert_eq!(neighbor_count(26), 6);
        assert_eq!(neighbor_count(100), 20);
    }

    #[test]
    fn deviation_score_is_zero_for_flat_or_tiny_neighborhoods() {
        assert_eq!(deviation_score(5.0, &[]), 0.0);
        assert_eq!(deviation_score(5.0, &[1.0]), 0.0);
        assert_eq!(deviation_score(5.0, &[3.0, 3.0, 3.0]), 0.0);
    }

    #[test]
    fn deviation_score_uses_population_std() {
        // mean 2, std 1
        let score = deviation_score(4.0, &[1.0, 3.0]);
        assert!((score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn nearest_picks_closest_boxes_first() {
        let target = boxed(0, 100.0);
        let others: Vec<OcrBox> = (1..=8).map(|i| boxed(i, 100.0 + i as f64 * 10.0)).collect();
        let picked = nearest(&target, &others, |a, b| {
            (a.bounds.center_y() - b.bounds.center_y()).abs()
        });
        assert_eq!(picked.len(), 5);
        assert_eq!(picked[0].id.box_index, 1);
        assert_eq!(picked[4].id.box_index, 5);
    }
}
