use std::collections::BTreeMap;

/// Fraction of values the outlier filter may remove before it is ignored.
pub const MAX_OUTLIER_FRACTION: f64 = 0.10;

/// Linear-interpolation quantile of an ascending slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        n => {
            let position = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let fraction = position - lower as f64;
            Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
        }
    }
}

/// Drops values outside `[Q1 - k*IQR, Q3 + k*IQR]`, keeping input order.
///
/// When more than 10% of the values would go, the original values are
/// returned unchanged.
pub fn filter_outliers(values: &[f64], k: f64) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let (Some(q1), Some(q3)) = (quantile(&sorted, 0.25), quantile(&sorted, 0.75)) else {
        return Vec::new();
    };
    let iqr = q3 - q1;
    let low = q1 - k * iqr;
    let high = q3 + k * iqr;

    let kept: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| (low..=high).contains(v))
        .collect();
    let removed = values.len() - kept.len();
    if removed as f64 > values.len() as f64 * MAX_OUTLIER_FRACTION {
        log::debug!(
            "outlier filter would drop {removed} of {} values; keeping all",
            values.len()
        );
        return values.to_vec();
    }
    kept
}

/// Mean of the values falling into the most populated `bin`-wide bucket.
/// Ties go to the lowest bucket.
pub fn binned_mode(values: &[f64], bin: f64) -> Option<f64> {
    let bin = if bin > 0.0 { bin } else { 1.0 };
    let mut buckets: BTreeMap<i64, (usize, f64)> = BTreeMap::new();
    for &value in values.iter().filter(|v| v.is_finite()) {
        let entry = buckets
            .entry((value / bin).floor() as i64)
            .or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += value;
    }

    let mut best: Option<(usize, f64)> = None;
    for (count, sum) in buckets.into_values() {
        if best.is_none_or(|(best_count, _)| count > best_count) {
            best = Some((count, sum));
        }
    }
    best.map(|(count, sum)| sum / count as f64)
}

/// Root-mean-square deviation from `center`, over values within `window` of it.
pub fn spread_around(values: &[f64], center: f64, window: f64) -> f64 {
    let (count, total) = values
        .iter()
        .filter(|v| (*v - center).abs() <= window)
        .fold((0usize, 0.0), |(count, total), v| {
            let d = v - center;
            (count + 1, total + d * d)
        });
    if count == 0 {
        return 0.0;
    }
    (total / count as f64).sqrt()
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt()
}

pub fn min_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NAN, f64::min)
}

pub fn max_of(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NAN, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartiles_interpolate() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 1000.0];
        assert_eq!(quantile(&sorted, 0.25), Some(3.25));
        assert_eq!(quantile(&sorted, 0.75), Some(7.75));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn single_far_outlier_is_removed() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 1000.0];
        let kept = filter_outliers(&values, 3.0);
        assert_eq!(kept, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn aggressive_trimming_is_refused() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 500.0, 1000.0];
        assert_eq!(filter_outliers(&values, 3.0), values.to_vec());
    }

    #[test]
    fn mode_averages_the_fullest_bin() {
        let values = [600.0, 601.0, 603.0, 612.0, 200.0];
        assert_eq!(binned_mode(&values, 5.0), Some((600.0 + 601.0 + 603.0) / 3.0));
        assert_eq!(binned_mode(&[], 5.0), None);
        assert_eq!(binned_mode(&[3.0, 11.0], 2.0), Some(3.0));
    }

    #[test]
    fn spread_ignores_far_values() {
        let values = [98.0, 102.0, 900.0];
        assert!((spread_around(&values, 100.0, 100.0) - 2.0).abs() < 1e-12);
        assert_eq!(spread_around(&values, 5000.0, 100.0), 0.0);
    }

    #[test]
    fn extremes_skip_nothing() {
        assert_eq!(min_of(&[3.0, 1.0, 2.0]), 1.0);
        assert_eq!(max_of(&[3.0, 1.0, 2.0]), 3.0);
        assert!(min_of(&[]).is_nan());
    }
}
