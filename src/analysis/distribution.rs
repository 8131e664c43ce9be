//! Duration distribution helpers for the histogram view.

use crate::models::HistogramBucket;

/// Value at quantile `q` (0.0..=1.0) of an ascending slice, interpolating
/// linearly between neighbouring ranks.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// First and third quartiles, or `None` for an empty input.
pub fn quartiles(values: &[f64]) -> Option<(f64, f64)> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    Some((quantile_sorted(&sorted, 0.25), quantile_sorted(&sorted, 0.75)))
}

/// Drop values above the Tukey fence `Q3 + 1.5 * IQR`, keeping input order.
pub fn trim_outliers(values: &[f64]) -> Vec<f64> {
    let Some((q1, q3)) = quartiles(values) else {
        return Vec::new();
    };
    let fence = q3 + 1.5 * (q3 - q1);

    values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v <= fence)
        .collect()
}

/// Split `values` into `bins` equal-width buckets spanning min..=max.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBucket> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if max <= min {
        return vec![HistogramBucket {
            lower: min,
            upper: max,
            count: finite.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut buckets: Vec<HistogramBucket> = (0..bins)
        .map(|i| HistogramBucket {
            lower: min + width * i as f64,
            upper: if i + 1 == bins {
                max
            } else {
                min + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect();

    for value in finite {
        let index = (((value - min) / width).floor() as usize).min(bins - 1);
        buckets[index].count += 1;
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quartiles_interpolate() {
        let (q1, q3) = quartiles(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(q1, 1.75);
        assert_eq!(q3, 3.25);
        assert!(quartiles(&[]).is_none());
    }

    #[test]
    fn test_trim_outliers_drops_extreme_value() {
        let mut values: Vec<f64> = (0..99).map(|i| 0.9 + (i % 10) as f64 * 0.02).collect();
        values.push(1000.0);

        let trimmed = trim_outliers(&values);

        assert_eq!(trimmed.len(), 99);
        assert!(!trimmed.contains(&1000.0));
        assert_eq!(values.len(), 100);
    }

    #[test]
    fn test_trim_outliers_keeps_uniform_data() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(trim_outliers(&values), values);
        assert!(trim_outliers(&[]).is_empty());
    }

    #[test]
    fn test_histogram_buckets() {
        let buckets = histogram(&[0.0, 1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[1].count, 3);
        assert_eq!(buckets[1].upper, 4.0);

        let total: usize = histogram(&[0.5, 0.7, 9.0, 3.3], 4)
            .iter()
            .map(|b| b.count)
            .sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_histogram_degenerate_inputs() {
        assert!(histogram(&[], 10).is_empty());
        assert!(histogram(&[1.0], 0).is_empty());

        let single = histogram(&[2.0, 2.0, 2.0], 10);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].count, 3);
    }
}
