//! Sorted-sequence statistics: mean, population standard deviation and
//! percentile interpolation. Both helpers return `None` on empty input
//! instead of dividing by zero.

/// Population standard deviation and mean of `values`.
///
/// Mean of squared deviations from the mean, then square root. `None` when
/// `values` is empty.
pub fn std_dev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }

    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;

    let sq_mean = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / count;

    Some((sq_mean.sqrt(), mean))
}

/// Percentile of an already-sorted slice by linear interpolation.
///
/// `fraction` is in [0, 1]. Interpolates between the floor and ceiling index
/// of `(len - 1) * fraction`. `None` when the slice is empty.
pub fn percentile(sorted: &[f64], fraction: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let k = (sorted.len() - 1) as f64 * fraction;
    let f = k.floor();
    let c = k.ceil();
    if (f - c).abs() < f64::EPSILON {
        return Some(sorted[k as usize]);
    }

    let d0 = sorted[f as usize] * (c - k);
    let d1 = sorted[c as usize] * (k - f);
    Some(d0 + d1)
}
