use chrono::Utc;

use crate::models::PercentileRange;

/// Quantile of an ascending slice by linear interpolation between order
/// statistics: position `q * (n - 1)`, blending the two neighbouring values.
/// `q` is a fraction in [0, 1] and is clamped to that interval.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(sorted[0]);
    }

    let position = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;

    if lo == hi {
        Some(sorted[lo])
    } else {
        let weight = position - lo as f64;
        Some(sorted[lo] + (sorted[hi] - sorted[lo]) * weight)
    }
}

/// Builds the reference range for one metric. Non-finite values are dropped;
/// if nothing is left there is no range to store.
pub fn compute_range<I>(test_type: &str, metric_name: &str, values: I) -> Option<PercentileRange>
where
    I: IntoIterator<Item = f64>,
{
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    Some(PercentileRange {
        test_type: test_type.to_string(),
        metric_name: metric_name.to_string(),
        p25: quantile(&sorted, 0.25)?,
        p50: quantile(&sorted, 0.50)?,
        p75: quantile(&sorted, 0.75)?,
        min: *sorted.first()?,
        max: *sorted.last()?,
        sample_size: sorted.len(),
        last_updated: Utc::now(),
    })
}
