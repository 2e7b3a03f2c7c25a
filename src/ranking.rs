//! Ranks athlete metric values against professional reference ranges and
//! rolls the rankings up into per-test and per-athlete summaries.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::models::{
    AthleteProfile, Insight, InsightKind, MetricRanking, MetricValues, OverallRank,
    PercentileRange, TestComparison, TestInput, Tier,
};
use crate::store::RangeStore;

pub const ELITE_SUMMARY: &str =
    "Elite athlete: most tests rank in the top quartile of professional benchmarks.";
pub const STRONG_SUMMARY: &str =
    "Strong athlete: most tests rank above the professional median.";
pub const DEVELOPING_SUMMARY: &str =
    "Developing athlete: several tests sit below the professional median.";

/// Ranks one value against its reference range.
///
/// The percentile is interpolated linearly inside the band the value falls
/// in (min-p25, p25-p50, p50-p75, p75-max), each band spanning 25 points.
/// The result is rounded but not clamped, so values beyond min or max
/// extrapolate below 0 or above 100. A zero-width band resolves to its lower
/// percentile when the value sits on the band's start and to its upper
/// percentile otherwise.
pub fn rank(metric_name: &str, value: Option<f64>, range: Option<&PercentileRange>) -> MetricRanking {
    let (value, range) = match (value, range) {
        (Some(v), Some(r)) if v.is_finite() && r.is_ordered() => (v, r),
        _ => return insufficient(metric_name, value),
    };

    let (percentile, tier) = if value >= range.p75 {
        (band(value, range.p75, range.max, 75.0), Tier::Elite)
    } else if value >= range.p50 {
        (band(value, range.p50, range.p75, 50.0), Tier::AboveAverage)
    } else if value >= range.p25 {
        (band(value, range.p25, range.p50, 25.0), Tier::Average)
    } else {
        (band(value, range.min, range.p25, 0.0), Tier::BelowAverage)
    };

    MetricRanking {
        metric_name: metric_name.to_string(),
        value: Some(value),
        // + 0.0 folds a rounded -0.0 into 0.0
        percentile: Some(percentile.round() + 0.0),
        tier,
        color: tier.color().to_string(),
        label: tier.label().to_string(),
        reference: Some(range.snapshot()),
    }
}

fn band(value: f64, start: f64, end: f64, start_pct: f64) -> f64 {
    let width = end - start;
    if width <= 0.0 {
        return if value <= start { start_pct } else { start_pct + 25.0 };
    }
    start_pct + (value - start) / width * 25.0
}

fn insufficient(metric_name: &str, value: Option<f64>) -> MetricRanking {
    let tier = Tier::InsufficientData;
    MetricRanking {
        metric_name: metric_name.to_string(),
        value: value.filter(|v| v.is_finite()),
        percentile: None,
        tier,
        color: tier.color().to_string(),
        label: tier.label().to_string(),
        reference: None,
    }
}

pub fn insight_for(ranking: &MetricRanking) -> Option<Insight> {
    let (kind, message) = match ranking.tier {
        Tier::Elite => (
            InsightKind::Strength,
            format!("{}: Elite level (top 25% of pros)", ranking.metric_name),
        ),
        Tier::BelowAverage => (
            InsightKind::Improvement,
            format!("{}: Focus area - below pro baseline", ranking.metric_name),
        ),
        _ => return None,
    };
    Some(Insight {
        metric_name: ranking.metric_name.clone(),
        kind,
        message,
    })
}

pub fn overall_rank(average_percentile: f64) -> OverallRank {
    if average_percentile >= 75.0 {
        OverallRank::Elite
    } else if average_percentile >= 50.0 {
        OverallRank::AboveAverage
    } else if average_percentile >= 25.0 {
        OverallRank::Average
    } else {
        OverallRank::Developing
    }
}

/// Compares one test against ranges already fetched for its test type.
/// Only metrics with a finite value and a matching range appear in the
/// result; the rest are left out.
pub fn compare_test_against(
    test_type: &str,
    values: &MetricValues,
    ranges: &HashMap<String, PercentileRange>,
) -> TestComparison {
    let mut metrics = BTreeMap::new();
    for (name, value) in values {
        let Some(value) = value.filter(|v| v.is_finite()) else {
            continue;
        };
        let Some(range) = ranges.get(name) else {
            continue;
        };
        metrics.insert(name.clone(), rank(name, Some(value), Some(range)));
    }

    let insights: Vec<Insight> = metrics.values().filter_map(insight_for).collect();

    let percentiles: Vec<f64> = metrics.values().filter_map(|m| m.percentile).collect();
    let average_percentile = if percentiles.is_empty() {
        None
    } else {
        Some(percentiles.iter().sum::<f64>() / percentiles.len() as f64)
    };

    TestComparison {
        test_type: test_type.to_string(),
        metrics,
        insights,
        average_percentile,
        overall_rank: average_percentile.map(overall_rank),
    }
}

/// Folds per-test comparisons into an athlete profile. The summary needs a
/// strict majority: an exact half split falls through to the weaker sentence.
pub fn summarize_profile(tests: Vec<TestComparison>) -> AthleteProfile {
    let mut strengths = Vec::new();
    let mut improvements = Vec::new();
    for insight in tests.iter().flat_map(|t| t.insights.iter()) {
        match insight.kind {
            InsightKind::Strength => strengths.push(insight.clone()),
            InsightKind::Improvement => improvements.push(insight.clone()),
        }
    }

    let total = tests.len();
    let elite = tests
        .iter()
        .filter(|t| t.overall_rank == Some(OverallRank::Elite))
        .count();
    let strong = tests
        .iter()
        .filter(|t| {
            matches!(
                t.overall_rank,
                Some(OverallRank::Elite) | Some(OverallRank::AboveAverage)
            )
        })
        .count();

    let summary = if elite * 2 > total {
        ELITE_SUMMARY
    } else if strong * 2 > total {
        STRONG_SUMMARY
    } else {
        DEVELOPING_SUMMARY
    };

    AthleteProfile {
        tests,
        strengths,
        improvements,
        summary: summary.to_string(),
    }
}

/// Store-backed entry point. Each test costs one batched range fetch; a
/// failed fetch is logged and treated as "no ranges".
pub struct ComparisonEngine<'a, S: RangeStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RangeStore + ?Sized> ComparisonEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn compare_test(&self, values: &MetricValues, test_type: &str) -> TestComparison {
        let ranges = self.ranges_for(test_type).await;
        compare_test_against(test_type, values, &ranges)
    }

    pub async fn compare_profile(&self, tests: &[TestInput]) -> AthleteProfile {
        let mut comparisons = Vec::with_capacity(tests.len());
        for test in tests {
            comparisons.push(self.compare_test(&test.metrics, &test.test_type).await);
        }
        summarize_profile(comparisons)
    }

    async fn ranges_for(&self, test_type: &str) -> HashMap<String, PercentileRange> {
        match self.store.get_ranges_for_test_type(test_type).await {
            Ok(ranges) => ranges,
            Err(err) => {
                warn!(%test_type, error = %err, "range lookup failed, ranking without references");
                HashMap::new()
            }
        }
    }
}
