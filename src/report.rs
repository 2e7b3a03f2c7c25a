use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{AthleteProfile, Insight, MetricRanking, TestComparison};

/// Percentile as a bar/chart position. The engine keeps extrapolated values;
/// anything shown to a reader is pinned to [0, 100].
pub fn display_percentile(ranking: &MetricRanking) -> Option<f64> {
    ranking.percentile.map(|p| p.clamp(0.0, 100.0))
}

fn format_percentile(ranking: &MetricRanking) -> String {
    match display_percentile(ranking) {
        Some(p) => format!("{p:.0}th percentile"),
        None => "N/A".to_string(),
    }
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}"))
}

fn write_test(output: &mut String, test: &TestComparison) {
    let overall = test.overall_rank.map_or("N/A", |r| r.label());
    let _ = writeln!(output, "### {} (overall: {})", test.test_type, overall);

    if test.metrics.is_empty() {
        let _ = writeln!(output, "No metrics could be compared against pro benchmarks.");
        return;
    }

    for ranking in test.metrics.values() {
        let reference = ranking.reference.map_or_else(
            || "no reference".to_string(),
            |r| format!("pro p25 {:.2} / p50 {:.2} / p75 {:.2}", r.p25, r.p50, r.p75),
        );
        let _ = writeln!(
            output,
            "- {}: {} ({}, {}) vs {}",
            ranking.metric_name,
            format_value(ranking.value),
            format_percentile(ranking),
            ranking.label,
            reference
        );
    }
}

fn write_insights(output: &mut String, heading: &str, insights: &[Insight], empty: &str) {
    let _ = writeln!(output, "## {heading}");
    if insights.is_empty() {
        let _ = writeln!(output, "{empty}");
    } else {
        for insight in insights {
            let _ = writeln!(output, "- {}", insight.message);
        }
    }
}

pub fn build_report(athlete: &str, generated_on: NaiveDate, profile: &AthleteProfile) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Athlete Benchmark Report");
    let _ = writeln!(output, "Generated for {} on {}", athlete, generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "{}", profile.summary);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Test Rankings");

    if profile.tests.is_empty() {
        let _ = writeln!(output, "No tests submitted.");
    } else {
        for test in &profile.tests {
            write_test(&mut output, test);
        }
    }

    let _ = writeln!(output);
    write_insights(
        &mut output,
        "Strengths",
        &profile.strengths,
        "No metrics at elite level.",
    );
    let _ = writeln!(output);
    write_insights(
        &mut output,
        "Focus Areas",
        &profile.improvements,
        "No metrics below the pro baseline.",
    );

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PercentileRange, TestInput};
    use crate::ranking::{compare_test_against, rank, summarize_profile};
    use chrono::Utc;
    use std::collections::HashMap;

    fn jump_range() -> PercentileRange {
        PercentileRange {
            test_type: "cmj".to_string(),
            metric_name: "jump_height_cm".to_string(),
            p25: 10.0,
            p50: 20.0,
            p75: 30.0,
            min: 0.0,
            max: 40.0,
            sample_size: 12,
            last_updated: Utc::now(),
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    #[test]
    fn display_clamps_extrapolated_percentiles() {
        let range = jump_range();
        let below = rank("jump_height_cm", Some(-100.0), Some(&range));
        let above = rank("jump_height_cm", Some(80.0), Some(&range));
        let missing = rank("jump_height_cm", None, Some(&range));

        assert_eq!(display_percentile(&below), Some(0.0));
        assert_eq!(display_percentile(&above), Some(100.0));
        assert_eq!(display_percentile(&missing), None);
        assert_eq!(format_percentile(&missing), "N/A");
    }

    #[test]
    fn report_lists_rankings_and_insights() {
        let ranges: HashMap<String, PercentileRange> =
            [("jump_height_cm".to_string(), jump_range())].into_iter().collect();
        let input = TestInput {
            test_type: "cmj".to_string(),
            metrics: [("jump_height_cm".to_string(), Some(35.0))].into_iter().collect(),
        };
        let profile = summarize_profile(vec![compare_test_against(
            &input.test_type,
            &input.metrics,
            &ranges,
        )]);

        let report = build_report("Jordan Reyes", date(), &profile);

        assert!(report.contains("Generated for Jordan Reyes on 2026-10-15"));
        assert!(report.contains("### cmj (overall: Elite)"));
        assert!(report.contains("- jump_height_cm: 35.00 (88th percentile, Elite)"));
        assert!(report.contains("- jump_height_cm: Elite level (top 25% of pros)"));
        assert!(report.contains("No metrics below the pro baseline."));
    }

    #[test]
    fn report_marks_tests_without_rankings() {
        let profile = summarize_profile(vec![compare_test_against(
            "imtp",
            &[("peak_force_n".to_string(), Some(3000.0))].into_iter().collect(),
            &HashMap::new(),
        )]);

        let report = build_report("Jordan Reyes", date(), &profile);

        assert!(report.contains("### imtp (overall: N/A)"));
        assert!(report.contains("No metrics could be compared against pro benchmarks."));
        assert!(report.starts_with("# Athlete Benchmark Report"));
    }
}
