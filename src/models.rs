use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Athlete metric values for one test, keyed by the exact metric name used
/// when the reference ranges were built. `None` marks a missing reading.
pub type MetricValues = BTreeMap<String, Option<f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub test_type: String,
    pub metric_name: String,
    pub value: f64,
}

/// Professional reference distribution for one (test type, metric name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileRange {
    pub test_type: String,
    pub metric_name: String,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub min: f64,
    pub max: f64,
    pub sample_size: usize,
    pub last_updated: DateTime<Utc>,
}

impl PercentileRange {
    /// True when `min <= p25 <= p50 <= p75 <= max` over finite values.
    pub fn is_ordered(&self) -> bool {
        let points = [self.min, self.p25, self.p50, self.p75, self.max];
        points.iter().all(|v| v.is_finite()) && points.windows(2).all(|w| w[0] <= w[1])
    }

    pub fn snapshot(&self) -> RangeSnapshot {
        RangeSnapshot {
            p25: self.p25,
            p50: self.p50,
            p75: self.p75,
            min: self.min,
            max: self.max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeSnapshot {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Elite,
    AboveAverage,
    Average,
    BelowAverage,
    InsufficientData,
}

impl Tier {
    pub fn color(self) -> &'static str {
        match self {
            Tier::Elite => "green",
            Tier::AboveAverage => "lightgreen",
            Tier::Average => "yellow",
            Tier::BelowAverage => "red",
            Tier::InsufficientData => "gray",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Elite => "Elite",
            Tier::AboveAverage => "Above Average",
            Tier::Average => "Average",
            Tier::BelowAverage => "Needs Improvement",
            Tier::InsufficientData => "No Data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRanking {
    pub metric_name: String,
    pub value: Option<f64>,
    /// Rounded, unclamped. Values outside [min, max] extrapolate past 0 or 100.
    pub percentile: Option<f64>,
    pub tier: Tier,
    pub color: String,
    pub label: String,
    pub reference: Option<RangeSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Strength,
    Improvement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub metric_name: String,
    pub kind: InsightKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallRank {
    Elite,
    AboveAverage,
    Average,
    Developing,
}

impl OverallRank {
    pub fn label(self) -> &'static str {
        match self {
            OverallRank::Elite => "Elite",
            OverallRank::AboveAverage => "Above Average",
            OverallRank::Average => "Average",
            OverallRank::Developing => "Developing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestComparison {
    pub test_type: String,
    pub metrics: BTreeMap<String, MetricRanking>,
    pub insights: Vec<Insight>,
    pub average_percentile: Option<f64>,
    pub overall_rank: Option<OverallRank>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteProfile {
    pub tests: Vec<TestComparison>,
    pub strengths: Vec<Insight>,
    pub improvements: Vec<Insight>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestInput {
    pub test_type: String,
    #[serde(default)]
    pub metrics: MetricValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteInput {
    pub athlete: String,
    #[serde(default)]
    pub tests: Vec<TestInput>,
}
