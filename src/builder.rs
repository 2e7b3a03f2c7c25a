use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::models::MetricSample;
use crate::percentile::compute_range;
use crate::store::RangeStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Metrics with no finite samples; nothing is stored for them.
    pub skipped: usize,
}

pub struct ReferenceBuilder<'a, S: RangeStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RangeStore + ?Sized> ReferenceBuilder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Recomputes and upserts one range per (test type, metric name) found in
    /// `samples`. Each metric is independent: a failed write is logged and
    /// counted, and the run moves on to the next metric.
    pub async fn build(&self, samples: &[MetricSample]) -> BuildSummary {
        let grouped = group_samples(samples);
        let mut summary = BuildSummary::default();

        for ((test_type, metric_name), values) in grouped {
            let Some(range) = compute_range(&test_type, &metric_name, values) else {
                debug!(%test_type, %metric_name, "no finite samples, skipping");
                summary.skipped += 1;
                continue;
            };

            match self.store.upsert_range(&range).await {
                Ok(()) => {
                    debug!(
                        %test_type,
                        %metric_name,
                        sample_size = range.sample_size,
                        "range stored"
                    );
                    summary.succeeded += 1;
                }
                Err(err) => {
                    warn!(%test_type, %metric_name, error = %err, "failed to store range");
                    summary.failed += 1;
                }
            }
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "reference build finished"
        );
        summary
    }
}

fn group_samples(samples: &[MetricSample]) -> BTreeMap<(String, String), Vec<f64>> {
    let mut grouped: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
    for sample in samples {
        let entry = grouped
            .entry((sample.test_type.clone(), sample.metric_name.clone()))
            .or_default();
        if sample.value.is_finite() {
            entry.push(sample.value);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PercentileRange;
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn sample(test_type: &str, metric_name: &str, value: f64) -> MetricSample {
        MetricSample {
            test_type: test_type.to_string(),
            metric_name: metric_name.to_string(),
            value,
        }
    }

    /// Rejects writes for one metric and delegates everything else.
    struct FlakyStore {
        inner: MemoryStore,
        broken_metric: &'static str,
    }

    #[async_trait]
    impl RangeStore for FlakyStore {
        async fn get_range(
            &self,
            test_type: &str,
            metric_name: &str,
        ) -> StoreResult<Option<PercentileRange>> {
            self.inner.get_range(test_type, metric_name).await
        }

        async fn get_ranges_for_test_type(
            &self,
            test_type: &str,
        ) -> StoreResult<HashMap<String, PercentileRange>> {
            self.inner.get_ranges_for_test_type(test_type).await
        }

        async fn upsert_range(&self, range: &PercentileRange) -> StoreResult<()> {
            if range.metric_name == self.broken_metric {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.upsert_range(range).await
        }
    }

    #[tokio::test]
    async fn builds_one_range_per_key() {
        let store = MemoryStore::default();
        let samples = vec![
            sample("cmj", "jump_height_cm", 40.0),
            sample("cmj", "jump_height_cm", 44.0),
            sample("cmj", "jump_height_cm", 48.0),
            sample("cmj", "rsi_modified", 0.55),
            sample("imtp", "peak_force_n", 3100.0),
        ];

        let summary = ReferenceBuilder::new(&store).build(&samples).await;

        assert_eq!(
            summary,
            BuildSummary {
                succeeded: 3,
                failed: 0,
                skipped: 0
            }
        );
        let jump = store.get_range("cmj", "jump_height_cm").await.unwrap().unwrap();
        assert_eq!(jump.sample_size, 3);
        assert_eq!(jump.p50, 44.0);
    }

    #[tokio::test]
    async fn skips_metrics_with_only_non_finite_samples() {
        let store = MemoryStore::default();
        let samples = vec![
            sample("cmj", "jump_height_cm", 40.0),
            sample("cmj", "rsi_modified", f64::NAN),
        ];

        let summary = ReferenceBuilder::new(&store).build(&samples).await;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped, 1);
        assert!(store.get_range("cmj", "rsi_modified").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_failure_does_not_abort_other_metrics() {
        let store = FlakyStore {
            inner: MemoryStore::default(),
            broken_metric: "rsi_modified",
        };
        let samples = vec![
            sample("cmj", "contraction_time_ms", 780.0),
            sample("cmj", "jump_height_cm", 40.0),
            sample("cmj", "rsi_modified", 0.5),
            sample("cmj", "peak_power_w_per_kg", 58.0),
        ];

        let summary = ReferenceBuilder::new(&store).build(&samples).await;

        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(store.inner.all().unwrap().len(), 3);
        assert!(store
            .get_range("cmj", "peak_power_w_per_kg")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_values() {
        let store = MemoryStore::default();
        let builder = ReferenceBuilder::new(&store);

        builder.build(&[sample("cmj", "jump_height_cm", 30.0)]).await;
        builder
            .build(&[
                sample("cmj", "jump_height_cm", 50.0),
                sample("cmj", "jump_height_cm", 60.0),
            ])
            .await;

        let range = store.get_range("cmj", "jump_height_cm").await.unwrap().unwrap();
        assert_eq!(range.sample_size, 2);
        assert_eq!(range.min, 50.0);
        assert_eq!(store.all().unwrap().len(), 1);
    }
}
