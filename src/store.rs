//! Storage boundary for percentile reference ranges.
//!
//! The builder writes through [`RangeStore::upsert_range`] and the comparison
//! engine only reads. Keys are `(test_type, metric_name)` compared exactly,
//! case-sensitive.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::models::PercentileRange;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("range store unavailable: {0}")]
    Unavailable(String),

    #[error("range store query failed: {0}")]
    Query(String),

    #[error("corrupt range for {test_type}/{metric_name}: {reason}")]
    Corrupt {
        test_type: String,
        metric_name: String,
        reason: String,
    },
}

#[async_trait]
pub trait RangeStore: Send + Sync {
    async fn get_range(
        &self,
        test_type: &str,
        metric_name: &str,
    ) -> StoreResult<Option<PercentileRange>>;

    /// All ranges for one test type, keyed by metric name. Lets callers
    /// compare a whole test with a single round-trip.
    async fn get_ranges_for_test_type(
        &self,
        test_type: &str,
    ) -> StoreResult<HashMap<String, PercentileRange>>;

    /// Replaces the row for the range's key, creating it if needed.
    async fn upsert_range(&self, range: &PercentileRange) -> StoreResult<()>;
}

/// In-process store backed by a map. Used for offline comparison against an
/// exported range file and in tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    ranges: Arc<RwLock<HashMap<(String, String), PercentileRange>>>,
}

impl MemoryStore {
    pub fn from_ranges<I>(ranges: I) -> Self
    where
        I: IntoIterator<Item = PercentileRange>,
    {
        let map = ranges
            .into_iter()
            .map(|r| ((r.test_type.clone(), r.metric_name.clone()), r))
            .collect();
        Self {
            ranges: Arc::new(RwLock::new(map)),
        }
    }

    /// Snapshot of every stored range, sorted by key.
    #[cfg(test)]
    pub fn all(&self) -> StoreResult<Vec<PercentileRange>> {
        let guard = self
            .ranges
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let mut ranges: Vec<PercentileRange> = guard.values().cloned().collect();
        ranges.sort_by(|a, b| {
            (a.test_type.as_str(), a.metric_name.as_str())
                .cmp(&(b.test_type.as_str(), b.metric_name.as_str()))
        });
        Ok(ranges)
    }
}

#[async_trait]
impl RangeStore for MemoryStore {
    async fn get_range(
        &self,
        test_type: &str,
        metric_name: &str,
    ) -> StoreResult<Option<PercentileRange>> {
        let guard = self
            .ranges
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(guard
            .get(&(test_type.to_string(), metric_name.to_string()))
            .cloned())
    }

    async fn get_ranges_for_test_type(
        &self,
        test_type: &str,
    ) -> StoreResult<HashMap<String, PercentileRange>> {
        let guard = self
            .ranges
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(guard
            .values()
            .filter(|r| r.test_type == test_type)
            .map(|r| (r.metric_name.clone(), r.clone()))
            .collect())
    }

    async fn upsert_range(&self, range: &PercentileRange) -> StoreResult<()> {
        let mut guard = self
            .ranges
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        guard.insert(
            (range.test_type.clone(), range.metric_name.clone()),
            range.clone(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::percentile::compute_range;

    #[tokio::test]
    async fn upsert_replaces_existing_key() {
        let store = MemoryStore::default();
        let first = compute_range("cmj", "jump_height_cm", [30.0, 40.0]).unwrap();
        let second = compute_range("cmj", "jump_height_cm", [50.0, 60.0, 70.0]).unwrap();

        store.upsert_range(&first).await.unwrap();
        store.upsert_range(&second).await.unwrap();

        assert_eq!(store.all().unwrap().len(), 1);
        let stored = store.get_range("cmj", "jump_height_cm").await.unwrap().unwrap();
        assert_eq!(stored.sample_size, 3);
        assert_eq!(stored.min, 50.0);
    }

    #[tokio::test]
    async fn lookups_are_case_sensitive() {
        let range = compute_range("cmj", "Jump Height", [30.0, 40.0]).unwrap();
        let store = MemoryStore::from_ranges([range]);

        assert!(store.get_range("cmj", "Jump Height").await.unwrap().is_some());
        assert!(store.get_range("cmj", "jump height").await.unwrap().is_none());
        assert!(store.get_range("CMJ", "Jump Height").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_lookup_filters_by_test_type() {
        let store = MemoryStore::from_ranges([
            compute_range("cmj", "jump_height_cm", [30.0, 40.0]).unwrap(),
            compute_range("cmj", "rsi_modified", [0.4, 0.6]).unwrap(),
            compute_range("imtp", "peak_force_n", [2500.0, 3100.0]).unwrap(),
        ]);

        let cmj = store.get_ranges_for_test_type("cmj").await.unwrap();
        assert_eq!(cmj.len(), 2);
        assert!(cmj.contains_key("jump_height_cm"));
        assert!(cmj.contains_key("rsi_modified"));
        assert!(store.get_ranges_for_test_type("hop").await.unwrap().is_empty());
    }
}
