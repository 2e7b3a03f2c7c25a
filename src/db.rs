use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use crate::models::{MetricSample, PercentileRange};
use crate::store::{RangeStore, StoreError, StoreResult};

const RANGE_COLUMNS: &str = "test_type, metric_name, p25, p50, p75, min_value, max_value, \
                             sample_size, last_updated";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed range store. Cloning shares the pool.
#[derive(Clone)]
pub struct PgRangeStore {
    pool: PgPool,
}

impl PgRangeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_ranges(&self, test_type: Option<&str>) -> StoreResult<Vec<PercentileRange>> {
        let mut query = format!("SELECT {RANGE_COLUMNS} FROM athlete_benchmarks.percentile_ranges");
        if test_type.is_some() {
            query.push_str(" WHERE test_type = $1");
        }
        query.push_str(" ORDER BY test_type, metric_name");

        let mut rows = sqlx::query(&query);
        if let Some(value) = test_type {
            rows = rows.bind(value);
        }

        let records = rows.fetch_all(&self.pool).await.map_err(store_error)?;
        records.iter().map(range_from_row).collect()
    }
}

#[async_trait]
impl RangeStore for PgRangeStore {
    async fn get_range(
        &self,
        test_type: &str,
        metric_name: &str,
    ) -> StoreResult<Option<PercentileRange>> {
        let query = format!(
            "SELECT {RANGE_COLUMNS} FROM athlete_benchmarks.percentile_ranges \
             WHERE test_type = $1 AND metric_name = $2"
        );
        let row = sqlx::query(&query)
            .bind(test_type)
            .bind(metric_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.as_ref().map(range_from_row).transpose()
    }

    async fn get_ranges_for_test_type(
        &self,
        test_type: &str,
    ) -> StoreResult<HashMap<String, PercentileRange>> {
        let ranges = self.list_ranges(Some(test_type)).await?;
        Ok(ranges
            .into_iter()
            .map(|r| (r.metric_name.clone(), r))
            .collect())
    }

    async fn upsert_range(&self, range: &PercentileRange) -> StoreResult<()> {
        let sample_size = i64::try_from(range.sample_size)
            .map_err(|e| StoreError::Query(format!("sample size out of range: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO athlete_benchmarks.percentile_ranges
            (test_type, metric_name, p25, p50, p75, min_value, max_value, sample_size, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (test_type, metric_name) DO UPDATE
            SET p25 = EXCLUDED.p25,
                p50 = EXCLUDED.p50,
                p75 = EXCLUDED.p75,
                min_value = EXCLUDED.min_value,
                max_value = EXCLUDED.max_value,
                sample_size = EXCLUDED.sample_size,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(&range.test_type)
        .bind(&range.metric_name)
        .bind(range.p25)
        .bind(range.p50)
        .bind(range.p75)
        .bind(range.min)
        .bind(range.max)
        .bind(sample_size)
        .bind(range.last_updated)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}

fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
        other => StoreError::Query(other.to_string()),
    }
}

fn range_from_row(row: &PgRow) -> StoreResult<PercentileRange> {
    let decode = |e: sqlx::Error| StoreError::Query(e.to_string());

    let test_type: String = row.try_get("test_type").map_err(decode)?;
    let metric_name: String = row.try_get("metric_name").map_err(decode)?;
    let sample_size: i64 = row.try_get("sample_size").map_err(decode)?;
    let last_updated: DateTime<Utc> = row.try_get("last_updated").map_err(decode)?;

    let corrupt = |reason: String| StoreError::Corrupt {
        test_type: test_type.clone(),
        metric_name: metric_name.clone(),
        reason,
    };

    let sample_size = usize::try_from(sample_size)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| corrupt(format!("invalid sample size {sample_size}")))?;

    let range = PercentileRange {
        test_type: test_type.clone(),
        metric_name: metric_name.clone(),
        p25: row.try_get("p25").map_err(decode)?,
        p50: row.try_get("p50").map_err(decode)?,
        p75: row.try_get("p75").map_err(decode)?,
        min: row.try_get("min_value").map_err(decode)?,
        max: row.try_get("max_value").map_err(decode)?,
        sample_size,
        last_updated,
    };

    if !range.is_ordered() {
        return Err(corrupt("percentile points out of order".to_string()));
    }
    Ok(range)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let athletes = [
        "Marcus Hale",
        "Dion Carter",
        "Luca Ferreira",
        "Tomas Novak",
        "Andre Whitfield",
        "Kenji Sato",
    ];

    let metrics: [(&str, &str, [f64; 6]); 5] = [
        ("cmj", "jump_height_cm", [42.1, 45.8, 38.9, 50.2, 47.3, 40.6]),
        ("cmj", "peak_power_w_per_kg", [58.4, 62.1, 54.9, 66.7, 63.0, 56.2]),
        ("cmj", "rsi_modified", [0.52, 0.61, 0.47, 0.72, 0.66, 0.50]),
        ("imtp", "peak_force_n", [3120.0, 3410.0, 2890.0, 3720.0, 3550.0, 3010.0]),
        ("hj", "best_rsi", [2.1, 2.6, 1.9, 2.9, 2.4, 2.2]),
    ];

    let recorded_on = NaiveDate::from_ymd_opt(2026, 3, 2).context("invalid date")?;
    let mut inserted = 0usize;

    for (test_type, metric_name, values) in metrics {
        for (athlete, value) in athletes.iter().zip(values) {
            let source_key = format!(
                "seed-{test_type}-{metric_name}-{}",
                athlete.to_lowercase().replace(' ', "-")
            );
            let result = insert_sample(
                pool,
                &source_key,
                athlete,
                test_type,
                metric_name,
                value,
                recorded_on,
            )
            .await?;
            if result {
                inserted += 1;
            }
        }
    }

    Ok(inserted)
}

async fn insert_sample(
    pool: &PgPool,
    source_key: &str,
    athlete_name: &str,
    test_type: &str,
    metric_name: &str,
    value: f64,
    recorded_on: NaiveDate,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO athlete_benchmarks.pro_samples
        (id, source_key, athlete_name, test_type, metric_name, value, recorded_on)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(source_key)
    .bind(athlete_name)
    .bind(test_type)
    .bind(metric_name)
    .bind(value)
    .bind(recorded_on)
    .execute(pool)
    .await
    .with_context(|| format!("failed to insert sample {source_key}"))?;

    Ok(result.rows_affected() > 0)
}

pub async fn fetch_samples(
    pool: &PgPool,
    test_type: Option<&str>,
) -> anyhow::Result<Vec<MetricSample>> {
    let mut query = String::from(
        "SELECT test_type, metric_name, value FROM athlete_benchmarks.pro_samples",
    );
    if test_type.is_some() {
        query.push_str(" WHERE test_type = $1");
    }

    let mut rows = sqlx::query(&query);
    if let Some(value) = test_type {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut samples = Vec::with_capacity(records.len());

    for row in records {
        samples.push(MetricSample {
            test_type: row.get("test_type"),
            metric_name: row.get("metric_name"),
            value: row.get("value"),
        });
    }

    Ok(samples)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        athlete_name: String,
        test_type: String,
        metric_name: String,
        value: f64,
        recorded_on: NaiveDate,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut summary = ImportSummary::default();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {}", line + 1))?;

        if !row.value.is_finite() {
            warn!(
                row = line + 1,
                metric_name = %row.metric_name,
                "rejecting non-finite sample value"
            );
            summary.rejected += 1;
            continue;
        }

        let source_key = row
            .source_key
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let inserted = insert_sample(
            pool,
            &source_key,
            &row.athlete_name,
            &row.test_type,
            &row.metric_name,
            row.value,
            row.recorded_on,
        )
        .await?;

        if inserted {
            summary.inserted += 1;
        } else {
            summary.duplicates += 1;
        }
    }

    Ok(summary)
}
