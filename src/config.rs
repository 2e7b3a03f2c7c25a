use anyhow::Context;
use clap::Args;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Args, Debug, Clone)]
pub struct DbConfig {
    /// Postgres connection string for the benchmark warehouse
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    /// Maximum pooled connections
    #[arg(long, env = "BENCHMARK_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    pub max_connections: u32,
}

impl DbConfig {
    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        let database_url = self
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set to reach the benchmark warehouse")?;

        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        db: DbConfig,
    }

    #[test]
    fn flags_override_defaults() {
        let parsed = Harness::parse_from([
            "harness",
            "--database-url",
            "postgres://localhost/benchmarks",
            "--max-connections",
            "2",
        ]);
        assert_eq!(
            parsed.db.database_url.as_deref(),
            Some("postgres://localhost/benchmarks")
        );
        assert_eq!(parsed.db.max_connections, 2);
    }

    #[tokio::test]
    async fn connect_requires_a_url() {
        let config = DbConfig {
            database_url: None,
            max_connections: 1,
        };
        let err = config.connect().await.unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
