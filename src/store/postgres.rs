//! PostgreSQL-backed document collection.
//!
//! Each feature is stored as a JSONB document under a freshly generated UUID,
//! so identical features in the input are stored as separate documents. A
//! batch goes out as a single UNNEST insert and `rows_affected` is the
//! persisted count.

use crate::config::ConnectionConfig;
use crate::models::GeoFeature;
use crate::store::{FeatureStore, WriteError};
use log::LevelFilter;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPoolOptions};
use sqlx::{ConnectOptions, Connection, PgPool};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Workers wait for a free pooled connection; only startup has a deadline.
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("timed out after {timeout:?} connecting to {target}")]
    Timeout { target: String, timeout: Duration },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Column-oriented batch, one vector per UNNEST parameter.
#[derive(Default)]
struct FeatureRows {
    ids: Vec<Uuid>,
    geometry_types: Vec<String>,
    releases: Vec<i64>,
    capture_dates_ranges: Vec<String>,
    documents: Vec<serde_json::Value>,
}

impl FeatureRows {
    fn from_batch(batch: &[GeoFeature]) -> Result<Self, serde_json::Error> {
        let mut rows = FeatureRows {
            ids: Vec::with_capacity(batch.len()),
            geometry_types: Vec::with_capacity(batch.len()),
            releases: Vec::with_capacity(batch.len()),
            capture_dates_ranges: Vec::with_capacity(batch.len()),
            documents: Vec::with_capacity(batch.len()),
        };

        for feature in batch {
            rows.ids.push(Uuid::new_v4());
            rows.geometry_types.push(feature.geometry.geometry_type.clone());
            rows.releases.push(feature.properties.release);
            rows.capture_dates_ranges
                .push(feature.properties.capture_dates_range.clone());
            rows.documents.push(serde_json::to_value(feature)?);
        }

        Ok(rows)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

fn pool_options(config: &ConnectionConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(config.min_pool_size)
        .max_connections(config.max_pool_size)
        .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
}

pub struct PgFeatureStore {
    pool: PgPool,
}

impl PgFeatureStore {
    /// Connect, ping and migrate under a single deadline.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        let target = format!("{}:{}/{}", config.host, config.port, config.database);
        log::info!(
            "connecting to postgres at {} (pool {}..{})",
            target,
            config.min_pool_size,
            config.max_pool_size
        );

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .log_statements(LevelFilter::Trace);

        let setup = async {
            // A direct connection surfaces refusals and auth failures as-is
            // instead of letting the pool retry them until the deadline.
            let mut connection = PgConnection::connect_with(&options).await?;
            connection.ping().await?;
            connection.close().await?;

            let pool = pool_options(config).connect_with(options).await?;
            run_migrations(&pool).await?;
            Ok::<_, ConnectionError>(pool)
        };

        let pool = tokio::time::timeout(config.connect_timeout, setup)
            .await
            .map_err(|_| ConnectionError::Timeout {
                target: target.clone(),
                timeout: config.connect_timeout,
            })??;

        log::info!("connected to postgres at {} with connection pool", target);
        Ok(Self { pool })
    }

    /// Wrap an existing pool, applying migrations first.
    pub async fn from_pool(pool: PgPool) -> Result<Self, ConnectionError> {
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn count_features(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM geo_features")
            .fetch_one(&self.pool)
            .await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn insert_batch(&self, batch: &[GeoFeature]) -> Result<u64, WriteError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let rows = FeatureRows::from_batch(batch)?;
        let count = rows.len() as u64;

        let result = sqlx::query(
            r#"INSERT INTO geo_features (
                id, geometry_type, release, capture_dates_range, document
               )
               SELECT * FROM UNNEST(
                   $1::uuid[], $2::text[], $3::bigint[], $4::text[], $5::jsonb[]
               )"#,
        )
        .bind(&rows.ids)
        .bind(&rows.geometry_types)
        .bind(&rows.releases)
        .bind(&rows.capture_dates_ranges)
        .bind(&rows.documents)
        .execute(&self.pool)
        .await?;

        let rows_affected = result.rows_affected();
        if rows_affected < count {
            log::debug!(
                "insert_batch: tried to insert {} features, but only {} were inserted",
                count,
                rows_affected
            );
        }

        log::trace!("bulk inserted {} features", rows_affected);
        Ok(rows_affected)
    }
}

impl FeatureStore for PgFeatureStore {
    fn insert_unordered(
        &self,
        batch: &[GeoFeature],
    ) -> impl Future<Output = Result<u64, WriteError>> + Send {
        self.insert_batch(batch)
    }
}
