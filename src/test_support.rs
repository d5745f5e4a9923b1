//! Helpers shared by unit and integration tests.

use crate::models::GeoFeature;
use crate::store::{FeatureStore, WriteError};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

pub use database::{TestDatabase, TestDatabaseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WritePolicy {
    AcceptAll,
    RejectAll,
    /// Every n-th record (counted across calls) is rejected.
    RejectEvery(u64),
    Fail,
}

/// In-memory [`FeatureStore`] with scriptable failures and call tracking.
pub struct MemoryFeatureStore {
    policy: WritePolicy,
    latency: Option<Duration>,
    stored: Mutex<Vec<GeoFeature>>,
    batch_sizes: Mutex<Vec<usize>>,
    seen: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryFeatureStore {
    fn with_policy(policy: WritePolicy) -> Self {
        Self {
            policy,
            latency: None,
            stored: Mutex::new(Vec::new()),
            batch_sizes: Mutex::new(Vec::new()),
            seen: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn accept_all() -> Self {
        Self::with_policy(WritePolicy::AcceptAll)
    }

    /// Every call reports zero persisted records.
    pub fn reject_all() -> Self {
        Self::with_policy(WritePolicy::RejectAll)
    }

    pub fn reject_every(n: u64) -> Self {
        Self::with_policy(WritePolicy::RejectEvery(n.max(1)))
    }

    /// Every call errors before anything is written.
    pub fn failing() -> Self {
        Self::with_policy(WritePolicy::Fail)
    }

    /// Delay each call, simulating a slow destination.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn stored(&self) -> Vec<GeoFeature> {
        self.stored.lock().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.batch_sizes.lock().len()
    }

    /// Highest number of concurrent `insert_unordered` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn insert(&self, batch: &[GeoFeature]) -> Result<u64, WriteError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.batch_sizes.lock().push(batch.len());
        let result = self.apply(batch);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn apply(&self, batch: &[GeoFeature]) -> Result<u64, WriteError> {
        let attempted = batch.len() as u64;
        match self.policy {
            WritePolicy::AcceptAll => {
                self.seen.fetch_add(attempted, Ordering::SeqCst);
                self.stored.lock().extend_from_slice(batch);
                Ok(attempted)
            }
            WritePolicy::RejectAll => {
                self.seen.fetch_add(attempted, Ordering::SeqCst);
                Err(WriteError::Rejected {
                    inserted: 0,
                    attempted,
                    reason: "destination rejects all writes".into(),
                })
            }
            WritePolicy::RejectEvery(n) => {
                let first = self.seen.fetch_add(attempted, Ordering::SeqCst);
                let mut stored = self.stored.lock();
                let mut inserted = 0;
                for (offset, feature) in batch.iter().enumerate() {
                    if (first + offset as u64 + 1) % n != 0 {
                        stored.push(feature.clone());
                        inserted += 1;
                    }
                }
                if inserted == attempted {
                    Ok(inserted)
                } else {
                    Err(WriteError::Rejected {
                        inserted,
                        attempted,
                        reason: format!("every {n}th record rejected"),
                    })
                }
            }
            WritePolicy::Fail => Err(WriteError::Unavailable("simulated outage".into())),
        }
    }
}

impl FeatureStore for MemoryFeatureStore {
    fn insert_unordered(
        &self,
        batch: &[GeoFeature],
    ) -> impl Future<Output = Result<u64, WriteError>> + Send {
        self.insert(batch)
    }
}

/// Build a feature collection document with `count` polygon features.
pub fn feature_collection(count: usize) -> String {
    let features: Vec<String> = (0..count)
        .map(|index| {
            format!(
                r#"{{"type":"Feature","geometry":{{"type":"Polygon","coordinates":[[[{index},0],[{index},1],[1,1],[{index},0]]]}},"properties":{{"release":{index},"capture_dates_range":"2020-2021"}}}}"#
            )
        })
        .collect();
    format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    )
}

pub mod database {
    use crate::store::postgres::run_migrations;
    use log::LevelFilter;
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
    use sqlx::{ConnectOptions, PgPool};
    use testcontainers_modules::postgres::Postgres;
    use testcontainers_modules::testcontainers::{
        ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
    };
    use thiserror::Error;
    use tokio::runtime::Handle;
    use uuid::Uuid;

    #[derive(Debug, Error)]
    pub enum TestDatabaseError {
        #[error("TEST_DATABASE_URL not set")]
        MissingUrl,
        #[error("database error: {0}")]
        Sqlx(#[from] sqlx::Error),
        #[error("migration error: {0}")]
        Migration(#[from] sqlx::migrate::MigrateError),
        #[error("container error: {0}")]
        Container(#[from] TestcontainersError),
    }

    /// Ephemeral database for integration tests.
    ///
    /// Uses the server in `TEST_DATABASE_URL` when set, otherwise starts a
    /// PostgreSQL container if `TEST_USE_CONTAINERS=1`.
    pub struct TestDatabase {
        pool: Option<PgPool>,
        admin_options: PgConnectOptions,
        database_name: String,
        container: Option<ContainerAsync<Postgres>>,
    }

    impl TestDatabase {
        pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
            if let Ok(url) = std::env::var("TEST_DATABASE_URL") {
                let options: PgConnectOptions = url.parse()?;
                return Self::provision(options, None).await;
            }

            let use_containers = std::env::var("TEST_USE_CONTAINERS")
                .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false);
            if use_containers {
                return Self::new().await;
            }

            Err(TestDatabaseError::MissingUrl)
        }

        /// Provision a fresh database inside a disposable Postgres container.
        pub async fn new() -> Result<Self, TestDatabaseError> {
            let container = Postgres::default().start().await?;

            let host = container.get_host().await?.to_string();
            let port = container.get_host_port_ipv4(5432).await?;
            let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);
            let options: PgConnectOptions = admin_url.parse()?;

            Self::provision(options, Some(container)).await
        }

        async fn provision(
            base_options: PgConnectOptions,
            container: Option<ContainerAsync<Postgres>>,
        ) -> Result<Self, TestDatabaseError> {
            let base_options = base_options.log_statements(LevelFilter::Off);
            let admin_options = base_options.clone().database("postgres");

            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options.clone())
                .await?;

            let database_name = format!("geo_import_test_{}", Uuid::new_v4().simple());
            let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", database_name);
            sqlx::query(&create_sql).execute(&admin_pool).await?;
            admin_pool.close().await;

            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect_with(base_options.database(&database_name))
                .await?;

            run_migrations(&pool).await?;

            Ok(Self {
                pool: Some(pool),
                admin_options,
                database_name,
                container,
            })
        }

        pub fn pool(&self) -> &PgPool {
            self.pool.as_ref().expect("test database pool is available")
        }

        pub fn pool_clone(&self) -> PgPool {
            self.pool().clone()
        }

        /// Close pool connections and drop the ephemeral database.
        pub async fn close(mut self) -> Result<(), TestDatabaseError> {
            if let Some(pool) = self.pool.take() {
                pool.close().await;
            }

            drop_database(self.admin_options.clone(), &self.database_name).await?;

            if let Some(container) = self.container.take() {
                drop(container);
            }

            Ok(())
        }
    }

    async fn drop_database(
        admin_options: PgConnectOptions,
        database_name: &str,
    ) -> Result<(), sqlx::Error> {
        let admin_pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(admin_options)
            .await?;

        let drop_sql = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", database_name);
        sqlx::query(&drop_sql).execute(&admin_pool).await?;
        admin_pool.close().await;
        Ok(())
    }

    impl Drop for TestDatabase {
        fn drop(&mut self) {
            if let Some(pool) = self.pool.take() {
                let admin_options = self.admin_options.clone();
                let database_name = self.database_name.clone();
                if let Ok(handle) = Handle::try_current() {
                    handle.spawn(async move {
                        pool.close().await;
                        let _ = drop_database(admin_options, &database_name).await;
                    });
                }
            }

            if let Some(container) = self.container.take() {
                drop(container);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reject_every_counts_across_calls() {
        let store = MemoryFeatureStore::reject_every(3);
        let batch = vec![GeoFeature::default(); 2];

        assert_eq!(store.insert_unordered(&batch).await.expect("no rejection"), 2);
        let err = store.insert_unordered(&batch).await.unwrap_err();
        assert_eq!(err.persisted(), 1);
        assert_eq!(store.stored().len(), 3);
        assert_eq!(store.calls(), 2);
    }

    #[test]
    fn generated_collection_is_well_formed() {
        let document = feature_collection(3);
        let value: serde_json::Value = serde_json::from_str(&document).expect("valid JSON");
        assert_eq!(value["features"].as_array().map(Vec::len), Some(3));
    }
}
