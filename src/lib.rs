pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod store;
pub mod test_support;

pub use config::{ConnectionConfig, ImportConfig, PipelineOptions};
pub use error::ImportError;
pub use ingest::{ImportReport, import_features, import_from_reader};
pub use models::GeoFeature;
pub use store::{FeatureStore, PgFeatureStore, WriteError};

use env_logger::Env;
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info,sqlx=warn")).init();
    });
}

/// Connect to the destination, import the configured file and close the pool.
pub async fn run(config: &ImportConfig) -> Result<ImportReport, ImportError> {
    config.validate()?;

    let store = Arc::new(PgFeatureStore::connect(&config.connection).await?);
    let result = import_features(store.clone(), &config.input_path, &config.pipeline).await;
    store.close().await;

    result
}
