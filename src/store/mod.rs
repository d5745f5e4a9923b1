//! Destination collection for imported features.
//!
//! [`FeatureStore`] is the only thing the insertion workers know about the
//! database. Implementations must be safe to share between workers and must
//! give unordered bulk-insert semantics: a record that cannot be stored does
//! not prevent the rest of its batch from being stored.

pub mod postgres;

pub use postgres::{ConnectionError, PgFeatureStore};

use crate::models::GeoFeature;
use std::future::Future;
use thiserror::Error;

pub trait FeatureStore: Send + Sync + 'static {
    /// Insert `batch` in one call and return how many records were persisted.
    ///
    /// Records the store skipped without erroring simply reduce the returned
    /// count. An `Err` still carries whatever was persisted before the call
    /// failed, see [`WriteError::persisted`].
    fn insert_unordered(
        &self,
        batch: &[GeoFeature],
    ) -> impl Future<Output = Result<u64, WriteError>> + Send;
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode feature: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store rejected {rejected} of {attempted} features: {reason}", rejected = .attempted - .inserted)]
    Rejected {
        inserted: u64,
        attempted: u64,
        reason: String,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl WriteError {
    /// Records the store reports as persisted despite the error.
    pub fn persisted(&self) -> u64 {
        match self {
            WriteError::Rejected { inserted, .. } => *inserted,
            _ => 0,
        }
    }
}
