//! Streaming feature import pipeline.
//!
//! A single decoder feeds many insertion workers through a bounded channel:
//!
//! 1. **Decoding** (`decoder`) - Walks the document token by token and emits one feature at a time
//! 2. **Channel** (`channel`) - Fixed-capacity queue; a full queue blocks the decoder
//! 3. **Workers** (`worker`) - Batch features and flush them with unordered bulk inserts
//! 4. **Statistics** (`stats`) - Atomic inserted/failed counters and the final report
//! 5. **Coordination** (`coordinator`) - Starts the workers, runs the decoder, joins everything
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use geojson_importer::config::PipelineOptions;
//! use geojson_importer::ingest::import_features;
//! use geojson_importer::store::PgFeatureStore;
//!
//! let store = Arc::new(PgFeatureStore::connect(&connection).await?);
//! let report = import_features(store, Path::new("tiles.geojson"), &PipelineOptions::default()).await?;
//!
//! println!("Imported {} features", report.inserted);
//! ```

pub mod channel;
pub mod coordinator;
pub mod decoder;
pub mod stats;
pub mod worker;

pub use coordinator::{import_features, import_from_reader};
pub use decoder::DecodeError;
pub use stats::{ImportCounters, ImportReport};
