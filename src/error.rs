use crate::config::ConfigError;
use crate::ingest::decoder::DecodeError;
use crate::store::ConnectionError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors. Any of these ends the run with a non-zero exit status;
/// write errors never get this far, they only show up in the failure count.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot connect to destination: {0}")]
    Connection(#[from] ConnectionError),
    #[error("failed to open input {}: {source}", .path.display())]
    Input { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl ImportError {
    /// True for malformed input, as opposed to environment problems.
    pub fn is_structural(&self) -> bool {
        matches!(self, ImportError::Decode(DecodeError::Structural { .. }))
    }
}
