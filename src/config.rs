use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_WORKER_COUNT: usize = 60;
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
pub const DEFAULT_ARRAY_FIELD: &str = "features";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_DATABASE: &str = "exam";
pub const DEFAULT_MIN_POOL_SIZE: u32 = 100;
pub const DEFAULT_MAX_POOL_SIZE: u32 = 200;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn lookup_parse<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("min pool size {min} exceeds max pool size {max}")]
    PoolBounds { min: u32, max: u32 },
    #[error("input file path is empty")]
    EmptyInputPath,
    #[error("array field name is empty")]
    EmptyArrayField,
}

/// Where the destination collection lives and how the pool is sized.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub min_pool_size: u32,
    pub max_pool_size: u32,
    /// Single deadline covering connect, ping and migrations.
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Read `GEO_IMPORT_HOST`, `GEO_IMPORT_PORT`, `GEO_IMPORT_DATABASE`,
    /// `GEO_IMPORT_MIN_POOL_SIZE`, `GEO_IMPORT_MAX_POOL_SIZE` and
    /// `GEO_IMPORT_CONNECT_TIMEOUT_MS`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ConnectionConfig::from_env`] over an arbitrary variable
    /// source. Unset or unparsable values take their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            host: lookup("GEO_IMPORT_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: lookup_parse(&lookup, "GEO_IMPORT_PORT", DEFAULT_PORT),
            database: lookup("GEO_IMPORT_DATABASE")
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            min_pool_size: lookup_parse(&lookup, "GEO_IMPORT_MIN_POOL_SIZE", DEFAULT_MIN_POOL_SIZE),
            max_pool_size: lookup_parse(&lookup, "GEO_IMPORT_MAX_POOL_SIZE", DEFAULT_MAX_POOL_SIZE),
            connect_timeout: Duration::from_millis(lookup_parse(
                &lookup,
                "GEO_IMPORT_CONNECT_TIMEOUT_MS",
                DEFAULT_CONNECT_TIMEOUT_MS,
            )),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Tuning for the decode/insert pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub worker_count: usize,
    pub batch_size: usize,
    pub channel_capacity: usize,
    /// Top-level key whose array elements are imported.
    pub array_field: String,
}

impl PipelineOptions {
    pub fn from_env() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            batch_size: env_usize("GEO_IMPORT_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            channel_capacity: env_usize("GEO_IMPORT_CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY),
            array_field: DEFAULT_ARRAY_FIELD.to_string(),
        }
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Zero("worker count"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch size"));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Zero("channel capacity"));
        }
        if self.array_field.is_empty() {
            return Err(ConfigError::EmptyArrayField);
        }
        Ok(())
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Everything one import run needs, assembled by the CLI.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub connection: ConnectionConfig,
    pub input_path: PathBuf,
    pub pipeline: PipelineOptions,
}

impl ImportConfig {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            connection: ConnectionConfig::default(),
            input_path: input_path.into(),
            pipeline: PipelineOptions::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let connection = &self.connection;
        if connection.port == 0 {
            return Err(ConfigError::Zero("port"));
        }
        if connection.min_pool_size == 0 {
            return Err(ConfigError::Zero("min pool size"));
        }
        if connection.max_pool_size == 0 {
            return Err(ConfigError::Zero("max pool size"));
        }
        if connection.min_pool_size > connection.max_pool_size {
            return Err(ConfigError::PoolBounds {
                min: connection.min_pool_size,
                max: connection.max_pool_size,
            });
        }
        if self.input_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyInputPath);
        }
        self.pipeline.validate()
    }
}
