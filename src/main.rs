use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use geojson_importer::config::{ConnectionConfig, ImportConfig, PipelineOptions};

#[derive(Parser, Debug)]
#[command(
    name = "geojson-importer",
    about = "Stream a GeoJSON FeatureCollection into PostgreSQL"
)]
struct Args {
    /// Database port (defaults to GEO_IMPORT_PORT or 5432).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Database host (defaults to GEO_IMPORT_HOST or localhost).
    #[arg(long)]
    host: Option<String>,

    /// Database name (defaults to GEO_IMPORT_DATABASE or exam).
    #[arg(long)]
    database: Option<String>,

    /// Maximum connection pool size (defaults to GEO_IMPORT_MAX_POOL_SIZE or 200).
    #[arg(long = "max")]
    max_pool_size: Option<u32>,

    /// Minimum connection pool size (defaults to GEO_IMPORT_MIN_POOL_SIZE or 100).
    #[arg(long = "min")]
    min_pool_size: Option<u32>,

    /// Path of the input GeoJSON file (`.gz` is decompressed).
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Number of insertion workers.
    #[arg(short = 'w', long = "workers", default_value_t = 60)]
    workers: usize,

    /// Features per bulk insert (defaults to GEO_IMPORT_BATCH_SIZE or 500).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Pending features held between decoder and workers
    /// (defaults to GEO_IMPORT_CHANNEL_CAPACITY or 1000).
    #[arg(long)]
    channel_capacity: Option<usize>,

    /// Top-level key holding the feature array.
    #[arg(long, default_value = "features")]
    field: String,

    /// Print the final report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn into_config(self) -> ImportConfig {
        let defaults = PipelineOptions::default();
        let connection = ConnectionConfig::default();
        ImportConfig {
            connection: ConnectionConfig {
                host: self.host.unwrap_or(connection.host),
                port: self.port.unwrap_or(connection.port),
                database: self.database.unwrap_or(connection.database),
                min_pool_size: self.min_pool_size.unwrap_or(connection.min_pool_size),
                max_pool_size: self.max_pool_size.unwrap_or(connection.max_pool_size),
                connect_timeout: connection.connect_timeout,
            },
            input_path: self.file,
            pipeline: PipelineOptions {
                worker_count: self.workers,
                batch_size: self.batch_size.unwrap_or(defaults.batch_size),
                channel_capacity: self.channel_capacity.unwrap_or(defaults.channel_capacity),
                array_field: self.field,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    geojson_importer::init_logger();

    let args = Args::parse();
    let json = args.json;
    let config = args.into_config();

    log::info!(
        "Port: {}, maxPoolSize: {}, minPoolSize: {}, filePath: {}",
        config.connection.port,
        config.connection.max_pool_size,
        config.connection.min_pool_size,
        config.input_path.display()
    );

    match geojson_importer::run(&config).await {
        Ok(report) => {
            if json {
                match serde_json::to_string(&report) {
                    Ok(encoded) => println!("{encoded}"),
                    Err(err) => log::warn!("failed to encode report: {}", err),
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_flags() {
        let args = Args::parse_from([
            "geojson-importer",
            "-p",
            "5433",
            "--max",
            "20",
            "--min",
            "10",
            "-f",
            "tiles.geojson",
            "-w",
            "8",
        ]);
        let config = args.into_config();

        assert_eq!(config.connection.port, 5433);
        assert_eq!(config.connection.max_pool_size, 20);
        assert_eq!(config.connection.min_pool_size, 10);
        assert_eq!(config.input_path, PathBuf::from("tiles.geojson"));
        assert_eq!(config.pipeline.worker_count, 8);
        assert_eq!(config.pipeline.array_field, "features");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tuning_flags_override_defaults() {
        let args = Args::parse_from([
            "geojson-importer",
            "-f",
            "tiles.geojson",
            "--batch-size",
            "50",
            "--channel-capacity",
            "10",
            "--field",
            "items",
        ]);
        let config = args.into_config();

        assert_eq!(config.pipeline.batch_size, 50);
        assert_eq!(config.pipeline.channel_capacity, 10);
        assert_eq!(config.pipeline.array_field, "items");
    }

    #[test]
    fn file_is_required() {
        assert!(Args::try_parse_from(["geojson-importer"]).is_err());
    }
}
