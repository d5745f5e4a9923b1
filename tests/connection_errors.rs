use geojson_importer::config::{ConnectionConfig, ImportConfig};
use geojson_importer::error::ImportError;
use geojson_importer::store::{ConnectionError, PgFeatureStore};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

fn local_config(port: u16, connect_timeout: Duration) -> ConnectionConfig {
    ConnectionConfig {
        host: "127.0.0.1".to_string(),
        port,
        database: "exam".to_string(),
        min_pool_size: 1,
        max_pool_size: 2,
        connect_timeout,
    }
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

#[tokio::test]
async fn refused_connection_reports_database_error() {
    let config = local_config(closed_port().await, Duration::from_secs(5));

    let started = Instant::now();
    let err = PgFeatureStore::connect(&config)
        .await
        .err()
        .expect("nothing listens on the port");

    assert!(matches!(err, ConnectionError::Database(_)), "{err:?}");
    assert!(started.elapsed() < config.connect_timeout);
}

#[tokio::test]
async fn silent_server_hits_startup_deadline() {
    // Accepts TCP connections through the backlog but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let config = local_config(port, Duration::from_millis(300));

    let err = PgFeatureStore::connect(&config)
        .await
        .err()
        .expect("server never completes the handshake");

    match err {
        ConnectionError::Timeout { target, timeout } => {
            assert_eq!(target, format!("127.0.0.1:{port}/exam"));
            assert_eq!(timeout, Duration::from_millis(300));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    drop(listener);
}

#[tokio::test]
async fn run_fails_on_connection_before_reading_input() {
    let mut config = ImportConfig::new("/nonexistent/tiles.geojson");
    config.connection = local_config(closed_port().await, Duration::from_secs(5));

    let err = geojson_importer::run(&config)
        .await
        .expect_err("destination is unreachable");

    assert!(matches!(err, ImportError::Connection(_)), "{err:?}");
    assert!(!err.is_structural());
}
