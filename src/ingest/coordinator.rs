//! Import coordination.
//!
//! `import_features` wires the pipeline together:
//! 1. Open the input
//! 2. Allocate the bounded record channel and shared counters
//! 3. Spawn the insertion workers
//! 4. Run the decoder on a blocking thread
//! 5. Join every worker, then read the counters

use crate::config::PipelineOptions;
use crate::error::ImportError;
use crate::ingest::channel::record_channel;
use crate::ingest::decoder::{decode_features, open_input};
use crate::ingest::stats::{ImportCounters, ImportReport};
use crate::ingest::worker::{InsertionWorker, WorkerSummary};
use crate::store::FeatureStore;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Import every feature in the file at `input_path` into `store`.
pub async fn import_features<S: FeatureStore>(
    store: Arc<S>,
    input_path: &Path,
    options: &PipelineOptions,
) -> Result<ImportReport, ImportError> {
    let reader = open_input(input_path).map_err(|source| ImportError::Input {
        path: input_path.to_path_buf(),
        source,
    })?;
    log::info!("importing features from {}", input_path.display());

    import_from_reader(store, reader, options).await
}

/// Import every feature read from `reader` into `store`.
pub async fn import_from_reader<S, R>(
    store: Arc<S>,
    reader: R,
    options: &PipelineOptions,
) -> Result<ImportReport, ImportError>
where
    S: FeatureStore,
    R: Read + Send + 'static,
{
    options.validate()?;

    let (mut sender, receiver) = record_channel(options.channel_capacity);
    let counters = Arc::new(ImportCounters::new());
    let abort = CancellationToken::new();

    let workers: Vec<JoinHandle<WorkerSummary>> = (0..options.worker_count)
        .map(|worker_id| {
            let worker = InsertionWorker::new(
                worker_id,
                store.clone(),
                receiver.clone(),
                counters.clone(),
                options.batch_size,
                abort.clone(),
            );
            tokio::spawn(worker.run())
        })
        .collect();
    drop(receiver);

    let start = Instant::now();
    log::info!(
        "start importing with {} workers (batch size {}, channel capacity {})",
        options.worker_count,
        options.batch_size,
        options.channel_capacity
    );

    let array_field = options.array_field.clone();
    let decode_abort = abort.clone();
    let decoded = tokio::task::spawn_blocking(move || {
        let result = decode_features(reader, &array_field, &mut sender);
        if result.is_err() {
            // Workers must see the abort before they can observe the closed channel.
            decode_abort.cancel();
        }
        sender.close();
        result
    })
    .await;

    let decoded = match decoded {
        Ok(result) => result,
        Err(join_err) => {
            abort.cancel();
            join_workers(workers).await?;
            return Err(ImportError::Worker(join_err));
        }
    };

    if let Err(err) = &decoded {
        log::error!("decoding aborted: {}", err);
    }

    join_workers(workers).await?;
    let decoded = decoded?;

    let elapsed = start.elapsed().as_secs_f64();
    let report = ImportReport::new(decoded, counters.snapshot(), elapsed);

    for line in report.to_string().lines() {
        log::info!("{}", line);
    }

    Ok(report)
}

async fn join_workers(workers: Vec<JoinHandle<WorkerSummary>>) -> Result<(), ImportError> {
    let mut first_error = None;
    for handle in workers {
        match handle.await {
            Ok(summary) => log::debug!(
                "worker {} joined: {} batches, {} inserted, {} failed, {} discarded",
                summary.worker_id,
                summary.batches,
                summary.inserted,
                summary.failed,
                summary.discarded
            ),
            Err(err) => {
                log::error!("worker task failed: {}", err);
                first_error.get_or_insert(err);
            }
        }
    }

    match first_error {
        Some(err) => Err(ImportError::Worker(err)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryFeatureStore, feature_collection};

    fn options(workers: usize, batch_size: usize) -> PipelineOptions {
        PipelineOptions::default()
            .with_workers(workers)
            .with_batch_size(batch_size)
            .with_channel_capacity(16)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn imports_every_feature() {
        let store = Arc::new(MemoryFeatureStore::accept_all());
        let document = feature_collection(250).into_bytes();

        let report = import_from_reader(store.clone(), std::io::Cursor::new(document), &options(4, 20))
            .await
            .expect("import succeeds");

        assert_eq!(report.decoded, 250);
        assert_eq!(report.inserted, 250);
        assert_eq!(report.failed, 0);
        assert_eq!(store.stored().len(), 250);
    }

    #[tokio::test]
    async fn invalid_options_are_rejected_up_front() {
        let store = Arc::new(MemoryFeatureStore::accept_all());
        let document = feature_collection(1).into_bytes();

        let err = import_from_reader(store.clone(), std::io::Cursor::new(document), &options(0, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Config(_)), "{err:?}");
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn missing_input_file_is_reported() {
        let store = Arc::new(MemoryFeatureStore::accept_all());
        let err = import_features(store, Path::new("/nonexistent/features.geojson"), &options(1, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Input { .. }), "{err:?}");
    }
}
