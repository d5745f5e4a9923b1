use crate::ingest::channel::FeatureReceiver;
use crate::ingest::stats::ImportCounters;
use crate::models::GeoFeature;
use crate::store::FeatureStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What one worker did over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker_id: usize,
    pub batches: u64,
    pub inserted: u64,
    pub failed: u64,
    /// Records dropped from the pending batch after an abort.
    pub discarded: u64,
}

/// Pulls records off the shared channel and writes them in batches.
///
/// The batch is private to the worker and at most one flush is in flight per
/// worker. Write failures are counted, logged and otherwise ignored; an abort
/// stops the loop and discards the pending batch without writing it.
pub struct InsertionWorker<S> {
    id: usize,
    store: Arc<S>,
    receiver: FeatureReceiver,
    counters: Arc<ImportCounters>,
    batch_size: usize,
    abort: CancellationToken,
}

impl<S: FeatureStore> InsertionWorker<S> {
    pub fn new(
        id: usize,
        store: Arc<S>,
        receiver: FeatureReceiver,
        counters: Arc<ImportCounters>,
        batch_size: usize,
        abort: CancellationToken,
    ) -> Self {
        Self {
            id,
            store,
            receiver,
            counters,
            batch_size: batch_size.max(1),
            abort,
        }
    }

    pub async fn run(self) -> WorkerSummary {
        let mut summary = WorkerSummary {
            worker_id: self.id,
            ..WorkerSummary::default()
        };
        let mut batch: Vec<GeoFeature> = Vec::with_capacity(self.batch_size);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.abort.cancelled() => break,
                next = self.receiver.next() => next,
            };

            match next {
                Some(feature) => {
                    batch.push(feature);
                    if batch.len() >= self.batch_size {
                        self.flush(&mut batch, &mut summary).await;
                    }
                }
                None => break,
            }
        }

        if self.abort.is_cancelled() {
            summary.discarded = batch.len() as u64;
            if !batch.is_empty() {
                log::debug!(
                    "worker {}: import aborted, discarding {} pending features",
                    self.id,
                    batch.len()
                );
            }
        } else if !batch.is_empty() {
            self.flush(&mut batch, &mut summary).await;
        }

        log::debug!(
            "worker {}: finished after {} batches ({} inserted, {} failed)",
            self.id,
            summary.batches,
            summary.inserted,
            summary.failed
        );
        summary
    }

    async fn flush(&self, batch: &mut Vec<GeoFeature>, summary: &mut WorkerSummary) {
        let attempted = batch.len() as u64;

        let inserted = match self.store.insert_unordered(batch).await {
            Ok(inserted) => inserted,
            Err(err) => {
                log::warn!("worker {}: batch insert error: {}", self.id, err);
                err.persisted()
            }
        }
        .min(attempted);
        let failed = attempted - inserted;

        self.counters.record(inserted, failed);
        summary.batches += 1;
        summary.inserted += inserted;
        summary.failed += failed;

        batch.clear();
    }
}
