//! Bounded single-producer, multi-consumer queue between the decoder and the
//! insertion workers.
//!
//! The producer side lives on a blocking thread and parks while the queue is
//! full, which is the only backpressure in the pipeline. Consumers share one
//! receiver; `next()` yields `None` once the producer has closed the channel
//! and every queued record has been handed out.

use crate::models::GeoFeature;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("record channel closed: no consumers left")]
pub struct ChannelClosed;

/// Destination for decoded records.
pub trait RecordSink {
    fn push(&mut self, feature: GeoFeature) -> Result<(), ChannelClosed>;
}

impl RecordSink for Vec<GeoFeature> {
    fn push(&mut self, feature: GeoFeature) -> Result<(), ChannelClosed> {
        Vec::push(self, feature);
        Ok(())
    }
}

/// Create a channel holding at most `capacity` pending records.
pub fn record_channel(capacity: usize) -> (FeatureSender, FeatureReceiver) {
    let (sender, receiver) = mpsc::channel(capacity);
    (
        FeatureSender { sender },
        FeatureReceiver {
            receiver: Arc::new(Mutex::new(receiver)),
        },
    )
}

/// Producer half. Not cloneable: exactly one decoder feeds a channel.
#[derive(Debug)]
pub struct FeatureSender {
    sender: mpsc::Sender<GeoFeature>,
}

impl FeatureSender {
    /// Free slots right now.
    pub fn capacity(&self) -> usize {
        self.sender.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Mark the end of the stream. Consumes the sender so it cannot happen twice.
    pub fn close(self) {
        drop(self);
    }
}

impl RecordSink for FeatureSender {
    /// Blocks the calling thread while the channel is full. Must not be called
    /// from inside an async task.
    fn push(&mut self, feature: GeoFeature) -> Result<(), ChannelClosed> {
        self.sender.blocking_send(feature).map_err(|_| ChannelClosed)
    }
}

/// Consumer half, shared by all workers.
#[derive(Debug, Clone)]
pub struct FeatureReceiver {
    receiver: Arc<Mutex<mpsc::Receiver<GeoFeature>>>,
}

impl FeatureReceiver {
    /// Next record, or `None` when the channel is closed and drained.
    pub async fn next(&self) -> Option<GeoFeature> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(release: i64) -> GeoFeature {
        let mut feature = GeoFeature::default();
        feature.properties.release = release;
        feature
    }

    #[tokio::test]
    async fn delivers_then_signals_end_of_stream() {
        let (mut sender, receiver) = record_channel(4);

        let producer = tokio::task::spawn_blocking(move || {
            for release in 0..3 {
                sender.push(feature(release)).expect("receiver alive");
            }
            sender.close();
        });
        producer.await.expect("producer finished");

        let mut seen = Vec::new();
        while let Some(feature) = receiver.next().await {
            seen.push(feature.properties.release);
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(receiver.next().await.is_none());
    }

    #[tokio::test]
    async fn occupancy_never_exceeds_capacity() {
        let (mut sender, receiver) = record_channel(2);
        assert_eq!(sender.max_capacity(), 2);

        let producer = tokio::task::spawn_blocking(move || {
            let mut min_free = usize::MAX;
            for release in 0..20 {
                sender.push(feature(release)).expect("receiver alive");
                min_free = min_free.min(sender.capacity());
                assert!(sender.max_capacity() - sender.capacity() <= 2);
            }
            min_free
        });

        let mut count = 0;
        while count < 20 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            if receiver.next().await.is_some() {
                count += 1;
            }
        }

        let min_free = producer.await.expect("producer finished");
        assert!(min_free <= 2);
        assert!(receiver.next().await.is_none());
    }

    #[tokio::test]
    async fn push_fails_once_consumers_are_gone() {
        let (mut sender, receiver) = record_channel(1);
        drop(receiver);

        let result = tokio::task::spawn_blocking(move || sender.push(feature(1)))
            .await
            .expect("producer finished");
        assert_eq!(result, Err(ChannelClosed));
    }

    #[test]
    fn vec_sink_collects() {
        let mut sink: Vec<GeoFeature> = Vec::new();
        RecordSink::push(&mut sink, feature(5)).expect("vec sink never closes");
        assert_eq!(sink.len(), 1);
    }
}
