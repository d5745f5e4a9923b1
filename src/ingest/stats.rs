//! Import statistics tracking.
//!
//! Workers add to the shared counters as each batch is flushed; the coordinator
//! reads them once every worker has been joined.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Success and failure counters shared by all insertion workers.
#[derive(Debug, Default)]
pub struct ImportCounters {
    inserted: AtomicU64,
    failed: AtomicU64,
}

impl ImportCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the outcome of one flushed batch.
    pub fn record(&self, inserted: u64, failed: u64) {
        self.inserted.fetch_add(inserted, Ordering::Relaxed);
        self.failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ImportTotals {
        ImportTotals {
            inserted: self.inserted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportTotals {
    pub inserted: u64,
    pub failed: u64,
}

impl ImportTotals {
    pub fn processed(&self) -> u64 {
        self.inserted + self.failed
    }
}

/// Final outcome of an import run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    /// Records emitted by the decoder.
    pub decoded: u64,
    pub inserted: u64,
    pub failed: u64,
    pub elapsed_seconds: f64,
}

impl ImportReport {
    pub fn new(decoded: u64, totals: ImportTotals, elapsed_seconds: f64) -> Self {
        Self {
            decoded,
            inserted: totals.inserted,
            failed: totals.failed,
            elapsed_seconds,
        }
    }

    pub fn processed(&self) -> u64 {
        self.inserted + self.failed
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Successfully inserted: {}", self.inserted)?;
        writeln!(f, "Failed inserts: {}", self.failed)?;
        write!(f, "Done in {:.2}s", self.elapsed_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_sum_across_threads() {
        let counters = Arc::new(ImportCounters::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.record(2, 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread finished");
        }

        let totals = counters.snapshot();
        assert_eq!(totals, ImportTotals { inserted: 16_000, failed: 8_000 });
        assert_eq!(totals.processed(), 24_000);
        assert_eq!(counters.snapshot(), totals);
    }

    #[test]
    fn report_display() {
        let report = ImportReport::new(3, ImportTotals { inserted: 2, failed: 1 }, 1.234);
        let display = format!("{}", report);
        assert!(display.contains("Successfully inserted: 2"));
        assert!(display.contains("Failed inserts: 1"));
        assert!(display.contains("Done in 1.23s"));
        assert_eq!(report.processed(), 3);
    }

    #[test]
    fn display_renders_one_line_per_total() {
        let report = ImportReport::new(10, ImportTotals { inserted: 7, failed: 3 }, 2.0);
        let rendered = report.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(
            lines,
            vec!["Successfully inserted: 7", "Failed inserts: 3", "Done in 2.00s"]
        );
    }

    #[test]
    fn report_serializes() {
        let report = ImportReport::new(1, ImportTotals { inserted: 1, failed: 0 }, 0.5);
        let value = serde_json::to_value(&report).expect("serializable");
        assert_eq!(value["inserted"], 1);
        assert_eq!(value["failed"], 0);
        assert_eq!(value["decoded"], 1);
    }
}
