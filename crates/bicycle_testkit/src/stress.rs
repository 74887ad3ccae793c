//! Stress runners for concurrent puts and queries.
//!
//! Writers commit fixed-size batches of fresh example records while readers
//! scan. Every batch is atomic, so a reader must always see a multiple of
//! the batch size; anything else is counted as an anomaly.

use crate::fixtures::{example_record, EXAMPLE};
use bicycle_core::{CoreError, Engine, IndexQuery};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Reads that observed a partially applied batch.
    pub anomalies: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, anomalies: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            anomalies,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Anomalies: {}", self.anomalies);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Batches committed by each writer.
    pub batches: usize,
    /// Records per batch.
    pub batch_size: usize,
    /// Writer threads.
    pub writers: usize,
    /// Reader threads.
    pub readers: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            batches: 200,
            batch_size: 4,
            writers: 2,
            readers: 4,
        }
    }
}

#[derive(Default)]
struct Counters {
    successful: AtomicUsize,
    failed: AtomicUsize,
    anomalies: AtomicUsize,
}

impl Counters {
    fn record<T, E>(&self, result: &Result<T, E>) {
        let counter = if result.is_ok() {
            &self.successful
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Runs writers and readers against an engine that has the example model
/// registered and no example records yet.
pub fn stress_put_and_query(engine: Arc<Engine>, config: &StressConfig) -> StressTestResult {
    let counters = Arc::new(Counters::default());
    let writing = Arc::new(AtomicBool::new(true));
    let start = Instant::now();

    let writers: Vec<_> = (0..config.writers)
        .map(|w| {
            let engine = Arc::clone(&engine);
            let counters = Arc::clone(&counters);
            let config = config.clone();
            thread::spawn(move || {
                for b in 0..config.batches {
                    let first = (w * config.batches + b) * config.batch_size;
                    let records = (first..first + config.batch_size)
                        .map(|id| example_record(id as i64, &format!("user{id}@x.com")))
                        .collect();
                    counters.record(&engine.batch_put(EXAMPLE, records));
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..config.readers)
        .map(|r| {
            let engine = Arc::clone(&engine);
            let counters = Arc::clone(&counters);
            let writing = Arc::clone(&writing);
            let batch_size = config.batch_size;
            thread::spawn(move || {
                let mut probe = r;
                loop {
                    let done = !writing.load(Ordering::Acquire);
                    let scan = engine.get_by_index(EXAMPLE, &IndexQuery::new());
                    if let Ok(records) = &scan {
                        if records.len() % batch_size != 0 {
                            counters.anomalies.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    counters.record(&scan);

                    let email = format!("user{probe}@x.com");
                    let point = engine.get_by_index(EXAMPLE, &IndexQuery::new().eq("email", email));
                    if let Ok(found) = &point {
                        if found.len() > 1 {
                            counters.anomalies.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    counters.record(&point);
                    probe += batch_size;

                    if done {
                        break;
                    }
                }
            })
        })
        .collect();

    for handle in writers {
        handle.join().expect("writer panicked");
    }
    writing.store(false, Ordering::Release);
    for handle in readers {
        handle.join().expect("reader panicked");
    }

    StressTestResult::new(
        counters.successful.load(Ordering::Relaxed),
        counters.failed.load(Ordering::Relaxed),
        counters.anomalies.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Races `threads` puts of distinct ids that all carry the same unique
/// email. Exactly one may commit; every other put must fail with a unique
/// violation, and any other outcome counts as an anomaly.
pub fn stress_unique_contention(engine: &Engine, threads: usize, email: &str) -> StressTestResult {
    let barrier = Barrier::new(threads);
    let start = Instant::now();

    let outcomes: Vec<Result<(), CoreError>> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|id| {
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    engine.put(EXAMPLE, example_record(id as i64, email))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("writer panicked"))
            .collect()
    });

    let successful = outcomes.iter().filter(|r| r.is_ok()).count();
    let failed = outcomes.len() - successful;
    let mut anomalies = outcomes
        .iter()
        .filter(|r| matches!(r, Err(e) if !e.is_unique_violation()))
        .count();
    if successful != 1 {
        anomalies += 1;
    }
    StressTestResult::new(successful, failed, anomalies, start.elapsed())
}

/// Commits `operations` single puts that overwrite a small id range, so
/// index entries are replaced rather than added.
pub fn stress_overwrites(engine: &Engine, operations: usize, distinct: usize) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..operations {
        let id = (i % distinct.max(1)) as i64;
        let record = example_record(id, &format!("gen{i}@x.com"));
        match engine.put(EXAMPLE, record) {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, 0, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestEngine;

    #[test]
    fn concurrent_readers_never_see_partial_batches() {
        let test = TestEngine::memory().with_example();
        let engine = Arc::new(test.engine);
        let config = StressConfig {
            batches: 50,
            batch_size: 3,
            writers: 2,
            readers: 3,
        };

        let result = stress_put_and_query(Arc::clone(&engine), &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.anomalies, 0);
        assert_eq!(engine.count(EXAMPLE).unwrap(), 2 * 50 * 3);
        assert!(engine.verify().unwrap().is_consistent());
    }

    #[test]
    fn contended_unique_value_commits_once() {
        for round in 0..10 {
            let test = TestEngine::memory().with_example();
            let result = stress_unique_contention(&test, 8, "shared@x.com");
            assert_eq!(result.successful_ops, 1, "round {round}");
            assert_eq!(result.failed_ops, 7);
            assert_eq!(result.anomalies, 0);

            let owners = test
                .get_by_index(EXAMPLE, &IndexQuery::new().eq("email", "shared@x.com"))
                .unwrap();
            assert_eq!(owners.len(), 1);
            assert_eq!(test.count(EXAMPLE).unwrap(), 1);
            assert!(test.verify().unwrap().is_consistent());
        }
    }

    #[test]
    fn overwrites_keep_indexes_consistent() {
        let test = TestEngine::memory().with_example();
        let result = stress_overwrites(&test, 500, 20);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(test.count(EXAMPLE).unwrap(), 20);
        assert!(test.verify().unwrap().is_consistent());
    }
}
