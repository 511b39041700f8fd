//! Stress tests for SchemaStore.
//!
//! These helpers drive storage under heavy load and concurrent access.

use crate::fixtures::{Counter, Player};
use schemastore_core::Storage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
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
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct keys.
    pub key_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            key_count: 100,
        }
    }
}

/// Increments the counter at `key` from every thread at once.
///
/// With an unbounded retry policy the final counter value equals
/// `successful_ops`.
pub fn stress_concurrent_increments(
    storage: &Storage,
    key: &str,
    config: &StressConfig,
) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                for _ in 0..config.operations {
                    let result = storage.update::<Counter, _>(key, |current| Counter {
                        value: current.map_or(0, |c| c.value) + 1,
                    });
                    match result {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    StressTestResult::new(
        successful.into_inner(),
        failed.into_inner(),
        start.elapsed(),
    )
}

/// Mixed puts, finds and removes over a shared key space, one key range
/// per thread.
pub fn stress_mixed_operations(storage: &Storage, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..config.threads {
            let successful = &successful;
            let failed = &failed;
            scope.spawn(move || {
                for i in 0..config.operations {
                    let key = format!("t{t}/{}", i % config.key_count.max(1));
                    let result = match i % 3 {
                        0 => storage.put(&key, &Player::new(key.clone())),
                        1 => storage.find::<Player>(&key).map(|_| ()),
                        _ => storage.remove::<Player>(&key).map(|_| ()),
                    };
                    match result {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    StressTestResult::new(
        successful.into_inner(),
        failed.into_inner(),
        start.elapsed(),
    )
}
