//! Concurrent lifecycle stress.
//!
//! Application threads call lifecycle operations while other threads play
//! the engine and report status changes, all against one replicator.

use crate::fixtures::ReplicatorFixture;
use docsync_replicator::ActivityLevel;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Engine reports delivered (including ones the replicator ignored).
    pub engine_reports: usize,
    /// Engines created during the run.
    pub engines_created: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    fn new(
        total_ops: usize,
        engine_reports: usize,
        engines_created: usize,
        duration: Duration,
    ) -> Self {
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total_ops as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        Self {
            total_ops,
            engine_reports,
            engines_created,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Engine reports: {}", self.engine_reports);
        println!("Engines created: {}", self.engines_created);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Number of application threads; as many engine threads run alongside.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 500,
            threads: 4,
        }
    }
}

/// Hammers the fixture's replicator with interleaved lifecycle calls and
/// engine reports, then stops it.
///
/// Returns once every thread finished; a deadlock shows up as a hang.
pub fn lifecycle_storm(fixture: &ReplicatorFixture, config: &StressConfig) -> StressTestResult {
    let engine_reports = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..config.threads {
            let replicator = fixture.replicator.clone();
            scope.spawn(move || {
                for i in 0..config.operations {
                    match (t * 31 + i * 7) % 6 {
                        0 | 1 => replicator.start(),
                        2 => replicator.stop(),
                        3 => replicator.set_suspended(true),
                        4 => replicator.set_suspended(false),
                        _ => {
                            let _ = replicator.status();
                        }
                    }
                }
            });
        }
        for t in 0..config.threads {
            let factory = &fixture.factory;
            let engine_reports = &engine_reports;
            scope.spawn(move || {
                for i in 0..config.operations {
                    let Some(engine) = factory.last_engine() else {
                        thread::yield_now();
                        continue;
                    };
                    let level = match (t * 13 + i * 5) % 4 {
                        0 => ActivityLevel::Connecting,
                        1 => ActivityLevel::Busy,
                        2 => ActivityLevel::Idle,
                        _ => ActivityLevel::Stopped,
                    };
                    engine.report_level(level);
                    engine_reports.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    settle(fixture);
    StressTestResult::new(
        config.threads * config.operations * 2,
        engine_reports.load(Ordering::Relaxed),
        fixture.factory.engine_count(),
        start.elapsed(),
    )
}

/// Drives the fixture's replicator to `Stopped`, completing any stop the
/// current engine was asked for.
///
/// # Panics
///
/// Panics if the replicator doesn't reach `Stopped`.
pub fn settle(fixture: &ReplicatorFixture) {
    for _ in 0..8 {
        fixture.replicator.stop();
        if let Some(engine) = fixture.factory.last_engine() {
            if !engine.is_terminated() {
                engine.report_stopped();
            }
        }
        if fixture.replicator.status().level == ActivityLevel::Stopped {
            return;
        }
    }
    panic!("Replicator did not stop: {:?}", fixture.replicator.status());
}
