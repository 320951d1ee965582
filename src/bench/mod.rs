//! Algorithm throughput benchmark
//!
//! The harness runs every algorithm of its battery `tier` times in a tight
//! loop for each configured tier and records the mean time per operation
//! and, when a [`MemoryProbe`] is installed, the heap growth over the loop.
//!
//! A harness is either idle or running; a second `run` while one is in
//! progress is rejected. Rows are published to the sink and to
//! [`BenchmarkHarness::results`] as soon as each cell finishes, and the
//! harness yields to the scheduler between cells so a long matrix does not
//! starve other tasks on the runtime.
//!
//! A failing (or panicking) algorithm produces an error row for its cell
//! and the run moves on to the next cell.

mod algorithm;
mod memory;
mod result;

pub use algorithm::{Algorithm, AlgorithmError, BenchAlgorithm, UnknownAlgorithm};
pub use memory::{delta_kb, MemoryProbe, TrackingAllocator};
pub use result::{BenchmarkResult, Metric, ResultSet};

use std::any::Any;
use std::hint::black_box;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{BenchConfig, ConfigError};
use crate::sink::{Notification, Severity, UiSink};

/// Benchmark run errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BenchError {
    /// Nothing to feed the algorithms
    #[error("Benchmark input is empty")]
    EmptyInput,

    /// A run is already in progress on this harness
    #[error("A benchmark run is already in progress")]
    AlreadyRunning,

    /// The run was cancelled; completed rows stay in the result set
    #[error("Benchmark cancelled after {completed} cells")]
    Cancelled {
        /// Cells recorded before the cancellation was seen
        completed: usize,
    },

    /// Invalid configuration
    #[error("Invalid benchmark configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for benchmark runs
pub type BenchResult<T> = Result<T, BenchError>;

/// Harness state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HarnessState {
    /// Ready for a run
    Idle,
    /// A run is in progress
    Running,
}

/// Runs the algorithm battery across the configured tiers
pub struct BenchmarkHarness {
    tiers: Vec<u64>,
    yield_between_cells: bool,
    algorithms: Vec<Box<dyn BenchAlgorithm>>,
    probe: Option<&'static dyn MemoryProbe>,
    sink: Arc<dyn UiSink>,
    running: AtomicBool,
    cancelled: AtomicBool,
    results: Mutex<ResultSet>,
}

impl BenchmarkHarness {
    /// Build a harness over the registry algorithms named in `config`
    ///
    /// An algorithm whose setup fails stays in the battery and reports the
    /// setup error in each of its cells.
    pub fn new(config: BenchConfig, sink: Arc<dyn UiSink>) -> BenchResult<Self> {
        config.validate()?;

        let algorithms = config
            .algorithms
            .iter()
            .map(|&algorithm| match algorithm.instantiate() {
                Ok(bench) => bench,
                Err(e) => {
                    warn!(%algorithm, error = %e, "algorithm setup failed");
                    Box::new(SetupFailed(e)) as Box<dyn BenchAlgorithm>
                }
            })
            .collect();

        Self::with_algorithms(config, algorithms, sink)
    }

    /// Build a harness over a custom battery
    ///
    /// `config.algorithms` is ignored; the battery is run in the given order.
    pub fn with_algorithms(
        config: BenchConfig,
        algorithms: Vec<Box<dyn BenchAlgorithm>>,
        sink: Arc<dyn UiSink>,
    ) -> BenchResult<Self> {
        config.validate_tiers()?;
        if algorithms.is_empty() {
            return Err(ConfigError::NoAlgorithms.into());
        }
        for (i, algorithm) in algorithms.iter().enumerate() {
            if algorithms[..i].iter().any(|a| a.name() == algorithm.name()) {
                return Err(ConfigError::DuplicateAlgorithm(algorithm.name().to_string()).into());
            }
        }

        Ok(BenchmarkHarness {
            tiers: config.tiers,
            yield_between_cells: config.yield_between_cells,
            algorithms,
            probe: None,
            sink,
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            results: Mutex::new(ResultSet::new()),
        })
    }

    /// Measure heap growth with `probe`
    pub fn with_memory_probe(mut self, probe: &'static dyn MemoryProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Current state
    pub fn state(&self) -> HarnessState {
        if self.running.load(Ordering::Acquire) {
            HarnessState::Running
        } else {
            HarnessState::Idle
        }
    }

    /// Tiers, in run order
    pub fn tiers(&self) -> &[u64] {
        &self.tiers
    }

    /// Algorithm names, in run order
    pub fn algorithm_names(&self) -> Vec<&str> {
        self.algorithms.iter().map(|a| a.name()).collect()
    }

    /// Ask the current run to stop at its next yield point
    ///
    /// Has no effect on a run started afterwards.
    pub fn cancel(&self) {
        if self.state() == HarnessState::Running {
            self.cancelled.store(true, Ordering::Release);
        }
    }

    /// Rows recorded by the current or last run
    pub fn results(&self) -> ResultSet {
        self.results.lock().clone()
    }

    /// Run the full matrix over `input`
    pub async fn run(&self, input: &str) -> BenchResult<ResultSet> {
        if input.trim().is_empty() {
            self.notify("Enter some text to analyze", Severity::Error);
            return Err(BenchError::EmptyInput);
        }

        let _guard = RunGuard::acquire(&self.running).ok_or(BenchError::AlreadyRunning)?;
        self.cancelled.store(false, Ordering::Release);
        *self.results.lock() = ResultSet::new();

        info!(
            tiers = ?self.tiers,
            algorithms = self.algorithms.len(),
            input_len = input.len(),
            "benchmark started"
        );

        let input = input.as_bytes();
        let mut completed = 0;

        for &iterations in &self.tiers {
            for algorithm in &self.algorithms {
                if self.cancelled.load(Ordering::Acquire) {
                    warn!(completed, "benchmark cancelled");
                    self.notify("Analysis cancelled", Severity::Info);
                    return Err(BenchError::Cancelled { completed });
                }

                let row = self.measure(algorithm.as_ref(), iterations, input);
                if let Err(row) = self.results.lock().insert(row.clone()) {
                    warn!(algorithm = %row.algorithm, iterations, "duplicate benchmark cell dropped");
                    continue;
                }
                self.sink.on_benchmark_row_added(&row);
                completed += 1;

                if self.yield_between_cells {
                    tokio::task::yield_now().await;
                }
            }
            debug!(iterations, "tier complete");
        }

        info!(cells = completed, "benchmark complete");
        self.notify("Analysis complete", Severity::Success);
        Ok(self.results())
    }

    fn measure(&self, algorithm: &dyn BenchAlgorithm, iterations: u64, input: &[u8]) -> BenchmarkResult {
        let name = algorithm.name();
        let before = self.probe.map(|p| p.allocated_bytes());
        let start = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), AlgorithmError> {
            for _ in 0..iterations {
                black_box(algorithm.run(black_box(input))?);
            }
            Ok(())
        }));

        let elapsed = start.elapsed();
        let after = self.probe.map(|p| p.allocated_bytes());

        let error = match outcome {
            Ok(Ok(())) => {
                let per_op_ms = elapsed.as_secs_f64() * 1000.0 / iterations as f64;
                let memory = match (before, after) {
                    (Some(before), Some(after)) => Metric::Value(delta_kb(before, after)),
                    _ => Metric::Unsupported,
                };
                debug!(algorithm = name, iterations, per_op_ms, "cell measured");
                return BenchmarkResult::measured(name, iterations, per_op_ms, memory);
            }
            Ok(Err(e)) => e,
            Err(payload) => AlgorithmError::new(name, panic_message(payload.as_ref())),
        };

        warn!(algorithm = name, iterations, error = %error, "algorithm failed");
        BenchmarkResult::failed(name, iterations, &error)
    }

    fn notify(&self, message: &str, severity: Severity) {
        self.sink.on_notify(&Notification::new(message, severity));
    }
}

/// Holds the running flag for the duration of a run
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Stand-in for a registry algorithm that could not be set up
struct SetupFailed(AlgorithmError);

impl BenchAlgorithm for SetupFailed {
    fn name(&self) -> &str {
        &self.0.algorithm
    }

    fn run(&self, _input: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
        Err(self.0.clone())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::recording::RecordingSink;
    use std::sync::atomic::AtomicU64;

    struct Echo(&'static str);

    impl BenchAlgorithm for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn run(&self, input: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
            Ok(input.to_vec())
        }
    }

    struct Failing;

    impl BenchAlgorithm for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn run(&self, _input: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
            Err(AlgorithmError::new("failing", "unsupported key size"))
        }
    }

    struct Panicking;

    impl BenchAlgorithm for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn run(&self, _input: &[u8]) -> Result<Vec<u8>, AlgorithmError> {
            panic!("boom")
        }
    }

    /// Each reading is lower than the last, as if memory were being freed
    struct ShrinkingHeap(AtomicU64);

    impl MemoryProbe for ShrinkingHeap {
        fn allocated_bytes(&self) -> u64 {
            self.0.fetch_sub(64 * 1024, Ordering::Relaxed)
        }
    }

    /// Each reading is 2 KB above the last
    struct GrowingHeap(AtomicU64);

    impl MemoryProbe for GrowingHeap {
        fn allocated_bytes(&self) -> u64 {
            self.0.fetch_add(2048, Ordering::Relaxed)
        }
    }

    static SHRINKING: ShrinkingHeap = ShrinkingHeap(AtomicU64::new(1 << 40));
    static GROWING: GrowingHeap = GrowingHeap(AtomicU64::new(0));

    fn config(tiers: &[u64]) -> BenchConfig {
        BenchConfig {
            tiers: tiers.to_vec(),
            ..BenchConfig::default()
        }
    }

    fn harness(
        tiers: &[u64],
        algorithms: Vec<Box<dyn BenchAlgorithm>>,
    ) -> (BenchmarkHarness, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let harness = BenchmarkHarness::with_algorithms(config(tiers), algorithms, sink.clone()).unwrap();
        (harness, sink)
    }

    #[tokio::test]
    async fn test_one_row_per_algorithm_per_tier() {
        let sink = Arc::new(RecordingSink::new());
        let harness = BenchmarkHarness::new(config(&[1, 10]), sink.clone()).unwrap();

        let results = harness.run("hello").await.unwrap();

        assert_eq!(results.len(), 2 * Algorithm::DEFAULT.len());
        for tier in [1, 10] {
            let rows = results.tier(tier);
            assert_eq!(rows.len(), Algorithm::DEFAULT.len());
            for (row, algorithm) in rows.iter().zip(Algorithm::DEFAULT) {
                assert_eq!(row.algorithm, algorithm.name());
                assert!(!row.is_error());
                assert!(row.time_per_op_ms.value().unwrap() >= 0.0);
            }
        }
        assert_eq!(harness.state(), HarnessState::Idle);
    }

    #[tokio::test]
    async fn test_default_tiers_with_a_failing_algorithm() {
        use crate::config::DEFAULT_TIERS;

        assert_eq!(DEFAULT_TIERS, [100, 1_000, 10_000, 100_000]);
        assert_eq!(BenchConfig::default().tiers, DEFAULT_TIERS.to_vec());

        let (harness, sink) = harness(&DEFAULT_TIERS, vec![Box::new(Echo("echo")), Box::new(Failing)]);
        let results = harness.run("x").await.unwrap();

        assert_eq!(results.len(), 2 * DEFAULT_TIERS.len());
        for tier in DEFAULT_TIERS {
            let echo = results.get("echo", tier).unwrap();
            assert!(!echo.is_error());
            assert_eq!(echo.iterations, tier);

            let failed = results.get("failing", tier).unwrap();
            assert!(failed.is_error());
            assert_eq!(failed.time_per_op_ms, Metric::Error);
        }

        let order: Vec<(String, u64)> = sink
            .rows()
            .into_iter()
            .map(|row| (row.algorithm, row.iterations))
            .collect();
        let expected: Vec<(String, u64)> = DEFAULT_TIERS
            .iter()
            .flat_map(|&tier| [("echo".to_string(), tier), ("failing".to_string(), tier)])
            .collect();
        assert_eq!(order, expected);
    }

    #[tokio::test]
    async fn test_failing_algorithm_does_not_stop_the_matrix() {
        let (harness, _) = harness(
            &[1, 5],
            vec![Box::new(Echo("before")), Box::new(Failing), Box::new(Echo("after"))],
        );

        let results = harness.run("input").await.unwrap();
        assert_eq!(results.len(), 6);

        for tier in [1, 5] {
            let failed = results.get("failing", tier).unwrap();
            assert!(failed.is_error());
            assert_eq!(failed.time_per_op_ms, Metric::Error);
            assert_eq!(failed.memory_delta_kb, Metric::Error);
            assert!(failed.error.as_deref().unwrap().contains("unsupported key size"));

            assert!(!results.get("before", tier).unwrap().is_error());
            assert!(!results.get("after", tier).unwrap().is_error());
        }
    }

    #[tokio::test]
    async fn test_panicking_algorithm_recorded_as_error() {
        let (harness, _) = harness(&[3], vec![Box::new(Panicking), Box::new(Echo("echo"))]);

        let results = harness.run("input").await.unwrap();

        let row = results.get("panicking", 3).unwrap();
        assert!(row.error.as_deref().unwrap().contains("boom"));
        assert!(!results.get("echo", 3).unwrap().is_error());
    }

    #[tokio::test]
    async fn test_memory_delta_never_negative() {
        let (harness, _) = harness(&[1, 10, 100], vec![Box::new(Echo("echo"))]);
        let harness = harness.with_memory_probe(&SHRINKING);

        let results = harness.run("input").await.unwrap();
        for row in results.rows() {
            assert_eq!(row.memory_delta_kb, Metric::Value(0.0));
        }
    }

    #[tokio::test]
    async fn test_memory_delta_reported_in_kb() {
        let (harness, _) = harness(&[1], vec![Box::new(Echo("echo"))]);
        let harness = harness.with_memory_probe(&GROWING);

        let results = harness.run("input").await.unwrap();
        assert_eq!(results.get("echo", 1).unwrap().memory_delta_kb, Metric::Value(2.0));
    }

    #[tokio::test]
    async fn test_memory_unsupported_without_probe() {
        let (harness, _) = harness(&[1], vec![Box::new(Echo("echo"))]);

        let results = harness.run("input").await.unwrap();
        assert_eq!(results.get("echo", 1).unwrap().memory_delta_kb, Metric::Unsupported);
    }

    #[tokio::test]
    async fn test_reentrant_run_rejected() {
        let (harness, _) = harness(&[1, 2], vec![Box::new(Echo("a")), Box::new(Echo("b"))]);

        let (first, second) = tokio::join!(harness.run("input"), harness.run("input"));

        assert_eq!(first.unwrap().len(), 4);
        assert_eq!(second.unwrap_err(), BenchError::AlreadyRunning);
        assert_eq!(harness.state(), HarnessState::Idle);

        // idle again, so a new run is accepted
        assert!(harness.run("input").await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (harness, sink) = harness(&[1], vec![Box::new(Echo("echo"))]);

        assert_eq!(harness.run("   ").await.unwrap_err(), BenchError::EmptyInput);

        let notes = sink.notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Error);
        assert!(sink.rows().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_keeps_completed_rows() {
        let (harness, sink) = harness(&[1, 2], vec![Box::new(Echo("a")), Box::new(Echo("b"))]);

        let (outcome, ()) = tokio::join!(harness.run("input"), async { harness.cancel() });

        assert_eq!(outcome.unwrap_err(), BenchError::Cancelled { completed: 1 });
        assert_eq!(harness.results().len(), 1);
        assert_eq!(sink.rows().len(), 1);
        assert_eq!(harness.state(), HarnessState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_while_idle_is_ignored() {
        let (harness, _) = harness(&[1], vec![Box::new(Echo("echo"))]);

        harness.cancel();
        assert!(harness.run("input").await.is_ok());
    }

    #[tokio::test]
    async fn test_rows_published_progressively() {
        let (harness, sink) = harness(&[1, 2], vec![Box::new(Echo("a")), Box::new(Echo("b"))]);

        harness.run("input").await.unwrap();

        let order: Vec<(String, u64)> = sink
            .rows()
            .into_iter()
            .map(|r| (r.algorithm, r.iterations))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 1),
                ("a".to_string(), 2),
                ("b".to_string(), 2),
            ]
        );

        let notes = sink.notifications();
        assert_eq!(notes.last().unwrap().message, "Analysis complete");
        assert_eq!(notes.last().unwrap().severity, Severity::Success);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let sink = Arc::new(RecordingSink::new());
        let err = BenchmarkHarness::with_algorithms(
            config(&[1]),
            vec![Box::new(Echo("x")), Box::new(Echo("x"))],
            sink,
        )
        .err()
        .unwrap();

        assert_eq!(err, BenchError::Config(ConfigError::DuplicateAlgorithm("x".into())));
    }

    #[test]
    fn test_empty_battery_rejected() {
        let sink = Arc::new(RecordingSink::new());
        let err = BenchmarkHarness::with_algorithms(config(&[1]), Vec::new(), sink)
            .err()
            .unwrap();
        assert_eq!(err, BenchError::Config(ConfigError::NoAlgorithms));
    }
}
