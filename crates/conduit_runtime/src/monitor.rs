//! Run statistics and cumulative metrics.

use conduit_core::RunId;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Counters for a single run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Run identifier
    pub run_id: RunId,
    /// Instructions whose kernel ran
    pub instructions_executed: usize,
    /// Events recorded
    pub events_recorded: u64,
    /// Event waits issued
    pub events_waited: u64,
    /// Variables released by the collector
    pub variables_released: u64,
    /// Handles from earlier runs or overwritten values released
    pub stale_released: u64,
    /// Wall-clock duration
    pub elapsed: Duration,
}

/// Cumulative metrics over an interpreter's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    /// Runs started
    pub runs_started: u64,
    /// Runs that returned fetches
    pub runs_succeeded: u64,
    /// Runs that returned an error
    pub runs_failed: u64,
    /// Instructions executed by successful runs
    pub instructions_executed: u64,
    /// Events recorded by successful runs
    pub events_recorded: u64,
    /// Event waits by successful runs
    pub events_waited: u64,
    /// Variables released by successful runs
    pub variables_released: u64,
    /// Time spent in successful runs
    pub total_elapsed: Duration,
}

impl Metrics {
    /// Create new metrics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a run start
    pub fn record_start(&mut self) {
        self.runs_started += 1;
    }

    /// Fold in a successful run
    pub fn record_success(&mut self, stats: &RunStats) {
        self.runs_succeeded += 1;
        self.instructions_executed += stats.instructions_executed as u64;
        self.events_recorded += stats.events_recorded;
        self.events_waited += stats.events_waited;
        self.variables_released += stats.variables_released;
        self.total_elapsed += stats.elapsed;
    }

    /// Record a failed run
    pub fn record_failure(&mut self) {
        self.runs_failed += 1;
    }

    /// Get success rate (0.0 - 1.0)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let finished = self.runs_succeeded + self.runs_failed;
        if finished == 0 {
            return 1.0;
        }
        self.runs_succeeded as f64 / finished as f64
    }

    /// Reset metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Metrics plus a bounded history of recent runs
#[derive(Debug, Clone)]
pub struct RunMonitor {
    metrics: Metrics,
    history: VecDeque<RunStats>,
    max_history: usize,
}

impl RunMonitor {
    /// Create a monitor keeping at most `max_history` runs
    #[must_use]
    pub fn new(max_history: usize) -> Self {
        Self {
            metrics: Metrics::new(),
            history: VecDeque::with_capacity(max_history.min(64)),
            max_history,
        }
    }

    /// Current metrics
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Record a run start
    pub fn start(&mut self) {
        self.metrics.record_start();
    }

    /// Record a successful run
    pub fn succeed(&mut self, stats: RunStats) {
        self.metrics.record_success(&stats);
        if self.max_history == 0 {
            return;
        }
        if self.history.len() == self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(stats);
    }

    /// Record a failed run
    pub fn fail(&mut self) {
        self.metrics.record_failure();
    }

    /// Most recent successful runs, oldest first
    pub fn history(&self) -> impl Iterator<Item = &RunStats> {
        self.history.iter()
    }

    /// Most recent successful run
    #[must_use]
    pub fn last(&self) -> Option<&RunStats> {
        self.history.back()
    }

    /// Reset the monitor
    pub fn reset(&mut self) {
        self.metrics.reset();
        self.history.clear();
    }
}

impl Default for RunMonitor {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_stats(instructions: usize) -> RunStats {
        RunStats {
            run_id: RunId::new(),
            instructions_executed: instructions,
            events_recorded: 1,
            events_waited: 1,
            variables_released: 4,
            stale_released: 0,
            elapsed: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.runs_started, 0);
        assert_eq!(metrics.success_rate(), 1.0);
    }

    #[test]
    fn test_metrics_record() {
        let mut metrics = Metrics::new();
        metrics.record_start();
        metrics.record_success(&make_test_stats(2));
        metrics.record_start();
        metrics.record_failure();

        assert_eq!(metrics.runs_started, 2);
        assert_eq!(metrics.instructions_executed, 2);
        assert_eq!(metrics.variables_released, 4);
        assert_eq!(metrics.total_elapsed, Duration::from_millis(2));
        assert_eq!(metrics.success_rate(), 0.5);

        metrics.reset();
        assert_eq!(metrics, Metrics::default());
    }

    #[test]
    fn test_monitor_history_bounded() {
        let mut monitor = RunMonitor::new(3);
        for i in 0..5 {
            monitor.start();
            monitor.succeed(make_test_stats(i));
        }
        assert_eq!(monitor.history().count(), 3);
        assert_eq!(monitor.last().unwrap().instructions_executed, 4);
        assert_eq!(monitor.history().next().unwrap().instructions_executed, 2);
        assert_eq!(monitor.metrics().runs_succeeded, 5);
    }

    #[test]
    fn test_monitor_reset() {
        let mut monitor = RunMonitor::default();
        monitor.start();
        monitor.fail();
        monitor.reset();
        assert_eq!(monitor.metrics().runs_failed, 0);
        assert!(monitor.last().is_none());
    }
}
