//! Live counts-per-minute estimation with statistical reset heuristics.
//!
//! The estimator keeps two histories of per-event intervals (seconds): a
//! long one of `ring_size` entries whose mean gives the CPM, and a short one
//! of the last four intervals. Under a stationary Poisson process the sum
//! of `k` intervals scaled by `2λ` is `χ²(2k)`, so the current mean bounds
//! how long a gap, or how short a run of intervals, is still plausible.
//! When an observation falls outside its bound, the history is discarded
//! so the estimate follows the new rate instead of averaging it away.
//!
//! Three checks share a false-positive budget `p`:
//!
//! | Check | When | Fires on |
//! |-------|------|----------|
//! | long idle | before each line | time since the last event too long |
//! | slow trend | before each line, `k > 2` | mean of last 3 intervals too long |
//! | burst | after each event, CPM below ceiling | mean of last 4 intervals too short |
//!
//! ```
//! use gc_core::estimator::RateEstimator;
//!
//! let mut estimator = RateEstimator::standard();
//! // one event per 15625 ticks = one per second
//! for _ in 0..20 {
//!     estimator.process_line(1, 15_625);
//! }
//! let cpm = estimator.cpm().unwrap();
//! assert!((cpm - 60.0).abs() < 1e-6);
//! ```

use gc_common::{Error, Result};
use gc_config::validate::validate_estimator;
use gc_config::{ConfigError, EstimatorConfig};
use serde::Serialize;

use crate::bounds::ConfidenceBoundTable;
use crate::history::CircularHistory;

/// Capacity of the short interval history.
pub const RECENT_WINDOW: usize = 4;

const SLOW_TREND_SAMPLES: usize = 3;
const BURST_SAMPLES: usize = 4;

const ADAPTIVE_RESIZE_EVERY: usize = 10;
const ADAPTIVE_MIN_CAPACITY: usize = 10;

/// Which heuristic discarded the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetKind {
    /// No event for improbably long: the rate dropped.
    LongIdle,
    /// The last three intervals were improbably long: the rate dropped.
    SlowTrend,
    /// The last four intervals were improbably short: the rate rose.
    Burst,
}

impl std::fmt::Display for ResetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetKind::LongIdle => write!(f, "long_idle"),
            ResetKind::SlowTrend => write!(f, "slow_trend"),
            ResetKind::Burst => write!(f, "burst"),
        }
    }
}

/// Multipliers of the mean interval derived from the false-positive budget.
///
/// Each check compares an observation against
/// `factor * 2k * mean / quantile(k)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResetThresholds {
    /// `-ln(p)`
    pub long_idle: f64,
    /// `-ln(p^(1/3))`
    pub slow_trend: f64,
    /// `-ln(1 - p^(1/4))`
    pub burst: f64,
}

impl ResetThresholds {
    pub fn from_false_positive(p: f64) -> Self {
        Self {
            long_idle: -p.ln(),
            slow_trend: -p.powf(1.0 / SLOW_TREND_SAMPLES as f64).ln(),
            burst: -(1.0 - p.powf(1.0 / BURST_SAMPLES as f64)).ln(),
        }
    }
}

/// Estimate emitted for one recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    /// Counts per minute after this event; infinite if every held interval is zero.
    pub cpm: f64,
    /// Events backing the estimate.
    pub event_count: usize,
    /// Interval attributed to this event, in seconds.
    pub interval_seconds: f64,
    /// Set when this event triggered a burst reset.
    pub reset: Option<ResetKind>,
}

/// Everything one device line produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineOutcome {
    /// Reset fired by the checks that run before the line is consumed.
    pub pre_check_reset: Option<ResetKind>,
    /// One reading per sub-event in the line.
    pub readings: Vec<Reading>,
}

/// Streaming CPM estimator for one measurement session.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    config: EstimatorConfig,
    bounds: ConfidenceBoundTable,
    thresholds: ResetThresholds,
    event_ring: CircularHistory<f64>,
    recent_ring: CircularHistory<f64>,
    event_count: usize,
    /// Ticks since the last recorded event, fractional when a line's
    /// ticks are split across several events.
    idle_ticks: f64,
}

impl RateEstimator {
    /// Build an estimator, computing bound tables if the built-in ones do
    /// not cover `config`.
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        validate_estimator(&config).map_err(ConfigError::from)?;
        let bounds = ConfidenceBoundTable::for_estimator(&config)?;
        Self::with_bounds(config, bounds)
    }

    /// Build an estimator around precomputed tables.
    pub fn with_bounds(config: EstimatorConfig, bounds: ConfidenceBoundTable) -> Result<Self> {
        validate_estimator(&config).map_err(ConfigError::from)?;
        if bounds.rows() < config.ring_size {
            return Err(Error::InvalidParameter {
                field: "estimator.ring_size".to_string(),
                message: format!(
                    "bound tables cover {} events, ring size is {}",
                    bounds.rows(),
                    config.ring_size
                ),
            });
        }

        let thresholds = ResetThresholds::from_false_positive(config.false_positive_p);
        Ok(Self {
            event_ring: CircularHistory::new(config.ring_size),
            recent_ring: CircularHistory::new(RECENT_WINDOW),
            event_count: 0,
            idle_ticks: 0.0,
            config,
            bounds,
            thresholds,
        })
    }

    /// Default configuration with the built-in tables.
    pub fn standard() -> Self {
        let config = EstimatorConfig::default();
        Self {
            event_ring: CircularHistory::new(config.ring_size),
            recent_ring: CircularHistory::new(RECENT_WINDOW),
            event_count: 0,
            idle_ticks: 0.0,
            thresholds: ResetThresholds::from_false_positive(config.false_positive_p),
            bounds: ConfidenceBoundTable::standard(),
            config,
        }
    }

    /// Consume one device line reporting `sub_event_count` events over
    /// `elapsed_ticks` ticks.
    ///
    /// The pre-checks run first against the state left by earlier lines.
    /// A line with no events only extends the idle time.
    pub fn process_line(&mut self, sub_event_count: u32, elapsed_ticks: u32) -> LineOutcome {
        let pre_check_reset = self.poll();

        if sub_event_count == 0 {
            self.idle_ticks += f64::from(elapsed_ticks);
            return LineOutcome {
                pre_check_reset,
                readings: Vec::new(),
            };
        }

        let share = f64::from(elapsed_ticks) / f64::from(sub_event_count);
        let readings = (0..sub_event_count)
            .map(|_| self.record_event(share))
            .collect();
        self.adapt_window();

        LineOutcome {
            pre_check_reset,
            readings,
        }
    }

    /// Run the rate-drop checks without consuming a line.
    pub fn poll(&mut self) -> Option<ResetKind> {
        if self.long_idle_breached(self.idle_seconds()) {
            let bound = self.long_idle_bound().unwrap_or_default();
            self.log_reset(ResetKind::LongIdle, self.idle_seconds(), bound);
            self.clear();
            return Some(ResetKind::LongIdle);
        }

        if let (Some(bound), Some(recent)) = (
            self.slow_trend_bound(),
            self.recent_ring.average_of(SLOW_TREND_SAMPLES),
        ) {
            if recent > bound {
                self.log_reset(ResetKind::SlowTrend, recent, bound);
                self.clear();
                return Some(ResetKind::SlowTrend);
            }
        }

        None
    }

    /// Discard all history and idle time.
    pub fn reset(&mut self) {
        self.clear();
        self.idle_ticks = 0.0;
    }

    /// Current estimate, `None` before the first event.
    pub fn cpm(&self) -> Option<f64> {
        self.event_ring.average().map(cpm_from_mean)
    }

    pub fn event_count(&self) -> usize {
        self.event_count
    }

    /// Time since the last recorded event, in seconds.
    pub fn idle_seconds(&self) -> f64 {
        self.idle_ticks * self.config.tick_seconds
    }

    /// Mean interval of the long history, in seconds.
    pub fn mean_interval(&self) -> Option<f64> {
        self.event_ring.average()
    }

    /// Current capacity of the long history.
    pub fn window_capacity(&self) -> usize {
        self.event_ring.capacity()
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn bounds(&self) -> &ConfidenceBoundTable {
        &self.bounds
    }

    pub fn thresholds(&self) -> ResetThresholds {
        self.thresholds
    }

    /// Idle time above which the long-idle check fires.
    pub fn long_idle_bound(&self) -> Option<f64> {
        if self.event_count == 0 {
            return None;
        }
        let k = self.event_count;
        let mean = self.event_ring.average()?;
        Some(self.thresholds.long_idle * 2.0 * k as f64 * mean / self.bounds.upper(k))
    }

    /// Three-interval mean above which the slow-trend check fires.
    pub fn slow_trend_bound(&self) -> Option<f64> {
        if self.event_count <= 2 {
            return None;
        }
        let k = self.event_count;
        let mean = self.event_ring.average()?;
        Some(self.thresholds.slow_trend * 2.0 * k as f64 * mean / self.bounds.upper(k))
    }

    /// Four-interval mean below which the burst check fires.
    pub fn burst_bound(&self) -> Option<f64> {
        if self.event_count == 0 {
            return None;
        }
        let k = self.event_count;
        let mean = self.event_ring.average()?;
        Some(self.thresholds.burst * 2.0 * k as f64 * mean / self.bounds.lower(k))
    }

    fn long_idle_breached(&self, idle_seconds: f64) -> bool {
        self.long_idle_bound()
            .is_some_and(|bound| idle_seconds > bound)
    }

    fn record_event(&mut self, share_ticks: f64) -> Reading {
        self.event_count = (self.event_count + 1).min(self.event_ring.capacity());
        self.idle_ticks += share_ticks;
        let interval = self.idle_ticks * self.config.tick_seconds;
        self.event_ring.insert(interval);
        self.recent_ring.insert(interval);

        let mut cpm = self.cpm().unwrap_or_default();
        let mut reset = None;

        if cpm < self.config.burst_cpm_ceiling {
            if let (Some(recent), Some(bound)) =
                (self.recent_ring.average_of(BURST_SAMPLES), self.burst_bound())
            {
                if recent < bound {
                    self.log_reset(ResetKind::Burst, recent, bound);
                    self.clear();
                    self.event_count = 1;
                    self.event_ring.insert(interval);
                    self.recent_ring.insert(interval);
                    cpm = cpm_from_mean(interval);
                    reset = Some(ResetKind::Burst);
                }
            }
        }

        self.idle_ticks = 0.0;
        tracing::debug!(
            target: "gc_core::estimator",
            cpm,
            event_count = self.event_count,
            interval_seconds = interval,
            "event recorded"
        );

        Reading {
            cpm,
            event_count: self.event_count,
            interval_seconds: interval,
            reset,
        }
    }

    /// Resize the long history to hold about `adaptive_window_seconds` of
    /// intervals. Runs on every tenth event.
    fn adapt_window(&mut self) {
        let Some(window_seconds) = self.config.adaptive_window_seconds else {
            return;
        };
        if self.event_count <= 1 || self.event_count % ADAPTIVE_RESIZE_EVERY != 0 {
            return;
        }
        let Some(mean) = self.event_ring.average() else {
            return;
        };
        if mean <= 0.0 {
            return;
        }

        let wanted = (window_seconds / mean) as usize;
        let capacity = wanted
            .max(ADAPTIVE_MIN_CAPACITY)
            .min(self.config.ring_size);
        if capacity != self.event_ring.capacity() {
            tracing::debug!(
                target: "gc_core::estimator",
                from = self.event_ring.capacity(),
                to = capacity,
                "resizing interval window"
            );
            self.event_ring.resize(capacity);
            self.event_count = self.event_count.min(capacity);
        }
    }

    /// Zero both histories and the event count. Idle time is kept: the
    /// next interval still spans the gap since the last event.
    fn clear(&mut self) {
        self.event_count = 0;
        self.event_ring.reset();
        self.recent_ring.reset();
    }

    fn log_reset(&self, kind: ResetKind, observed: f64, bound: f64) {
        tracing::info!(
            target: "gc_core::estimator",
            kind = %kind,
            event_count = self.event_count,
            observed,
            bound,
            "rate history reset"
        );
    }
}

fn cpm_from_mean(mean_interval: f64) -> f64 {
    60.0 / mean_interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use gc_config::settings::DEFAULT_TICK_SECONDS;

    /// Ticks in one second at the default tick length.
    const TICKS_PER_SECOND: u32 = 15_625;

    fn rel_eq(a: f64, b: f64, tol: f64) -> bool {
        ((a - b) / b).abs() <= tol
    }

    fn feed(estimator: &mut RateEstimator, lines: usize, ticks: u32) -> Vec<LineOutcome> {
        (0..lines).map(|_| estimator.process_line(1, ticks)).collect()
    }

    #[test]
    fn thresholds_from_default_budget() {
        let t = ResetThresholds::from_false_positive(0.001);
        assert!(rel_eq(t.long_idle, 6.907_755_278_982_137, 1e-12));
        assert!(rel_eq(t.slow_trend, 2.302_585_092_994_046, 1e-12));
        assert!(rel_eq(t.burst, -(1.0 - 0.001_f64.powf(0.25)).ln(), 1e-12));
        assert!(t.burst < t.slow_trend && t.slow_trend < t.long_idle);
    }

    #[test]
    fn fresh_estimator_has_no_estimate() {
        let mut estimator = RateEstimator::standard();
        assert_eq!(estimator.cpm(), None);
        assert_eq!(estimator.event_count(), 0);
        assert_eq!(estimator.long_idle_bound(), None);
        assert_eq!(estimator.poll(), None);
    }

    #[test]
    fn idle_line_only_accumulates_ticks() {
        let mut estimator = RateEstimator::standard();
        let outcome = estimator.process_line(0, 256);
        assert_eq!(outcome, LineOutcome::default());
        assert_eq!(estimator.event_count(), 0);
        assert!(rel_eq(estimator.idle_seconds(), 256.0 * DEFAULT_TICK_SECONDS, 1e-12));
    }

    #[test]
    fn idle_ticks_fold_into_next_interval() {
        let mut estimator = RateEstimator::standard();
        estimator.process_line(0, 10_000);
        let outcome = estimator.process_line(1, 5_625);
        let reading = outcome.readings[0];
        assert!(rel_eq(reading.interval_seconds, 1.0, 1e-12));
        assert_eq!(estimator.idle_seconds(), 0.0);
    }

    #[test]
    fn multi_event_line_splits_ticks_evenly() {
        let mut estimator = RateEstimator::standard();
        let outcome = estimator.process_line(4, 4 * TICKS_PER_SECOND);
        assert_eq!(outcome.readings.len(), 4);
        for (i, reading) in outcome.readings.iter().enumerate() {
            assert_eq!(reading.event_count, i + 1);
            assert!(rel_eq(reading.interval_seconds, 1.0, 1e-12));
            assert!(rel_eq(reading.cpm, 60.0, 1e-9));
        }
    }

    #[test]
    fn stationary_rate_converges_without_resets() {
        let mut estimator = RateEstimator::standard();
        let outcomes = feed(&mut estimator, 20, TICKS_PER_SECOND);

        for outcome in &outcomes {
            assert_eq!(outcome.pre_check_reset, None);
            assert_eq!(outcome.readings.len(), 1);
            assert_eq!(outcome.readings[0].reset, None);
        }
        let expected = 60.0 / (f64::from(TICKS_PER_SECOND) * DEFAULT_TICK_SECONDS);
        assert!(rel_eq(estimator.cpm().unwrap(), expected, 1e-9));
        assert_eq!(estimator.event_count(), 20);
    }

    #[test]
    fn event_count_saturates_at_ring_size() {
        let mut estimator = RateEstimator::standard();
        let mut max_seen = 0;
        for outcome in feed(&mut estimator, 150, TICKS_PER_SECOND) {
            max_seen = max_seen.max(outcome.readings[0].event_count);
        }
        assert_eq!(max_seen, 100);
        assert_eq!(estimator.event_count(), 100);
    }

    #[test]
    fn long_idle_bound_matches_formula() {
        let mut estimator = RateEstimator::standard();
        feed(&mut estimator, 5, TICKS_PER_SECOND);
        assert_eq!(estimator.event_count(), 5);
        assert!(rel_eq(estimator.mean_interval().unwrap(), 1.0, 1e-12));

        let expected = -(0.001_f64.ln()) * 2.0 * 5.0 * 1.0 / 3.24697;
        let bound = estimator.long_idle_bound().unwrap();
        assert!(rel_eq(bound, expected, 1e-12), "{} vs {}", bound, expected);
    }

    #[test]
    fn long_idle_boundary_is_exclusive() {
        let mut estimator = RateEstimator::standard();
        feed(&mut estimator, 5, TICKS_PER_SECOND);
        let bound = estimator.long_idle_bound().unwrap();

        assert!(!estimator.long_idle_breached(bound));
        assert!(estimator.long_idle_breached(bound + DEFAULT_TICK_SECONDS));
    }

    #[test]
    fn long_idle_fires_one_tick_past_the_bound() {
        let mut at_bound = RateEstimator::standard();
        feed(&mut at_bound, 5, TICKS_PER_SECOND);
        let bound_ticks = at_bound.long_idle_bound().unwrap() / DEFAULT_TICK_SECONDS;
        let mut past_bound = at_bound.clone();

        at_bound.process_line(0, bound_ticks.floor() as u32);
        assert_eq!(at_bound.poll(), None);
        assert_eq!(at_bound.event_count(), 5);

        past_bound.process_line(0, bound_ticks.ceil() as u32);
        assert_eq!(past_bound.poll(), Some(ResetKind::LongIdle));
        assert_eq!(past_bound.event_count(), 0);
    }

    #[test]
    fn rate_drop_triggers_long_idle_reset() {
        let mut estimator = RateEstimator::standard();
        // ~10 events per second
        let fast_ticks = 1_563;
        feed(&mut estimator, 20, fast_ticks);
        assert!(estimator.cpm().unwrap() > 500.0);

        let gap = estimator.process_line(0, 300 * fast_ticks);
        assert_eq!(gap.pre_check_reset, None);
        assert!(gap.readings.is_empty());

        let next = estimator.process_line(0, 0);
        assert_eq!(next.pre_check_reset, Some(ResetKind::LongIdle));
        assert_eq!(estimator.event_count(), 0);
        assert_eq!(estimator.cpm(), None);
    }

    #[test]
    fn interval_after_long_idle_spans_the_gap() {
        let mut estimator = RateEstimator::standard();
        feed(&mut estimator, 20, 1_563);
        estimator.process_line(0, 300 * 1_563);

        let outcome = estimator.process_line(1, 1_563);
        assert_eq!(outcome.pre_check_reset, Some(ResetKind::LongIdle));
        let reading = outcome.readings[0];
        assert_eq!(reading.event_count, 1);
        assert!(rel_eq(
            reading.interval_seconds,
            301.0 * 1_563.0 * DEFAULT_TICK_SECONDS,
            1e-12
        ));
    }

    #[test]
    fn slow_intervals_trigger_slow_trend_reset() {
        let mut estimator = RateEstimator::standard();
        feed(&mut estimator, 30, 1_563);
        estimator.process_line(1, 3 * TICKS_PER_SECOND);

        // idle time is zero right after an event, so only the trend check can fire
        assert_eq!(estimator.idle_seconds(), 0.0);
        let bound = estimator.slow_trend_bound().unwrap();
        assert!(estimator.recent_ring.average_of(3).unwrap() > bound);

        assert_eq!(estimator.poll(), Some(ResetKind::SlowTrend));
        assert_eq!(estimator.event_count(), 0);
        assert_eq!(estimator.cpm(), None);
    }

    #[test]
    fn slow_trend_needs_three_events() {
        let mut estimator = RateEstimator::standard();
        feed(&mut estimator, 2, TICKS_PER_SECOND);
        assert_eq!(estimator.slow_trend_bound(), None);
        estimator.process_line(1, TICKS_PER_SECOND);
        assert!(estimator.slow_trend_bound().is_some());
    }

    #[test]
    fn burst_reseeds_history_with_current_event() {
        let mut estimator = RateEstimator::standard();
        // 30 CPM
        feed(&mut estimator, 20, 2 * TICKS_PER_SECOND);
        assert!(estimator.cpm().unwrap() < 100.0);

        let fast = feed(&mut estimator, 4, 156);
        for outcome in &fast[..3] {
            assert_eq!(outcome.readings[0].reset, None);
        }
        let burst = fast[3].readings[0];
        assert_eq!(burst.reset, Some(ResetKind::Burst));
        assert_eq!(burst.event_count, 1);
        assert!(rel_eq(burst.cpm, 60.0 / (156.0 * DEFAULT_TICK_SECONDS), 1e-12));

        assert_eq!(estimator.event_count(), 1);
        assert!(rel_eq(
            estimator.mean_interval().unwrap(),
            156.0 * DEFAULT_TICK_SECONDS,
            1e-12
        ));
        assert_eq!(estimator.recent_ring.len(), 1);
    }

    #[test]
    fn burst_check_skipped_above_cpm_ceiling() {
        let mut estimator = RateEstimator::standard();
        // 600 CPM, then a much faster run
        feed(&mut estimator, 20, 1_563);
        for outcome in feed(&mut estimator, 8, 10) {
            assert_eq!(outcome.readings[0].reset, None);
        }
        assert_eq!(estimator.event_count(), 28);
    }

    #[test]
    fn zero_length_intervals_give_unbounded_cpm() {
        let mut estimator = RateEstimator::standard();
        let outcome = estimator.process_line(2, 0);
        assert!(outcome.readings.iter().all(|r| r.cpm.is_infinite()));
        assert!(outcome.readings.iter().all(|r| r.reset.is_none()));
    }

    #[test]
    fn explicit_reset_clears_everything() {
        let mut estimator = RateEstimator::standard();
        feed(&mut estimator, 10, TICKS_PER_SECOND);
        estimator.process_line(0, 500);
        estimator.reset();
        assert_eq!(estimator.event_count(), 0);
        assert_eq!(estimator.cpm(), None);
        assert_eq!(estimator.idle_seconds(), 0.0);
    }

    #[test]
    fn adaptive_window_shrinks_long_history() {
        let config = EstimatorConfig {
            adaptive_window_seconds: Some(20.0),
            ..EstimatorConfig::default()
        };
        let mut estimator = RateEstimator::new(config).unwrap();
        // 1 s intervals: 20 s of history is 20 entries
        feed(&mut estimator, 40, TICKS_PER_SECOND);
        assert_eq!(estimator.window_capacity(), 20);
        assert_eq!(estimator.event_count(), 20);
        assert!(rel_eq(estimator.cpm().unwrap(), 60.0, 1e-9));
    }

    #[test]
    fn adaptive_window_respects_minimum_capacity() {
        let config = EstimatorConfig {
            adaptive_window_seconds: Some(1.0),
            ..EstimatorConfig::default()
        };
        let mut estimator = RateEstimator::new(config).unwrap();
        feed(&mut estimator, 10, TICKS_PER_SECOND);
        assert_eq!(estimator.window_capacity(), 10);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = EstimatorConfig {
            false_positive_p: 0.0,
            ..EstimatorConfig::default()
        };
        let err = RateEstimator::new(config).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref field, .. } if field == "estimator.false_positive_p"));
    }

    #[test]
    fn with_bounds_rejects_short_tables() {
        let config = EstimatorConfig {
            ring_size: 120,
            ..EstimatorConfig::default()
        };
        let err = RateEstimator::with_bounds(config, ConfidenceBoundTable::standard()).unwrap_err();
        assert_eq!(err.code(), 11);
    }

    #[test]
    fn large_ring_builds_extended_tables() {
        let config = EstimatorConfig {
            ring_size: 200,
            ..EstimatorConfig::default()
        };
        let mut estimator = RateEstimator::new(config).unwrap();
        assert_eq!(estimator.bounds().rows(), 200);
        feed(&mut estimator, 250, TICKS_PER_SECOND);
        assert_eq!(estimator.event_count(), 200);
    }
}
