//! Fuzz target for the estimator over arbitrary count reports.
//!
//! Small ring sizes and adaptive windows reach the resize and cap paths
//! quickly.

#![no_main]

use arbitrary::Arbitrary;
use gc_config::EstimatorConfig;
use gc_core::estimator::RateEstimator;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    ring_size: u8,
    adaptive_window: Option<u16>,
    lines: Vec<(u8, u32)>,
}

fuzz_target!(|input: Input| {
    let config = EstimatorConfig {
        ring_size: usize::from(input.ring_size).clamp(1, 100),
        adaptive_window_seconds: input.adaptive_window.map(|s| f64::from(s) + 1.0),
        ..EstimatorConfig::default()
    };
    let Ok(mut estimator) = RateEstimator::new(config) else {
        return;
    };

    for (events, ticks) in input.lines {
        let outcome = estimator.process_line(u32::from(events), ticks);
        assert_eq!(outcome.readings.len(), usize::from(events));
        assert!(estimator.event_count() <= estimator.window_capacity());
    }
});
