//! CPU feedback controller.
//!
//! Converts the server's reported CPU utilization into a new target rate:
//! - Above target: shrink proportionally to the overshoot, keeping at least
//!   `PERCENT_CHANGE_LIMIT` (30%) of the current rate per step
//! - Well under target (more than `DEAD_BAND_PERCENT` below): grow by 30%
//! - Within the dead band: leave the rate alone
//!
//! The result is always clamped into the configured bounds.

use super::state::RateBounds;
use crate::config::{DEAD_BAND_PERCENT, MAX_EFFECTIVE_CPU_PERCENT, PERCENT_CHANGE_LIMIT};

/// Computes the next rate from CPU samples.
///
/// # Arguments
///
/// * `samples` - Per-node CPU utilization percentages for the call
/// * `target` - Target utilization in percent, `0 < target < 100`
/// * `current_rate` - Current rate in requests per second
/// * `bounds` - Clamps applied to the computed rate
///
/// # Returns
///
/// `current_rate` unchanged when `samples` is empty (no signal, no decision);
/// otherwise the adjusted rate within `bounds`.
pub fn calculate_rate(samples: &[f64], target: f64, current_rate: f64, bounds: RateBounds) -> f64 {
    let Some(avg) = mean(samples) else {
        return current_rate;
    };

    // A reading far above 100% must not drive the shrink factor to zero or below
    let delta = (avg - target).min(MAX_EFFECTIVE_CPU_PERCENT - target);

    let new_rate = if delta > 0.0 {
        let percent_change = (1.0 - delta / (100.0 - target)).max(PERCENT_CHANGE_LIMIT);
        percent_change * current_rate
    } else if delta.abs() > DEAD_BAND_PERCENT {
        current_rate + current_rate * PERCENT_CHANGE_LIMIT
    } else {
        current_rate
    };

    bounds.clamp(new_rate)
}

fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    // Safe cast: sample counts are one per serving node
    #[allow(clippy::cast_precision_loss)]
    let len = samples.len() as f64;
    Some(samples.iter().sum::<f64>() / len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OVERLOAD_CPU_SAMPLE;

    const TARGET: f64 = 70.0;

    fn wide() -> RateBounds {
        RateBounds::new(0.00001, 1e12)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_empty_samples_is_identity() {
        // Even outside the bounds: no signal means no decision
        let bounds = RateBounds::new(1.0, 10.0);
        assert_eq!(calculate_rate(&[], TARGET, 12_345.0, bounds), 12_345.0);
        assert_eq!(calculate_rate(&[], TARGET, 5.0, bounds), 5.0);
    }

    #[test]
    fn test_low_cpu_grows_by_thirty_percent() {
        // 1000 / 8000 GCU = 12.5%
        assert_close(calculate_rate(&[12.5], TARGET, 10_000.0, wide()), 13_000.0);
    }

    #[test]
    fn test_high_cpu_shrinks_proportionally() {
        // 7000 / 8000 GCU = 87.5%: delta 17.5 out of 30 points of headroom
        let expected = (1.0 - 17.5 / 30.0) * 10_000.0;
        let rate = calculate_rate(&[87.5], TARGET, 10_000.0, wide());
        assert_close(rate, expected);
        assert!((rate - 4_166.67).abs() < 0.01);
    }

    #[test]
    fn test_at_target_is_unchanged() {
        assert_eq!(calculate_rate(&[70.0], TARGET, 10_000.0, wide()), 10_000.0);
    }

    #[test]
    fn test_dead_band_edges() {
        // 5 points under is still inside the band
        assert_eq!(calculate_rate(&[65.0], TARGET, 100.0, wide()), 100.0);
        // Just past the band grows
        assert_close(calculate_rate(&[64.9], TARGET, 100.0, wide()), 130.0);
        // Any overshoot shrinks, however small
        assert!(calculate_rate(&[70.5], TARGET, 100.0, wide()) < 100.0);
    }

    #[test]
    fn test_samples_are_averaged() {
        // Mean of 60 and 80 is the target
        assert_eq!(calculate_rate(&[60.0, 80.0], TARGET, 500.0, wide()), 500.0);
        // Mean of 10 and 20 is well under target
        assert_close(calculate_rate(&[10.0, 20.0], TARGET, 500.0, wide()), 650.0);
    }

    #[test]
    fn test_shrink_factor_never_below_floor() {
        for avg in [95.0, 99.9, 100.0, 150.0, 1_000.0, f64::INFINITY] {
            let rate = calculate_rate(&[avg], TARGET, 10_000.0, wide());
            assert!(
                rate >= PERCENT_CHANGE_LIMIT * 10_000.0 - 1e-9,
                "avg {avg} shrank to {rate}"
            );
            assert!(rate < 10_000.0);
        }
    }

    #[test]
    fn test_shrink_floor_for_every_target() {
        for target in [1.0, 25.0, 50.0, 70.0, 90.0, 99.0] {
            let rate = calculate_rate(&[OVERLOAD_CPU_SAMPLE], target, 1_000.0, wide());
            assert!(rate >= 300.0 - 1e-9, "target {target} shrank to {rate}");
            assert!(rate > 0.0);
        }
    }

    #[test]
    fn test_overload_sample_hits_floor() {
        let rate = calculate_rate(&[OVERLOAD_CPU_SAMPLE], TARGET, 10_000.0, wide());
        assert_close(rate, 3_000.0);
    }

    #[test]
    fn test_output_always_within_bounds() {
        let bounds = RateBounds::new(5.0, 50.0);
        for current in [0.1, 5.0, 20.0, 50.0, 500.0] {
            for avg in [0.0, 30.0, 68.0, 70.0, 75.0, 99.0, 250.0] {
                let rate = calculate_rate(&[avg], TARGET, current, bounds);
                assert!(
                    bounds.contains(rate),
                    "current {current}, avg {avg} produced {rate}"
                );
            }
        }
    }

    #[test]
    fn test_repeated_overload_converges_to_lower_bound() {
        let bounds = RateBounds::new(0.00001, 100_000.0);
        let mut rate = 10_000.0;
        for _ in 0..100 {
            let next = calculate_rate(&[OVERLOAD_CPU_SAMPLE], TARGET, rate, bounds);
            assert!(next >= bounds.lower);
            assert!(next <= rate);
            rate = next;
        }
        assert_eq!(rate, bounds.lower);
    }

    #[test]
    fn test_growth_capped_at_upper_bound() {
        let bounds = RateBounds::new(1.0, 100_000.0);
        assert_eq!(calculate_rate(&[0.0], TARGET, 90_000.0, bounds), 100_000.0);
    }
}
