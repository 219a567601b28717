//! Pure statistics helpers: trend classification and percentage deltas.

use std::fmt;

use serde::Serialize;

/// Direction of a productivity trend over a trailing window.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Increasing => write!(f, "increasing"),
            TrendDirection::Decreasing => write!(f, "decreasing"),
            TrendDirection::Stable => write!(f, "stable"),
        }
    }
}

/// Rounds to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Classifies a series of per-day averages as increasing, decreasing or
/// stable.
///
/// The first half takes `ceil(n/2)` elements from the start and the second
/// half `floor(n/2)` elements from the midpoint, so for odd lengths the two
/// halves share the middle element. A difference of more than 0.5 either way
/// leaves the stable band.
pub fn classify_trend(values: &[f64]) -> TrendDirection {
    if values.len() < 2 {
        return TrendDirection::Stable;
    }

    let first_half = &values[..values.len().div_ceil(2)];
    let second_half = &values[values.len() / 2..];
    let difference = mean(second_half) - mean(first_half);

    if difference > 0.5 {
        TrendDirection::Increasing
    } else if difference < -0.5 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    }
}

/// Percentage change from `old_value` to `new_value`, rounded to one decimal
/// place.
///
/// A zero baseline reports 100 for any positive new value and 0 otherwise;
/// this flattens unbounded increases but avoids dividing by zero, and is a
/// defined business rule rather than an error mask.
pub fn percentage_change(old_value: f64, new_value: f64) -> f64 {
    if old_value == 0.0 {
        return if new_value > 0.0 { 100.0 } else { 0.0 };
    }

    round1((new_value - old_value) / old_value * 100.0)
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round1() {
        assert_eq!(round1(7.25), 7.3);
        assert_eq!(round1(7.24), 7.2);
        assert_eq!(round1(0.0), 0.0);
    }

    #[test]
    fn test_trend_with_fewer_than_two_points_is_stable() {
        assert_eq!(classify_trend(&[]), TrendDirection::Stable);
        assert_eq!(classify_trend(&[9.0]), TrendDirection::Stable);
    }

    #[test]
    fn test_trend_boundary_at_half_point() {
        // First-half average 6.0, second-half average 6.4: inside the band.
        assert_eq!(
            classify_trend(&[6.0, 6.0, 6.4, 6.4]),
            TrendDirection::Stable
        );
        // Difference of 0.6 leaves the band.
        assert_eq!(
            classify_trend(&[6.0, 6.0, 6.6, 6.6]),
            TrendDirection::Increasing
        );
        assert_eq!(
            classify_trend(&[6.6, 6.6, 6.0, 6.0]),
            TrendDirection::Decreasing
        );
    }

    #[test]
    fn test_trend_halves_overlap_for_odd_lengths() {
        // n = 3: first half is [2.0, 8.0], second half is [8.0, 8.0]; the
        // shared middle element dampens the difference to 3.0.
        assert_eq!(classify_trend(&[2.0, 8.0, 8.0]), TrendDirection::Increasing);
        // Halves [4.0, 5.0] and [5.0, 4.6] average 4.5 vs 4.8; the shared
        // middle element keeps the difference inside the band.
        assert_eq!(classify_trend(&[4.0, 5.0, 4.6]), TrendDirection::Stable);
    }

    #[test]
    fn test_percentage_change() {
        assert_eq!(percentage_change(100.0, 150.0), 50.0);
        assert_eq!(percentage_change(150.0, 100.0), -33.3);
        assert_eq!(percentage_change(40.0, 40.0), 0.0);
    }

    #[test]
    fn test_percentage_change_zero_baseline_rule() {
        assert_eq!(percentage_change(0.0, 25.0), 100.0);
        assert_eq!(percentage_change(0.0, 0.0), 0.0);
        assert_eq!(percentage_change(0.0, -5.0), 0.0);
    }
}
