//! Trend direction of a chronological series via least-squares regression.
//!
//! The slope is fitted against the sample index, not wall-clock time, then
//! scaled by the series mean so the fixed ±[`SLOPE_TOLERANCE`] band means
//! "10% of the typical value per sample" whatever the unit. This is a known
//! approximation: there is no significance test, so long noisy series can
//! still be classified as moving.

use serde::{Deserialize, Serialize};

/// Relative slopes inside `[-SLOPE_TOLERANCE, SLOPE_TOLERANCE]` are flat.
pub const SLOPE_TOLERANCE: f64 = 0.1;

/// Qualitative direction of a series where lower values are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    #[default]
    Stable,
    Degrading,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Degrading => "degrading",
        };
        f.write_str(s)
    }
}

/// OLS slope of `series[i]` against `i`:
/// `(n·Σxy − Σx·Σy) / (n·Σx² − (Σx)²)`. `None` with fewer than two points.
pub fn regression_slope(series: &[f64]) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }

    let n = series.len() as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;
    for (i, &y) in series.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    // Non-zero for n >= 2 because the x values are distinct.
    let denominator = n * sum_x2 - sum_x * sum_x;
    Some((n * sum_xy - sum_x * sum_y) / denominator)
}

/// Regression slope divided by the magnitude of the series mean.
/// A zero-mean series keeps its raw slope.
pub fn relative_slope(series: &[f64]) -> Option<f64> {
    let slope = regression_slope(series)?;
    let mean = series.iter().sum::<f64>() / series.len() as f64;
    if mean.abs() > f64::EPSILON {
        Some(slope / mean.abs())
    } else {
        Some(slope)
    }
}

/// Classify a lower-is-better series (durations, error rates).
pub fn classify_trend(series: &[f64]) -> Trend {
    match relative_slope(series) {
        Some(slope) if slope < -SLOPE_TOLERANCE => Trend::Improving,
        Some(slope) if slope > SLOPE_TOLERANCE => Trend::Degrading,
        _ => Trend::Stable,
    }
}
