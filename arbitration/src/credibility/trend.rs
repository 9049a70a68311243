//! Trend analysis over a rolling window of per-period accuracy.
//!
//! Outcome records are bucketed into fixed-length periods counted back from
//! the scoring time. A least-squares line is fit through the per-period
//! means; when the fit explains enough variance (R² above the threshold) the
//! trend-adjusted accuracy blends the latest period with a short
//! extrapolation of the line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::records::OutcomeRecord;

/// Trend analyzer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Number of periods in the rolling window.
    pub window_periods: u32,
    /// Length of one period in days.
    pub period_days: u32,
    /// Minimum R² before the trend is trusted.
    pub min_r_squared: f64,
    /// How many periods ahead to extrapolate.
    pub horizon_periods: u32,
    /// Weight of current accuracy in the blend (the rest goes to the
    /// extrapolation).
    pub current_weight: f64,
    /// Minimum non-empty periods needed for a fit.
    pub min_points: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_periods: 52,
            period_days: 30,
            min_r_squared: 0.3,
            horizon_periods: 6,
            current_weight: 0.7,
            min_points: 3,
        }
    }
}

/// Ordinary least-squares fit `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    pub r_squared: f64,
    pub mean_y: f64,
}

impl LinearFit {
    /// Fit a line through `(x, y)` points. `None` with fewer than two
    /// distinct x values.
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
        let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
        if sxx <= f64::EPSILON {
            return None;
        }
        let sxy: f64 = points
            .iter()
            .map(|(x, y)| (x - mean_x) * (y - mean_y))
            .sum();
        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let ss_tot: f64 = points.iter().map(|(_, y)| (y - mean_y).powi(2)).sum();
        let ss_res: f64 = points
            .iter()
            .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
            .sum();
        // A flat series has no trend to explain.
        let r_squared = if ss_tot < 1e-12 {
            0.0
        } else {
            (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
        };

        Some(Self {
            intercept,
            slope,
            r_squared,
            mean_y,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Result of the trend stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendOutcome {
    /// Whether the trend adjustment was applied.
    pub applied: bool,
    pub r_squared: f64,
    /// Accuracy change per period.
    pub slope: f64,
    /// Accuracy of the latest period.
    pub current: f64,
    /// Extrapolated accuracy `horizon` periods ahead, clamped to [0, 1].
    pub extrapolated: f64,
    /// Trend-adjusted accuracy (equals `current` when not applied).
    pub adjusted: f64,
    /// Unweighted mean of the per-period accuracies.
    pub window_mean: f64,
    /// Multiplier handed to the aggregator (`adjusted / window_mean`).
    pub factor: f64,
    /// Non-empty periods in the window.
    pub points: usize,
    /// Records inside the window.
    pub sample_size: usize,
}

impl TrendOutcome {
    fn not_applied(points: usize, sample_size: usize, current: f64, window_mean: f64) -> Self {
        Self {
            applied: false,
            r_squared: 0.0,
            slope: 0.0,
            current,
            extrapolated: current,
            adjusted: current,
            window_mean,
            factor: 1.0,
            points,
            sample_size,
        }
    }
}

/// Fits and applies accuracy trends.
#[derive(Debug, Clone, Default)]
pub struct TrendAnalyzer {
    config: TrendConfig,
}

impl TrendAnalyzer {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Analyze a per-period accuracy series, oldest first.
    pub fn analyze_series(&self, series: &[f64]) -> TrendOutcome {
        let window = self.config.window_periods.max(1) as usize;
        let start = series.len().saturating_sub(window);
        let points: Vec<(f64, f64)> = series[start..]
            .iter()
            .enumerate()
            .map(|(i, y)| (i as f64, *y))
            .collect();
        self.analyze_points(&points, points.len())
    }

    /// Bucket records into periods counted back from `as_of` and analyze.
    pub fn analyze_records(
        &self,
        records: &[&OutcomeRecord],
        as_of: DateTime<Utc>,
    ) -> TrendOutcome {
        let period_seconds = i64::from(self.config.period_days.max(1)) * 86_400;
        let window = i64::from(self.config.window_periods.max(1));

        let mut buckets: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
        for record in records {
            let age = (as_of - record.recorded_at).num_seconds().max(0);
            let period = age / period_seconds;
            if period < window {
                let entry = buckets.entry(period).or_insert((0.0, 0));
                entry.0 += record.accuracy;
                entry.1 += 1;
            }
        }

        let sample_size = buckets.values().map(|(_, n)| n).sum();
        // Most recent period gets the largest x.
        let mut points: Vec<(f64, f64)> = buckets
            .iter()
            .map(|(period, (sum, n))| (-(*period as f64), sum / *n as f64))
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.analyze_points(&points, sample_size)
    }

    fn analyze_points(&self, points: &[(f64, f64)], sample_size: usize) -> TrendOutcome {
        let Some(&(latest_x, current)) = points.last() else {
            return TrendOutcome::not_applied(0, 0, 0.0, 0.0);
        };
        let window_mean = points.iter().map(|(_, y)| y).sum::<f64>() / points.len() as f64;

        if points.len() < self.config.min_points.max(2) {
            return TrendOutcome::not_applied(points.len(), sample_size, current, window_mean);
        }
        let Some(fit) = LinearFit::fit(points) else {
            return TrendOutcome::not_applied(points.len(), sample_size, current, window_mean);
        };
        if fit.r_squared <= self.config.min_r_squared {
            let mut outcome =
                TrendOutcome::not_applied(points.len(), sample_size, current, window_mean);
            outcome.r_squared = fit.r_squared;
            outcome.slope = fit.slope;
            return outcome;
        }

        let extrapolated = fit
            .predict(latest_x + f64::from(self.config.horizon_periods))
            .clamp(0.0, 1.0);
        let w = self.config.current_weight.clamp(0.0, 1.0);
        let adjusted = (w * current + (1.0 - w) * extrapolated).clamp(0.0, 1.0);
        let factor = if window_mean > f64::EPSILON {
            adjusted / window_mean
        } else {
            1.0
        };

        TrendOutcome {
            applied: true,
            r_squared: fit.r_squared,
            slope: fit.slope,
            current,
            extrapolated,
            adjusted,
            window_mean,
            factor,
            points: points.len(),
            sample_size,
        }
    }
}
