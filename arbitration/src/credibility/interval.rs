//! Wilson score confidence intervals.
//!
//! All credibility bounds use the Wilson score interval; there is no second
//! formula anywhere in the crate.

use serde::{Deserialize, Serialize};

/// Two-sided z value for 95% confidence.
pub const Z_95: f64 = 1.959_963_984_540_054;

/// A bound on a credibility score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    /// Sample size the interval was computed from.
    pub sample_size: usize,
}

impl ConfidenceInterval {
    /// The uninformative interval used when there is no data at all.
    pub fn unbounded() -> Self {
        Self {
            lower: 0.0,
            upper: 1.0,
            sample_size: 0,
        }
    }

    /// Wilson score interval for proportion `p` over `n` samples.
    pub fn wilson(p: f64, n: usize, z: f64) -> Self {
        if n == 0 || !p.is_finite() {
            return Self::unbounded();
        }
        let p = p.clamp(0.0, 1.0);
        let n_f = n as f64;
        let z2 = z * z;
        let denom = 1.0 + z2 / n_f;
        let center = (p + z2 / (2.0 * n_f)) / denom;
        let half = z * (p * (1.0 - p) / n_f + z2 / (4.0 * n_f * n_f)).sqrt() / denom;
        Self {
            lower: (center - half).clamp(0.0, 1.0),
            upper: (center + half).clamp(0.0, 1.0),
            sample_size: n,
        }
    }

    /// Wilson interval at 95% confidence.
    pub fn wilson_95(p: f64, n: usize) -> Self {
        Self::wilson(p, n, Z_95)
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Half the width; this is the "CI" that debate thresholds add up.
    pub fn half_width(&self) -> f64 {
        self.width() / 2.0
    }

    pub fn midpoint(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }

    /// Scale the interval about its midpoint, clamped to [0, 1].
    pub fn widened(&self, factor: f64) -> Self {
        let factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        let mid = self.midpoint();
        let half = self.half_width() * factor;
        Self {
            lower: (mid - half).clamp(0.0, 1.0),
            upper: (mid + half).clamp(0.0, 1.0),
            sample_size: self.sample_size,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Whether the interval carries any information.
    pub fn is_informative(&self) -> bool {
        self.sample_size > 0
    }
}
