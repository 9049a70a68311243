//! Temporal decay of outcome weights.
//!
//! A record's weight halves every `half_life` years. Fast-moving analysis
//! domains get a short half-life, stable ones a long one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// Computes exponential decay weights per analysis domain.
#[derive(Debug, Clone)]
pub struct DecayCalculator {
    default_half_life_years: f64,
    domain_half_lives: HashMap<String, f64>,
}

impl DecayCalculator {
    pub fn new(default_half_life_years: f64, domain_half_lives: HashMap<String, f64>) -> Self {
        let domain_half_lives = domain_half_lives
            .into_iter()
            .map(|(domain, years)| (domain.to_ascii_lowercase(), years))
            .collect();
        Self {
            default_half_life_years,
            domain_half_lives,
        }
    }

    /// Half-life in years for an analysis domain.
    pub fn half_life(&self, domain: &str) -> f64 {
        let years = self
            .domain_half_lives
            .get(&domain.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_half_life_years);
        if years.is_finite() && years > 0.0 {
            years
        } else {
            self.default_half_life_years.max(f64::EPSILON)
        }
    }

    /// `0.5^(age / half_life)`.
    pub fn weight(&self, age_years: f64, domain: &str) -> f64 {
        0.5_f64.powf(age_years.max(0.0) / self.half_life(domain))
    }

    /// Weight of a record made at `recorded_at`, evaluated at `as_of`.
    pub fn weight_at(&self, recorded_at: DateTime<Utc>, as_of: DateTime<Utc>, domain: &str) -> f64 {
        self.weight(age_years(recorded_at, as_of), domain)
    }
}

impl Default for DecayCalculator {
    fn default() -> Self {
        Self::new(2.0, HashMap::new())
    }
}

/// Age in fractional years. Records from the future have age zero.
pub fn age_years(recorded_at: DateTime<Utc>, as_of: DateTime<Utc>) -> f64 {
    let seconds = (as_of - recorded_at).num_seconds().max(0) as f64;
    seconds / SECONDS_PER_YEAR
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_half_life_halves_weight() {
        let decay = DecayCalculator::default();
        assert!((decay.weight(0.0, "any") - 1.0).abs() < 1e-12);
        assert!((decay.weight(2.0, "any") - 0.5).abs() < 1e-12);
        assert!((decay.weight(4.0, "any") - 0.25).abs() < 1e-12);
        assert!((decay.weight(1.0, "any") - 0.5_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_domain_specific_half_life() {
        let mut domains = HashMap::new();
        domains.insert("Momentum".to_string(), 0.5);
        domains.insert("governance".to_string(), 3.0);
        let decay = DecayCalculator::new(2.0, domains);
        assert_eq!(decay.half_life("momentum"), 0.5);
        assert_eq!(decay.half_life("governance"), 3.0);
        assert_eq!(decay.half_life("valuation"), 2.0);
        assert!((decay.weight(0.5, "momentum") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_half_life_falls_back() {
        let mut domains = HashMap::new();
        domains.insert("broken".to_string(), 0.0);
        let decay = DecayCalculator::new(2.0, domains);
        assert_eq!(decay.half_life("broken"), 2.0);
    }

    #[test]
    fn test_future_records_have_full_weight() {
        let decay = DecayCalculator::default();
        let now = Utc::now();
        assert_eq!(decay.weight_at(now + Duration::days(10), now, "x"), 1.0);
    }

    #[test]
    fn test_age_years() {
        let now = Utc::now();
        let age = age_years(now - Duration::days(730), now);
        assert!((age - 730.0 / 365.25).abs() < 1e-9);
    }
}
