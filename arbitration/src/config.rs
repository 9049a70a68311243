//! Top-level configuration.
//!
//! Every section has defaults, so a TOML file only needs the keys it
//! changes. Environment variables override the file:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ARBITER_DEFAULT_HALF_LIFE_YEARS` | `credibility.default_half_life_years` |
//! | `ARBITER_SCORE_BUDGET_MS` | `credibility.score_budget_ms` |
//! | `ARBITER_REVIEWER_CAPACITY` | `router.default_capacity` |
//! | `ARBITER_MIN_PRECEDENTS` | `debate.min_precedents` |

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::credibility::CredibilityConfig;
use crate::debate::DebateConfig;
use crate::impact::ImpactConfig;
use crate::regime::RegimeConfig;
use crate::router::RouterConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    pub credibility: CredibilityConfig,
    pub debate: DebateConfig,
    pub router: RouterConfig,
    pub impact: ImpactConfig,
    pub regime: RegimeConfig,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn check_fraction(field: &'static str, value: f64) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, format!("{} is outside [0, 1]", value)))
    }
}

impl ArbitrationConfig {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a TOML file, apply `ARBITER_*` overrides and validate.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are ignored
    /// with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(key, value = %raw, "Ignoring unparseable override");
                    None
                }
            }
        }

        const HALF_LIFE: &str = "ARBITER_DEFAULT_HALF_LIFE_YEARS";
        const BUDGET: &str = "ARBITER_SCORE_BUDGET_MS";
        const CAPACITY: &str = "ARBITER_REVIEWER_CAPACITY";
        const PRECEDENTS: &str = "ARBITER_MIN_PRECEDENTS";

        if let Some(years) = parsed(HALF_LIFE, lookup(HALF_LIFE)) {
            self.credibility.default_half_life_years = years;
        }
        if let Some(ms) = parsed(BUDGET, lookup(BUDGET)) {
            self.credibility.score_budget_ms = ms;
        }
        if let Some(capacity) = parsed(CAPACITY, lookup(CAPACITY)) {
            self.router.default_capacity = capacity;
        }
        if let Some(count) = parsed(PRECEDENTS, lookup(PRECEDENTS)) {
            self.debate.min_precedents = count;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let credibility = &self.credibility;
        if !is_positive(credibility.default_half_life_years) {
            return Err(invalid(
                "credibility.default_half_life_years",
                "half-life must be positive",
            ));
        }
        if let Some((domain, years)) = credibility
            .domain_half_lives
            .iter()
            .find(|(_, years)| !is_positive(**years))
        {
            return Err(invalid(
                "credibility.domain_half_lives",
                format!("half-life for {} is {}", domain, years),
            ));
        }
        check_fraction("credibility.regime_weight", credibility.regime_weight)?;
        check_fraction(
            "credibility.sparse_regime_weight",
            credibility.sparse_regime_weight,
        )?;
        check_fraction(
            "credibility.unclassified_regime_scale",
            credibility.unclassified_regime_scale,
        )?;
        check_fraction("credibility.neutral_prior", credibility.neutral_prior)?;
        check_fraction(
            "credibility.trend.min_r_squared",
            credibility.trend.min_r_squared,
        )?;
        check_fraction(
            "credibility.overrides.mild_threshold",
            credibility.overrides.mild_threshold,
        )?;
        check_fraction(
            "credibility.overrides.severe_threshold",
            credibility.overrides.severe_threshold,
        )?;
        if credibility.overrides.mild_threshold > credibility.overrides.severe_threshold {
            return Err(invalid(
                "credibility.overrides",
                "mild threshold is above severe threshold",
            ));
        }
        if credibility.fallback_widening < 1.0 {
            return Err(invalid(
                "credibility.fallback_widening",
                "widening factor below 1 would narrow the interval",
            ));
        }
        if credibility.trend.period_days == 0 {
            return Err(invalid("credibility.trend.period_days", "must be at least 1"));
        }

        check_fraction("debate.min_differential", self.debate.min_differential)?;
        check_fraction(
            "debate.min_credibility_spread",
            self.debate.min_credibility_spread,
        )?;
        if self.debate.negotiation_minutes == 0 || self.debate.mediation_minutes == 0 {
            return Err(invalid("debate", "level timeouts must be non-zero"));
        }

        if self.router.default_capacity == 0 {
            return Err(invalid("router.default_capacity", "must be at least 1"));
        }
        if let Some(reviewer) = self.router.reviewers.iter().find(|r| r.capacity == Some(0)) {
            return Err(invalid(
                "router.reviewers",
                format!("reviewer {} has zero capacity", reviewer.id),
            ));
        }

        check_fraction("impact.score_threshold", self.impact.score_threshold)?;
        if self.impact.price_target_threshold < 0.0 || self.impact.computation_threshold < 0.0 {
            return Err(invalid("impact", "thresholds must be non-negative"));
        }
        Ok(())
    }
}
