//! Assumption changes and the sensitivity of one computation to another.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a change in an upstream value moves a downstream output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Sensitivity {
    /// `delta_out = coefficient × delta_in`
    Linear { coefficient: f64 },
    /// Linear, but the output move is capped at `±cap`.
    Saturating { coefficient: f64, cap: f64 },
}

impl Sensitivity {
    pub fn linear(coefficient: f64) -> Self {
        Self::Linear { coefficient }
    }

    pub fn apply(&self, delta: f64) -> f64 {
        match *self {
            Self::Linear { coefficient } => coefficient * delta,
            Self::Saturating { coefficient, cap } => {
                let cap = cap.abs();
                (coefficient * delta).clamp(-cap, cap)
            }
        }
    }

    /// Coefficients that cannot produce a meaningful estimate.
    pub fn is_usable(&self) -> bool {
        match *self {
            Self::Linear { coefficient } => coefficient.is_finite(),
            Self::Saturating { coefficient, cap } => coefficient.is_finite() && cap.is_finite(),
        }
    }
}

/// A configured sensitivity for one dependency edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityRule {
    pub from: String,
    pub to: String,
    pub sensitivity: Sensitivity,
}

/// Configured sensitivities keyed by `(upstream, downstream)`. These take
/// precedence over coefficients stored on the graph edges.
#[derive(Debug, Clone, Default)]
pub struct SensitivityRegistry {
    rules: HashMap<(String, String), Sensitivity>,
}

impl SensitivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: &[SensitivityRule]) -> Self {
        let mut registry = Self::new();
        for rule in rules {
            registry.set(&rule.from, &rule.to, rule.sensitivity);
        }
        registry
    }

    pub fn set(&mut self, from: &str, to: &str, sensitivity: Sensitivity) {
        self.rules
            .insert((from.to_string(), to.to_string()), sensitivity);
    }

    pub fn get(&self, from: &str, to: &str) -> Option<Sensitivity> {
        self.rules
            .get(&(from.to_string(), to.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Old or new value of an assumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssumptionValue {
    Numeric(f64),
    Categorical(String),
}

/// A changed assumption, the input to an impact analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionChange {
    /// Graph node id of the assumption.
    pub assumption: String,
    pub old: AssumptionValue,
    pub new: AssumptionValue,
}

impl AssumptionChange {
    pub fn numeric(assumption: impl Into<String>, old: f64, new: f64) -> Self {
        Self {
            assumption: assumption.into(),
            old: AssumptionValue::Numeric(old),
            new: AssumptionValue::Numeric(new),
        }
    }

    pub fn categorical(
        assumption: impl Into<String>,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        Self {
            assumption: assumption.into(),
            old: AssumptionValue::Categorical(old.into()),
            new: AssumptionValue::Categorical(new.into()),
        }
    }

    /// `(new − old) / |old|` for numeric changes with a non-zero old value.
    pub fn relative_change(&self) -> Option<f64> {
        match (&self.old, &self.new) {
            (AssumptionValue::Numeric(old), AssumptionValue::Numeric(new))
                if old.is_finite() && new.is_finite() && old.abs() > f64::EPSILON =>
            {
                Some((new - old) / old.abs())
            }
            _ => None,
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(
            (&self.old, &self.new),
            (AssumptionValue::Categorical(_), _) | (_, AssumptionValue::Categorical(_))
        )
    }

    /// Whether old and new actually differ.
    pub fn is_change(&self) -> bool {
        self.old != self.new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturating_caps_both_directions() {
        let s = Sensitivity::Saturating {
            coefficient: 2.0,
            cap: 0.3,
        };
        assert!((s.apply(0.1) - 0.2).abs() < 1e-12);
        assert_eq!(s.apply(0.5), 0.3);
        assert_eq!(s.apply(-0.5), -0.3);
    }

    #[test]
    fn test_relative_change() {
        let change = AssumptionChange::numeric("growth", 0.10, 0.12);
        assert!((change.relative_change().unwrap() - 0.2).abs() < 1e-9);
        assert!(AssumptionChange::numeric("x", 0.0, 1.0)
            .relative_change()
            .is_none());
        let rating = AssumptionChange::categorical("outlook", "stable", "negative");
        assert!(rating.relative_change().is_none());
        assert!(rating.is_categorical());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = SensitivityRegistry::from_rules(&[SensitivityRule {
            from: "growth".to_string(),
            to: "dcf".to_string(),
            sensitivity: Sensitivity::linear(0.6),
        }]);
        assert_eq!(registry.get("growth", "dcf"), Some(Sensitivity::linear(0.6)));
        assert!(registry.get("dcf", "growth").is_none());
    }

    #[test]
    fn test_untagged_values_deserialize() {
        let change: AssumptionChange = serde_json::from_str(
            r#"{"assumption": "wacc", "old": 0.08, "new": 0.09}"#,
        )
        .unwrap();
        assert_eq!(change.old, AssumptionValue::Numeric(0.08));
        let change: AssumptionChange = serde_json::from_str(
            r#"{"assumption": "moat", "old": "wide", "new": "narrow"}"#,
        )
        .unwrap();
        assert!(change.is_categorical());
    }
}
