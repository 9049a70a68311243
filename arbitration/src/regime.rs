//! Market regime classification and versioned regime snapshots.
//!
//! The classifier maps an indicator snapshot (rate trend, volatility, market
//! direction) to a discrete [`RegimeLabel`]. Every classification run
//! produces a brand new [`RegimeSnapshot`] with a higher version; snapshots
//! are never mutated, and consumers hold an `Arc` to the one they read.
//!
//! ```text
//! indicators ──► RegimeClassifier ──► RegimeSnapshot{v+1} ──► watch channel
//!                                                              │
//!                    aggregator calls receive Arc<RegimeSnapshot> explicitly
//! ```
//!
//! Missing indicators never block scoring: the label falls back to
//! [`RegimeLabel::Normal`] with `classified = false`, which halves the weight
//! of the regime adjustment.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::events::{ArbitrationEvent, SharedEventBus};

/// Direction of the rate environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateTrend {
    Rising,
    Stable,
    Falling,
}

/// Volatility level of the broad market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    Low,
    Moderate,
    High,
}

/// Direction of the broad market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketDirection {
    Bull,
    Sideways,
    Bear,
}

impl std::fmt::Display for RateTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rising => write!(f, "rising"),
            Self::Stable => write!(f, "stable"),
            Self::Falling => write!(f, "falling"),
        }
    }
}

impl std::fmt::Display for Volatility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Moderate => write!(f, "moderate"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::fmt::Display for MarketDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bull => write!(f, "bull"),
            Self::Sideways => write!(f, "sideways"),
            Self::Bear => write!(f, "bear"),
        }
    }
}

/// Discrete label for current market conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeLabel {
    /// Neutral conditions, or the fallback when indicators are missing.
    Normal,
    /// A rate/volatility/direction combination.
    Market {
        rates: RateTrend,
        volatility: Volatility,
        direction: MarketDirection,
    },
}

impl Default for RegimeLabel {
    fn default() -> Self {
        Self::Normal
    }
}

impl std::fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Market {
                rates,
                volatility,
                direction,
            } => write!(f, "{}_rates/{}_vol/{}", rates, volatility, direction),
        }
    }
}

/// Raw indicator values delivered by the market-data collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegimeIndicators {
    /// Change in the 10-year yield over the lookback, in basis points.
    pub yield_change_bps: Option<f64>,
    /// Implied volatility index level (VIX-like).
    pub volatility_index: Option<f64>,
    /// Broad index return over the lookback, as a fraction.
    pub index_return: Option<f64>,
    /// When the indicators were observed.
    pub observed_at: Option<DateTime<Utc>>,
}

/// Classifier thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Yield change (bps) at or above which rates are rising.
    pub rising_rates_bps: f64,
    /// Yield change (bps) at or below which rates are falling.
    pub falling_rates_bps: f64,
    /// Volatility index at or above which volatility is high.
    pub high_volatility: f64,
    /// Volatility index at or below which volatility is low.
    pub low_volatility: f64,
    /// Index return at or above which the market is a bull market.
    pub bull_return: f64,
    /// Index return at or below which the market is a bear market.
    pub bear_return: f64,
    /// How long a snapshot stays valid without a new classification run.
    pub validity_hours: i64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            rising_rates_bps: 25.0,
            falling_rates_bps: -25.0,
            high_volatility: 25.0,
            low_volatility: 15.0,
            bull_return: 0.05,
            bear_return: -0.05,
            validity_hours: 36,
        }
    }
}

/// Immutable, versioned regime classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    /// Monotonic version; bumped on every classification run.
    pub version: u64,
    pub label: RegimeLabel,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// Indicators the label was derived from.
    pub indicators: RegimeIndicators,
    /// False when the label is the `Normal` fallback for missing data.
    pub classified: bool,
}

impl RegimeSnapshot {
    /// Unclassified `Normal` snapshot, used before the first classification.
    pub fn unclassified(version: u64, at: DateTime<Utc>) -> Self {
        Self {
            version,
            label: RegimeLabel::Normal,
            valid_from: at,
            valid_until: at,
            indicators: RegimeIndicators::default(),
            classified: false,
        }
    }

    /// A classified snapshot with a fixed label, valid for a year. Handy for
    /// callers that pin a regime explicitly.
    pub fn fixed(version: u64, label: RegimeLabel, at: DateTime<Utc>) -> Self {
        Self {
            version,
            label,
            valid_from: at,
            valid_until: at + Duration::days(365),
            indicators: RegimeIndicators::default(),
            classified: true,
        }
    }

    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        at > self.valid_until
    }

    /// Scale applied to the regime blend weight at `at`.
    pub fn weight_scale(&self, at: DateTime<Utc>, unclassified_scale: f64) -> f64 {
        if self.classified && !self.is_expired(at) {
            1.0
        } else {
            unclassified_scale
        }
    }
}

/// Maps indicator snapshots to regime labels.
#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Classify indicators. Returns `(label, classified)`.
    pub fn classify(&self, indicators: &RegimeIndicators) -> (RegimeLabel, bool) {
        let (Some(bps), Some(vol), Some(ret)) = (
            indicators.yield_change_bps,
            indicators.volatility_index,
            indicators.index_return,
        ) else {
            return (RegimeLabel::Normal, false);
        };
        if !(bps.is_finite() && vol.is_finite() && ret.is_finite()) {
            return (RegimeLabel::Normal, false);
        }

        let c = &self.config;
        let rates = if bps >= c.rising_rates_bps {
            RateTrend::Rising
        } else if bps <= c.falling_rates_bps {
            RateTrend::Falling
        } else {
            RateTrend::Stable
        };
        let volatility = if vol >= c.high_volatility {
            Volatility::High
        } else if vol <= c.low_volatility {
            Volatility::Low
        } else {
            Volatility::Moderate
        };
        let direction = if ret >= c.bull_return {
            MarketDirection::Bull
        } else if ret <= c.bear_return {
            MarketDirection::Bear
        } else {
            MarketDirection::Sideways
        };

        if rates == RateTrend::Stable
            && volatility == Volatility::Moderate
            && direction == MarketDirection::Sideways
        {
            return (RegimeLabel::Normal, true);
        }

        (
            RegimeLabel::Market {
                rates,
                volatility,
                direction,
            },
            true,
        )
    }
}

/// Shared reference to a RegimeRegistry
pub type SharedRegimeRegistry = Arc<RegimeRegistry>;

/// Holds the current regime snapshot and publishes replacements.
pub struct RegimeRegistry {
    classifier: RegimeClassifier,
    sender: watch::Sender<Arc<RegimeSnapshot>>,
    events: Option<SharedEventBus>,
}

impl RegimeRegistry {
    pub fn new(classifier: RegimeClassifier) -> Self {
        let (sender, _) = watch::channel(Arc::new(RegimeSnapshot::unclassified(0, Utc::now())));
        Self {
            classifier,
            sender,
            events: None,
        }
    }

    /// Publish regime changes on the given bus.
    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn shared(self) -> SharedRegimeRegistry {
        Arc::new(self)
    }

    /// The snapshot in force right now.
    pub fn current(&self) -> Arc<RegimeSnapshot> {
        self.sender.borrow().clone()
    }

    /// Receive every future snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RegimeSnapshot>> {
        self.sender.subscribe()
    }

    /// Classify a fresh indicator snapshot and replace the current regime.
    pub fn publish(&self, indicators: RegimeIndicators) -> Arc<RegimeSnapshot> {
        let (label, classified) = self.classifier.classify(&indicators);
        let at = indicators.observed_at.unwrap_or_else(Utc::now);
        let validity = Duration::hours(self.classifier.config().validity_hours);

        let mut published = None;
        self.sender.send_modify(|current| {
            let next = Arc::new(RegimeSnapshot {
                version: current.version + 1,
                label,
                valid_from: at,
                valid_until: at + validity,
                indicators: indicators.clone(),
                classified,
            });
            published = Some(next.clone());
            *current = next;
        });
        let snapshot = published.unwrap_or_else(|| self.current());

        if classified {
            info!(version = snapshot.version, label = %snapshot.label, "Regime classified");
        } else {
            debug!(
                version = snapshot.version,
                "Regime indicators incomplete, defaulting to normal"
            );
        }

        if let Some(bus) = &self.events {
            bus.publish(ArbitrationEvent::RegimeChanged {
                version: snapshot.version,
                label: snapshot.label,
                classified: snapshot.classified,
                timestamp: Utc::now(),
            });
        }

        snapshot
    }
}

impl Default for RegimeRegistry {
    fn default() -> Self {
        Self::new(RegimeClassifier::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicators(bps: f64, vol: f64, ret: f64) -> RegimeIndicators {
        RegimeIndicators {
            yield_change_bps: Some(bps),
            volatility_index: Some(vol),
            index_return: Some(ret),
            observed_at: None,
        }
    }

    #[test]
    fn test_classify_bear_high_vol() {
        let classifier = RegimeClassifier::default();
        let (label, classified) = classifier.classify(&indicators(60.0, 32.0, -0.12));
        assert!(classified);
        assert_eq!(
            label,
            RegimeLabel::Market {
                rates: RateTrend::Rising,
                volatility: Volatility::High,
                direction: MarketDirection::Bear,
            }
        );
    }

    #[test]
    fn test_classify_neutral_is_normal() {
        let classifier = RegimeClassifier::default();
        let (label, classified) = classifier.classify(&indicators(5.0, 19.0, 0.01));
        assert!(classified);
        assert_eq!(label, RegimeLabel::Normal);
    }

    #[test]
    fn test_missing_indicator_defaults_to_unclassified_normal() {
        let classifier = RegimeClassifier::default();
        let mut partial = indicators(5.0, 19.0, 0.01);
        partial.volatility_index = None;
        assert_eq!(classifier.classify(&partial), (RegimeLabel::Normal, false));

        let nan = indicators(f64::NAN, 19.0, 0.01);
        assert_eq!(classifier.classify(&nan), (RegimeLabel::Normal, false));
    }

    #[test]
    fn test_registry_versions_increase() {
        let registry = RegimeRegistry::default();
        assert_eq!(registry.current().version, 0);
        assert!(!registry.current().classified);

        let first = registry.publish(indicators(60.0, 32.0, -0.12));
        let second = registry.publish(indicators(0.0, 18.0, 0.0));
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(registry.current().version, 2);
        // Earlier snapshot is untouched
        assert_ne!(first.label, second.label);
    }

    #[tokio::test]
    async fn test_registry_notifies_subscribers() {
        let registry = RegimeRegistry::default();
        let mut rx = registry.subscribe();
        registry.publish(indicators(-40.0, 12.0, 0.08));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().version, 1);
    }

    #[test]
    fn test_publish_reports_regime_change_on_bus() {
        let bus = crate::events::EventBus::new().shared();
        let registry = RegimeRegistry::default().with_events(bus.clone());
        registry.publish(indicators(60.0, 32.0, -0.12));

        let events = bus.recent(10);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ArbitrationEvent::RegimeChanged {
                version: 1,
                classified: true,
                ..
            }
        ));
    }

    #[test]
    fn test_label_display() {
        let label = RegimeLabel::Market {
            rates: RateTrend::Falling,
            volatility: Volatility::Low,
            direction: MarketDirection::Bull,
        };
        assert_eq!(label.to_string(), "falling_rates/low_vol/bull");
        assert_eq!(RegimeLabel::Normal.to_string(), "normal");
    }

    #[test]
    fn test_weight_scale() {
        let now = Utc::now();
        let fixed = RegimeSnapshot::fixed(1, RegimeLabel::Normal, now);
        assert_eq!(fixed.weight_scale(now, 0.5), 1.0);
        assert_eq!(fixed.weight_scale(now + Duration::days(400), 0.5), 0.5);

        let unclassified = RegimeSnapshot::unclassified(0, now);
        assert_eq!(unclassified.weight_scale(now, 0.5), 0.5);
    }
}
