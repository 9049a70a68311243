//! Credibility scoring scenarios against a real store.
//!
//! Tests verify:
//! - An improving accuracy series lifts the score above its plain average
//! - A 45% override rate takes the severe penalty, not the mild one
//! - More evidence never widens the interval
//! - Regime changes are versioned and never alter in-flight queries
//! - Snapshots sharing a version but not a label never share a cached score

use std::sync::Arc;

use arbitration::credibility::{OverrideScope, TrendAnalyzer, TrendConfig};
use arbitration::regime::{MarketDirection, RateTrend, Volatility};
use arbitration::{
    ContextVector, CredibilityAggregator, CredibilityConfig, CredibilityQuery,
    CredibilityService, CredibilityStore, OutcomeRecord, OverrideReason, OverrideRecord,
    RecommendationRecord, RegimeIndicators, RegimeLabel, RegimeRegistry, RegimeSnapshot,
};
use chrono::{DateTime, Duration, Utc};

fn ctx() -> ContextVector {
    ContextVector::new("retail", "margin", "12m", "mid_cap", "mature", "business")
}

fn query(agent: &str, as_of: DateTime<Utc>) -> CredibilityQuery {
    let regime = Arc::new(RegimeSnapshot::fixed(1, RegimeLabel::Normal, as_of));
    CredibilityQuery::new(agent, ctx(), regime, as_of)
}

// ── Scenario: improving agent ──────────────────────────────────────

#[test]
fn test_improving_series_beats_plain_average() {
    let series = [0.65, 0.72, 0.81, 0.87, 0.89];
    let average = series.iter().sum::<f64>() / series.len() as f64;

    let trend = TrendAnalyzer::default().analyze_series(&series);
    assert!(trend.applied);
    assert!(trend.r_squared > 0.5);
    assert!(trend.adjusted - average >= 0.05);
}

#[test]
fn test_improving_agent_scores_above_its_average() {
    let now = Utc::now();
    let series = [0.65, 0.72, 0.81, 0.87, 0.89];
    let average = series.iter().sum::<f64>() / series.len() as f64;

    let store = CredibilityStore::new();
    // One outcome per yearly period, oldest first.
    for (i, accuracy) in series.iter().enumerate() {
        let years_ago = (series.len() - 1 - i) as i64;
        store.append_outcome(OutcomeRecord::with_accuracy(
            "improver",
            ctx(),
            *accuracy,
            now - Duration::days(365 * years_ago),
            RegimeLabel::Normal,
        ));
    }

    let config = CredibilityConfig {
        trend: TrendConfig {
            period_days: 365,
            window_periods: 5,
            ..TrendConfig::default()
        },
        ..CredibilityConfig::default()
    };
    let score =
        CredibilityAggregator::new(config).score_from_store(&store, &query("improver", now));

    assert!(score.breakdown.trend.applied);
    assert!(score.value - average >= 0.05);
}

// ── Scenario: override penalty band edge ───────────────────────────

#[test]
fn test_forty_five_percent_override_rate_takes_severe_penalty() {
    let now = Utc::now();
    let store = CredibilityStore::new();
    for i in 0..10 {
        store.append_outcome(OutcomeRecord::with_accuracy(
            "overridden",
            ctx(),
            0.8,
            now - Duration::days(20 * i),
            RegimeLabel::Normal,
        ));
    }
    for i in 0..20 {
        store.append_recommendation(RecommendationRecord {
            agent: "overridden".to_string(),
            context: ctx(),
            recommendation_id: format!("r-{}", i),
            recorded_at: now - Duration::days(5),
        });
    }
    for _ in 0..9 {
        store.append_override(OverrideRecord {
            agent: "overridden".to_string(),
            context: ctx(),
            agent_recommendation: "expand".to_string(),
            human_decision: "hold".to_string(),
            reason: OverrideReason::RiskAppetite,
            recorded_at: now - Duration::days(5),
        });
    }

    let score =
        CredibilityAggregator::default().score_from_store(&store, &query("overridden", now));
    let overrides = score.breakdown.overrides;
    assert_eq!(overrides.scope, OverrideScope::Context);
    assert!((overrides.rate - 0.45).abs() < 1e-12);
    assert_eq!(overrides.factor, 0.70);
    assert!((score.value - 0.8 * 0.70).abs() < 1e-9);
}

// ── Property: evidence narrows the interval ────────────────────────

#[test]
fn test_more_evidence_never_widens_interval() {
    let now = Utc::now();
    let store = CredibilityStore::new();
    let aggregator = CredibilityAggregator::default();
    let mut previous = f64::INFINITY;

    for batch in 0..6 {
        for i in 0..12 {
            store.append_outcome(OutcomeRecord::with_accuracy(
                "steady",
                ctx(),
                0.75,
                now - Duration::days(batch * 12 + i),
                RegimeLabel::Normal,
            ));
        }
        let score = aggregator.score_from_store(&store, &query("steady", now));
        assert!(
            score.half_width() <= previous + 1e-12,
            "interval widened after batch {}: {} > {}",
            batch,
            score.half_width(),
            previous
        );
        assert!(score.interval.contains(score.value));
        previous = score.half_width();
    }
}

#[test]
fn test_scores_stay_in_unit_interval() {
    let now = Utc::now();
    let store = CredibilityStore::new();
    for (i, accuracy) in [1.0, 1.0, 1.0, 0.0, 1.5, -0.2, f64::NAN].iter().enumerate() {
        store.append_outcome(OutcomeRecord::with_accuracy(
            "erratic",
            ctx(),
            *accuracy,
            now - Duration::days(i as i64),
            RegimeLabel::Normal,
        ));
    }
    let score = CredibilityAggregator::default().score_from_store(&store, &query("erratic", now));
    assert!((0.0..=1.0).contains(&score.value));
    assert!(score.interval.lower <= score.interval.upper);
}

// ── Regime snapshots ───────────────────────────────────────────────

#[tokio::test]
async fn test_regime_change_is_a_new_cache_key() {
    let store = CredibilityStore::new().shared();
    let regimes = RegimeRegistry::default().shared();
    let service =
        CredibilityService::new(store, regimes.clone(), CredibilityConfig::default());

    let before = service.score("nobody", &ctx()).await;
    assert_eq!(before.regime_version, 0);

    let snapshot = regimes.publish(RegimeIndicators {
        yield_change_bps: Some(50.0),
        volatility_index: Some(35.0),
        index_return: Some(-0.12),
        observed_at: None,
    });
    assert_eq!(snapshot.version, 1);
    assert!(snapshot.classified);

    let after = service.score("nobody", &ctx()).await;
    assert_eq!(after.regime_version, 1);

    // A query pinned to the old snapshot still scores under it.
    let pinned = Arc::new(RegimeSnapshot::unclassified(0, Utc::now()));
    let again = service
        .score_in_regime("nobody", &ctx(), Some(pinned))
        .await;
    assert_eq!(again.regime_version, 0);
}

fn bear() -> RegimeLabel {
    RegimeLabel::Market {
        rates: RateTrend::Rising,
        volatility: Volatility::High,
        direction: MarketDirection::Bear,
    }
}

fn regime_specialist() -> CredibilityService {
    let service = CredibilityService::new(
        CredibilityStore::new().shared(),
        RegimeRegistry::default().shared(),
        CredibilityConfig::default(),
    );
    let now = Utc::now();
    for i in 0..60 {
        let at = now - Duration::hours(i);
        service.store().append_outcome(OutcomeRecord::with_accuracy(
            "specialist",
            ctx(),
            0.9,
            at,
            RegimeLabel::Normal,
        ));
        service.store().append_outcome(OutcomeRecord::with_accuracy(
            "specialist",
            ctx(),
            0.2,
            at,
            bear(),
        ));
    }
    service
}

#[tokio::test]
async fn test_explicit_regime_with_shared_version_scores_its_own_label() {
    let service = regime_specialist();
    let now = Utc::now();
    let normal = Arc::new(RegimeSnapshot::fixed(0, RegimeLabel::Normal, now));
    let in_bear = Arc::new(RegimeSnapshot::fixed(0, bear(), now));

    let under_normal = service
        .score_in_regime("specialist", &ctx(), Some(normal))
        .await;
    let under_bear = service
        .score_in_regime("specialist", &ctx(), Some(in_bear.clone()))
        .await;

    let direct = CredibilityAggregator::default().score_from_store(
        service.store(),
        &CredibilityQuery::new("specialist", ctx(), in_bear, Utc::now()),
    );
    assert!(under_normal.value > under_bear.value);
    assert_eq!(under_bear.breakdown.regime.label, bear());
    assert!((under_bear.value - direct.value).abs() < 1e-6);
    assert_eq!(service.cached_scores(), 2);
}

#[tokio::test]
async fn test_unclassified_snapshot_with_shared_version_is_not_served_classified_score() {
    let service = regime_specialist();
    let now = Utc::now();
    let classified = Arc::new(RegimeSnapshot::fixed(0, RegimeLabel::Normal, now));
    let fallback = Arc::new(RegimeSnapshot::unclassified(0, now));

    let full = service
        .score_in_regime("specialist", &ctx(), Some(classified))
        .await;
    let reduced = service
        .score_in_regime("specialist", &ctx(), Some(fallback))
        .await;

    assert!(full.breakdown.regime.classified);
    assert!(!reduced.breakdown.regime.classified);
    assert!(reduced.breakdown.regime.weight < full.breakdown.regime.weight);
}
