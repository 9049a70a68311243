//! arbiter: operator CLI for the arbitration engine.
//!
//! Every subcommand reads JSON files and prints a JSON document on stdout.
//! Logs go to stderr, filtered by `RUST_LOG`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arbitration::{
    ArbitrationConfig, AssumptionChange, ContextVector, CredibilityService, CredibilityStore,
    ImpactCalculator, LedgerImport, RegimeClassifier, RegimeIndicators, RegimeRegistry,
};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score an agent from a JSON ledger
    Score {
        /// Ledger with `outcomes`, `overrides` and `recommendations`
        #[arg(long)]
        ledger: PathBuf,

        #[arg(long)]
        agent: String,

        /// Context vector to score in
        #[arg(long)]
        context: PathBuf,

        /// Regime indicators to classify before scoring
        #[arg(long)]
        indicators: Option<PathBuf>,
    },

    /// Classify a regime indicator snapshot
    Classify {
        #[arg(long)]
        indicators: PathBuf,
    },

    /// Estimate the downstream impact of a changed assumption
    Impact {
        /// Dependency graph with `nodes` and `edges`
        #[arg(long)]
        graph: PathBuf,

        /// The assumption change (`assumption`, `old`, `new`)
        #[arg(long)]
        change: PathBuf,

        /// Attach a recompute ticket for this debate to the output
        #[arg(long)]
        debate: Option<String>,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<ArbitrationConfig> {
    match path {
        Some(path) => ArbitrationConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => {
            let mut config = ArbitrationConfig::default();
            config.apply_env_overrides();
            config.validate().context("validating default config")?;
            Ok(config)
        }
    }
}

async fn run(args: Args) -> Result<serde_json::Value> {
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Score {
            ledger,
            agent,
            context,
            indicators,
        } => {
            let import: LedgerImport = read_json(&ledger)?;
            let context: ContextVector = read_json(&context)?;

            let store = CredibilityStore::new().shared();
            let records = store.import(import);
            info!(records, "Ledger imported");

            let regimes = RegimeRegistry::new(RegimeClassifier::new(config.regime)).shared();
            if let Some(path) = indicators {
                let indicators: RegimeIndicators = read_json(&path)?;
                let snapshot = regimes.publish(indicators);
                info!(regime = %snapshot.label, "Regime classified");
            }

            let service = CredibilityService::new(store, regimes, config.credibility);
            let score = service.score(&agent, &context).await;
            Ok(serde_json::to_value(score)?)
        }

        Command::Classify { indicators } => {
            let indicators: RegimeIndicators = read_json(&indicators)?;
            let registry = RegimeRegistry::new(RegimeClassifier::new(config.regime));
            let snapshot = registry.publish(indicators);
            Ok(serde_json::to_value(snapshot.as_ref())?)
        }

        Command::Impact {
            graph,
            change,
            debate,
        } => {
            let graph = std::fs::read_to_string(&graph)
                .with_context(|| format!("reading {}", graph.display()))?;
            let calculator = ImpactCalculator::from_json(config.impact, &graph)
                .context("building dependency graph")?;
            let change: AssumptionChange = read_json(&change)?;

            let report = calculator.analyze(&change);
            info!(
                assumption = %change.assumption,
                affected = report.affected.len(),
                recompute = report.recompute_targets().len(),
                "Impact analyzed"
            );
            let ticket = report.ticket(debate.as_deref());
            Ok(serde_json::json!({ "report": report, "ticket": ticket }))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    arbitration::telemetry::init_tracing();

    let args = Args::parse();
    let output = run(args).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    const CONTEXT: &str = r#"{
        "sector": "semiconductors",
        "metric_type": "revenue_growth",
        "horizon": "12m",
        "company_size": "large_cap",
        "growth_stage": "mature",
        "domain": "financial"
    }"#;

    #[tokio::test]
    async fn test_classify_prints_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let indicators = write_file(
            &dir,
            "indicators.json",
            r#"{"yield_change_bps": 40.0, "volatility_index": 30.0, "index_return": -0.1}"#,
        );
        let out = run(args(&[
            "arbiter",
            "classify",
            "--indicators",
            indicators.to_str().unwrap(),
        ]))
        .await
        .unwrap();
        assert_eq!(out["version"], 1);
        assert_eq!(out["classified"], true);
    }

    #[tokio::test]
    async fn test_score_empty_ledger_is_neutral_low_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = write_file(&dir, "ledger.json", "{}");
        let context = write_file(&dir, "context.json", CONTEXT);
        let out = run(args(&[
            "arbiter",
            "score",
            "--ledger",
            ledger.to_str().unwrap(),
            "--agent",
            "nobody",
            "--context",
            context.to_str().unwrap(),
        ]))
        .await
        .unwrap();
        assert_eq!(out["agent"], "nobody");
        assert_eq!(out["low_confidence"], true);
    }

    #[tokio::test]
    async fn test_impact_reports_and_tickets() {
        let dir = tempfile::tempdir().unwrap();
        let graph = write_file(
            &dir,
            "graph.json",
            r#"{
                "nodes": [
                    {"id": "growth", "kind": "assumption"},
                    {"id": "target", "kind": "price_target"}
                ],
                "edges": [
                    {"from": "growth", "to": "target",
                     "sensitivity": {"type": "linear", "coefficient": 0.6}}
                ]
            }"#,
        );
        let change = write_file(
            &dir,
            "change.json",
            r#"{"assumption": "growth", "old": 0.10, "new": 0.12}"#,
        );
        let out = run(args(&[
            "arbiter",
            "impact",
            "--graph",
            graph.to_str().unwrap(),
            "--change",
            change.to_str().unwrap(),
            "--debate",
            "d-1",
        ]))
        .await
        .unwrap();
        assert_eq!(out["report"]["affected"][0]["id"], "target");
        assert_eq!(out["report"]["affected"][0]["requires_recompute"], true);
        assert_eq!(out["ticket"]["debate_id"], "d-1");
        assert_eq!(out["ticket"]["outputs"][0], "target");
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let err = run(args(&[
            "arbiter",
            "classify",
            "--indicators",
            "/nonexistent/indicators.json",
        ]))
        .await
        .unwrap_err();
        assert!(err.to_string().contains("reading"));
    }
}
