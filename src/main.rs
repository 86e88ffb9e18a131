use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use allocr::config::{Command, Config};
use allocr::domain::{AllocationBreakdown, AllocationRuleSet, ContributionInput, TransactionRecord};
use allocr::observability::{init_tracing, MetricsRegistry};
use allocr::policy::{load_policies, load_rule_set};
use allocr::rpt::{verify_chain, RptToken};
use allocr::rules::{evaluate_rule_set, resolve_rule_set_for_org, EvaluateOptions};
use allocr::service::{AllocationService, ApplyAllocation};
use allocr::storage::{LedgerStore, MemoryStore, PostgresStore};
use allocr::waterfall::WaterfallEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing
    init_tracing(&config.log_level);

    let Some(command) = config.command.clone() else {
        anyhow::bail!("no command given");
    };

    let metrics = Arc::new(MetricsRegistry::new());
    let outcome = run(command, &config, &metrics).await;

    if config.emit_metrics {
        eprint!("{}", metrics.to_prometheus());
    }

    outcome
}

async fn run(
    command: Command,
    config: &Config,
    metrics: &Arc<MetricsRegistry>,
) -> anyhow::Result<()> {
    match command {
        Command::Evaluate {
            transaction,
            rule_set,
            min_confidence,
        } => {
            let tx: TransactionRecord = read_json(&transaction)?;
            let rule_set = rule_set_for(&tx, rule_set.as_deref())?;

            let evaluation = evaluate_rule_set(
                &tx,
                &rule_set,
                EvaluateOptions::with_minimum_confidence(min_confidence),
            );
            metrics.record_evaluation(evaluation.proposals.len());
            print_json(&evaluation)
        }

        Command::Distribute {
            policies,
            contributions,
        } => {
            let definitions = load_policies(&policies)?;
            let inputs: Vec<ContributionInput> = read_json(&contributions)?;

            let engine = WaterfallEngine::new(&definitions)?;
            let result = engine.run(&inputs);
            metrics.record_engine_run(&result);
            print_json(&result)
        }

        Command::Apply {
            transaction,
            rule_set,
            policy_hash,
            allocation,
            timestamp,
        } => {
            let tx: TransactionRecord = read_json(&transaction)?;
            let rule_set = rule_set_for(&tx, rule_set.as_deref())?;
            let service = build_service(config, metrics.clone()).await?;

            let evaluation = service.preview(&tx, &rule_set, EvaluateOptions::default());
            let proposal = match &policy_hash {
                Some(hash) => evaluation.find_by_hash(hash),
                None => evaluation.best(),
            }
            .cloned();

            let allocation: Vec<AllocationBreakdown> = match allocation {
                Some(path) => read_json(&path)?,
                None => proposal
                    .as_ref()
                    .map(|p| p.allocation.clone())
                    .context("no proposal matches this transaction")?,
            };
            let policy_hash = match (policy_hash, proposal) {
                (Some(hash), _) => hash,
                (None, Some(p)) => p.policy_hash,
                (None, None) => anyhow::bail!("no proposal matches this transaction"),
            };

            let appended = service
                .apply(ApplyAllocation {
                    transaction: tx,
                    rule_set,
                    policy_hash,
                    allocation,
                    timestamp,
                })
                .await?;
            print_json(&appended)
        }

        Command::Verify { chain } => {
            let tokens: Vec<RptToken> = read_json(&chain)?;
            let report = verify_chain(&tokens);
            metrics.record_verification(report.valid);
            if !report.valid {
                warn!(first_broken = ?report.first_broken, "Chain failed verification");
            }
            print_json(&report)
        }
    }
}

async fn build_service(
    config: &Config,
    metrics: Arc<MetricsRegistry>,
) -> anyhow::Result<AllocationService> {
    let signer = Arc::new(config.signer()?);

    let store: Arc<dyn LedgerStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(
                url,
                config.db_min_connections,
                config.db_max_connections,
            )
            .await?;
            store.run_migrations().await?;
            info!("Using PostgreSQL ledger store");
            Arc::new(store)
        }
        None => {
            info!("Using in-memory ledger store");
            Arc::new(MemoryStore::new())
        }
    };

    Ok(AllocationService::new(
        signer,
        store,
        metrics,
        config.chain_scope,
    ))
}

fn rule_set_for(tx: &TransactionRecord, path: Option<&Path>) -> anyhow::Result<AllocationRuleSet> {
    match path {
        Some(path) => Ok(load_rule_set(path)?),
        None => Ok(resolve_rule_set_for_org(&tx.org_id)),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
