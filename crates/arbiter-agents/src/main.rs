use std::path::PathBuf;

use anyhow::{Context, Result};
use arbiter::{ArbiterConfig, ComplexityScorer, TestDeduplicator};
use arbiter_agents::request::{load_assertions, load_request};
use arbiter_agents::telemetry::{init_tracing, new_request_id};
use arbiter_agents::{build_arbiter, AgentsConfig, AuditLog, AuditRecord};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pick one SQL query from independently generated candidates.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file; ARBITER_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a request file against the configured endpoints
    Run {
        /// JSON request with question, schema_context, evidence, start_tier
        request: PathBuf,
        /// Append per-attempt operator records here
        #[arg(long, default_value = "arbiter-audit.jsonl")]
        audit: PathBuf,
    },
    /// Collapse near-duplicate assertions (one per line)
    Dedup { file: PathBuf },
    /// Print the complexity score of a SQL string
    Score {
        sql: String,
        /// Print every component instead of just the score
        #[arg(long, default_value_t = false)]
        breakdown: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = ArbiterConfig::load(cli.config.as_deref()).context("invalid configuration")?;

    match cli.command {
        Command::Run { request, audit } => {
            let succeeded = run(config, &request, AuditLog::new(audit)).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Command::Dedup { file } => {
            let tests = load_assertions(&file)?;
            let (kept, report) = TestDeduplicator::new(config.dedup).reduce_with_report(&tests);
            info!(
                input = report.input,
                sentinels = report.sentinels_dropped,
                collapsed = report.duplicates_collapsed,
                output = report.output,
                "Deduplicated assertions"
            );
            for test in kept {
                println!("{test}");
            }
        }
        Command::Score { sql, breakdown } => {
            let scorer = ComplexityScorer::new();
            if breakdown {
                println!("{}", serde_json::to_string_pretty(&scorer.breakdown(&sql))?);
            } else {
                println!("{}", scorer.score(&sql));
            }
        }
    }
    Ok(())
}

async fn run(config: ArbiterConfig, request_path: &std::path::Path, audit: AuditLog) -> Result<bool> {
    let request = load_request(request_path)?;
    let agents = AgentsConfig::from_env();
    let request_id = new_request_id();
    info!(
        request_id = %request_id,
        start_tier = %request.start_tier,
        basic = %agents.basic_endpoint.url,
        judge = %agents.judge_endpoint.url,
        "Arbiter starting"
    );

    let arbiter = build_arbiter(config, agents)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            on_signal.cancel();
        }
    });

    let outcome = arbiter.run(&request, &cancel).await?;
    info!(
        request_id = %request_id,
        judge_state = %outcome.judge_circuit.state,
        judge_failures = outcome.judge_circuit.failure_count,
        "Judge circuit"
    );
    audit.append(&AuditRecord::from_outcome(
        &request_id,
        &request.question,
        &outcome,
    ));

    let summary = json!({
        "request_id": request_id,
        "success": outcome.success,
        "sql": outcome.selected.as_ref().map(|c| c.sql.as_str()),
        "tier": outcome.final_tier,
        "attempts": outcome.attempts.len(),
        "message": outcome.user_message,
        "judge_circuit": outcome.judge_circuit,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(outcome.success)
}
