use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use apify_client::TaskRunner;
use vetta_scout::{
    generate_strategy, ApifyProbe, Auditor, DiscoveryConfig, DiscoveryRun, RunOutcome,
    ServiceConfig, SpendTracker, StrategyMatrix, WatchSink,
};

#[derive(Parser)]
#[command(name = "vetta-scout", about = "Adaptive creator discovery")]
struct Cli {
    /// Strategy matrix JSON file. Generated from --brief when omitted.
    #[arg(long)]
    strategy: Option<PathBuf>,

    /// Campaign brief used to generate a strategy matrix.
    #[arg(long)]
    brief: Option<String>,

    /// Override the target pool size.
    #[arg(long)]
    target: Option<usize>,

    /// Print the final report as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let services = ServiceConfig::from_env()?;
    services.log_redacted();
    let mut config = DiscoveryConfig::from_env()?;
    if let Some(target) = cli.target {
        config.target_pool_size = target;
    }
    config.log();

    let gemini = services.gemini().map(Arc::new);

    let strategy = match (&cli.strategy, &cli.brief) {
        (Some(path), _) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read strategy file {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            StrategyMatrix::from_value(&value)
        }
        (None, Some(brief)) => {
            let Some(gemini) = &gemini else {
                bail!("GEMINI_API_KEY is required to generate a strategy from --brief");
            };
            generate_strategy(gemini.as_ref(), brief, config.strategy_timeout)
                .await?
                .matrix
        }
        (None, None) => bail!("Pass --strategy <file> or --brief <text>"),
    };
    if !strategy.is_usable() {
        warn!(shortfalls = ?strategy.shortfalls(), "Strategy is thin, discovery may end early");
    }

    let spend = Arc::new(SpendTracker::new());
    let runner = TaskRunner::new(Arc::new(services.apify_client()))
        .with_policy(services.task_policy.clone())
        .with_cost_observer(spend.observer());
    let probe = Arc::new(ApifyProbe::new(runner, &config));

    let (sink, mut updates) = WatchSink::channel();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let pool = updates.borrow_and_update().clone();
            if let Some(top) = pool.first() {
                info!(pool = pool.len(), top = top.identity.as_str(), top_score = top.score, "Pool updated");
            }
        }
    });

    let mut run = DiscoveryRun::new(config.clone(), &strategy, probe, Arc::new(sink))
        .with_spend_tracker(spend);
    if let Some(gemini) = gemini {
        run = run.with_auditor(Auditor::new(
            gemini,
            strategy.aesthetic_keywords.clone(),
            config.audit_timeout,
        ));
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    let report = run.run(cancel).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (rank, c) in report.candidates.iter().enumerate() {
            println!(
                "{:>2}. @{:<28} score {:>2}  followers {:>8}  {}  [{}]",
                rank + 1,
                c.identity,
                c.score,
                c.follower_count,
                c.match_dimension,
                c.match_reason
            );
            if let Some(audit) = &c.audit {
                println!("    audit: {}", audit.summary);
            }
        }
        println!(
            "{} candidates, {} suppressed (commercial {}, off-topic {}), {} rounds",
            report.candidates.len(),
            report.suppressed.total(),
            report.suppressed.commercial,
            report.suppressed.off_topic,
            report.rounds_run
        );
    }

    if report.outcome == RunOutcome::FatallyStopped {
        warn!("Run stopped by the platform usage limit, results above are partial");
    }
    Ok(())
}
