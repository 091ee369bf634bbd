//! matchloom - local demo of the batch matching orchestrator.
//!
//! Wires a fixed catalog evaluator and a result store to the orchestrator,
//! submits a batch, polls it to completion, then exercises result management.

mod catalog;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use matchloom_core::domain::{JobId, MatchRequestPair, ResumeId};
use matchloom_core::impls::JsonFileResultStore;
use matchloom_core::ports::{IdGenerator, ResultStore, SystemClock, UlidGenerator};
use matchloom_core::{BatchOrchestrator, OrchestratorConfig};

use crate::catalog::CatalogEvaluator;

#[derive(Debug, Parser)]
#[command(name = "matchloom", about = "Batch resume/job matching demo")]
struct Args {
    /// TOML config file; `MATCHLOOM_*` variables override it.
    #[arg(long, env = "MATCHLOOM_CONFIG")]
    config: Option<PathBuf>,

    /// Persist outcomes to this JSON file instead of keeping them in memory.
    #[arg(long, env = "MATCHLOOM_STORE")]
    store: Option<PathBuf>,

    /// Simulated evaluator latency per pair.
    #[arg(long, default_value_t = 100)]
    latency_ms: u64,

    /// How often to poll batch progress.
    #[arg(long, default_value_t = 50)]
    poll_ms: u64,

    /// Leave stored outcomes in place at the end of the run.
    #[arg(long)]
    keep_results: bool,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    stored: usize,
    deleted: usize,
    cleared: usize,
}

fn load_config(path: Option<&PathBuf>) -> Result<OrchestratorConfig> {
    let config = match path {
        Some(path) => OrchestratorConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(SystemClock));
    let evaluator = Arc::new(CatalogEvaluator::demo(Duration::from_millis(args.latency_ms)));
    let mut builder = BatchOrchestrator::builder(evaluator)
        .with_config(config)
        .with_id_generator(Arc::clone(&ids));
    if let Some(path) = &args.store {
        let store = JsonFileResultStore::open(path, Arc::clone(&ids))
            .await
            .with_context(|| format!("opening result store {}", path.display()))?;
        info!(path = %store.path().display(), "using json result store");
        let store: Arc<dyn ResultStore> = Arc::new(store);
        builder = builder.with_store(store);
    }
    let orchestrator = builder.build()?;
    let retention = orchestrator.start_retention();
    let poll = Duration::from_millis(args.poll_ms);

    // (A) 1 求人 x 複数履歴書のバッチ。resume-nobody は評価器側で失敗する
    let job = JobId::new("job-backend");
    let resumes = ["resume-alice", "resume-bob", "resume-nobody", "resume-chen"];
    let task_id = orchestrator
        .submit_for_job(&job, resumes.into_iter().map(ResumeId::new))
        .await?;
    println!("submitted batch: {task_id}");

    // (B) 終端状態までポーリング
    loop {
        let progress = orchestrator.progress(task_id).await?;
        println!(
            "progress: state={:?} {}/{} failed={} current={}",
            progress.state,
            progress.settled_pairs(),
            progress.total_pairs,
            progress.failed_pairs,
            progress
                .current
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        );
        if progress.is_terminal() {
            break;
        }
        tokio::time::sleep(poll).await;
    }
    let report = orchestrator.report(task_id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    // (C) 単発マッチ
    match orchestrator
        .match_one(MatchRequestPair::new("resume-chen", "job-backend"))
        .await
    {
        Ok(outcome) => println!("single match: {} score={}", outcome.id, outcome.score),
        Err(e) => println!("single match failed: {e}"),
    }

    // (D) 結果の一覧・削除・全削除
    let results = orchestrator.list_results().await?;
    let stored = results.len();
    let mut deleted = 0;
    if let Some(oldest) = results.last() {
        orchestrator.delete_result(oldest.id).await?;
        deleted = 1;
    }
    let cleared = if args.keep_results {
        0
    } else {
        orchestrator.clear_results().await?
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&RunSummary {
            stored,
            deleted,
            cleared,
        })?
    );

    // (E) graceful shutdown
    orchestrator.shutdown_and_join().await;
    retention.shutdown_and_join().await;
    info!("done");
    Ok(())
}
