mod cli;

use anyhow::{Context, bail};
use batchgen::config::AppConfig;
use batchgen::driver::{HttpProbe, SimulatedDriver, SimulationConfig};
use batchgen::input::{LoadedBatches, load_batches, load_identities};
use batchgen::logging::{LOG_RETENTION_DAYS, cleanup_old_logs, init_logging};
use batchgen::pipeline::{BatchTracker, Preconditions, Readiness};
use batchgen::scheduler::Scheduler;
use batchgen::storage::{ArchiveFinalizer, ArtifactLayout, FailureLog, FsPreconditions};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::{Args, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::resolve(args.command.common().config.as_deref())
        .context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _guard = init_logging(&config.logging()).context("Failed to initialize logging")?;
    if let Some(dir) = &config.paths.log_dir {
        if let Err(e) = cleanup_old_logs(dir, LOG_RETENTION_DAYS).await {
            warn!(error = %e, "Failed to clean up old logs");
        }
    }

    match args.command {
        Commands::Plan { common } => plan(&config, common.json).await,
        Commands::Simulate {
            common,
            failure_rate,
            seed,
            check_network,
        } => simulate(&config, common.json, failure_rate, seed, check_network).await,
    }
}

fn layout_for(config: &AppConfig) -> ArtifactLayout {
    ArtifactLayout::new(
        &config.paths.prompts_dir,
        &config.paths.output_dir,
        config.scheduler.generation_mode,
    )
}

async fn load_input(config: &AppConfig) -> anyhow::Result<LoadedBatches> {
    load_batches(&config.paths.prompts_dir, config.scheduler.generation_mode)
        .await
        .with_context(|| {
            format!(
                "Failed to load batches from {}",
                config.paths.prompts_dir.display()
            )
        })
}

#[derive(Debug, Default, Serialize)]
struct BatchPlan {
    total: u32,
    ready: u32,
    skipped: u32,
}

#[derive(Debug, Serialize)]
struct PlanReport {
    identities: usize,
    sessions: usize,
    batches: BTreeMap<String, BatchPlan>,
}

async fn plan(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let identities = load_identities(&config.paths.profiles_dir).await?;
    let loaded = load_input(config).await?;
    let preconditions = FsPreconditions::new(layout_for(config), config.scheduler.overwrite_existing);

    let mut batches: BTreeMap<String, BatchPlan> = loaded
        .totals
        .iter()
        .map(|(batch_id, total)| {
            (
                batch_id.clone(),
                BatchPlan {
                    total: *total,
                    ..Default::default()
                },
            )
        })
        .collect();

    for job in &loaded.jobs {
        let entry = batches.entry(job.batch_id.clone()).or_default();
        match preconditions.check(job)? {
            Readiness::Ready { .. } => entry.ready += 1,
            Readiness::Skip(reason) => {
                info!(job = %job.key(), reason = %reason, "Would skip job");
                entry.skipped += 1;
            }
        }
    }

    let report = PlanReport {
        identities: identities.len(),
        sessions: config.scheduler.effective_sessions(identities.len()),
        batches,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} identities, {} sessions x {} slots",
        report.identities, report.sessions, config.scheduler.max_slots_per_session
    );
    for (batch_id, batch) in &report.batches {
        println!(
            "  {}: {} jobs, {} ready, {} would be skipped",
            batch_id, batch.total, batch.ready, batch.skipped
        );
    }
    if report.batches.is_empty() {
        println!("  no batches in {}", config.paths.prompts_dir.display());
    }
    Ok(())
}

async fn simulate(
    config: &AppConfig,
    json: bool,
    failure_rate: f64,
    seed: Option<u64>,
    check_network: bool,
) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&failure_rate) {
        bail!("--failure-rate must be between 0 and 1, got {}", failure_rate);
    }

    let identities = load_identities(&config.paths.profiles_dir).await?;
    if identities.is_empty() {
        bail!(
            "No identities found in {}",
            config.paths.profiles_dir.display()
        );
    }
    let loaded = load_input(config).await?;

    let mut driver = SimulatedDriver::new(SimulationConfig {
        failure_rate,
        seed,
        ..Default::default()
    });
    if check_network {
        driver = driver.with_probe(HttpProbe::new(&config.scheduler.connectivity)?);
    }

    let layout = layout_for(config);
    let tracker = Arc::new(BatchTracker::new(Arc::new(ArchiveFinalizer::new(
        layout.clone(),
    ))));
    let preconditions = Arc::new(FsPreconditions::new(
        layout.clone(),
        config.scheduler.overwrite_existing,
    ));
    let failure_log = Arc::new(FailureLog::new(&config.paths.failure_log));

    let scheduler = Scheduler::new(
        Arc::new(driver),
        config.scheduler.clone(),
        layout,
        tracker,
        preconditions,
        failure_log,
    );
    scheduler.seed(loaded.jobs);
    let summary = scheduler.run(identities).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary);
    }
    Ok(())
}
