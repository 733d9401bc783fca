//! `undel run` – restore every soft-deleted object in a container.

use std::sync::Arc;

use anyhow::{Context, Result};
use undel_core::backend::dfs::{Credential, DfsRestoreClient};
use undel_core::backend::RestoreBackend;
use undel_core::config::UndelConfig;
use undel_core::control::CancelFlag;
use undel_core::engine::{self, EngineOptions, RunSummary};
use undel_core::metrics::{format_hms, MetricsTracker};
use undel_core::task::RestoreTask;
use url::Url;

/// Cap on individually printed failures; the full list is in the log.
const MAX_PRINTED_FAILURES: usize = 20;

pub async fn run_restore_run(
    cfg: &UndelConfig,
    endpoint: Url,
    container: String,
    sas: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let credential = Credential::resolve(sas)?;
    let auth_mode = match &credential {
        Credential::Sas(_) => "SAS token",
        Credential::Bearer(_) => "bearer token",
    };
    println!("Authenticating with {auth_mode}.");
    let client = Arc::new(DfsRestoreClient::new(
        endpoint,
        container.as_str(),
        credential,
        cfg.call_timeout(),
    ));

    println!("Listing soft-deleted objects in {container}...");
    // A failed listing means the endpoint, container or credential is wrong:
    // fatal at startup, before any restore is attempted.
    let entries = client
        .list_deleted()
        .await
        .context("listing deleted paths failed")?;

    if entries.is_empty() {
        println!("No deleted objects found.");
        return Ok(());
    }
    println!("Found {} deleted object(s).", entries.len());
    if dry_run {
        println!("Dry run: nothing restored.");
        return Ok(());
    }

    let tasks: Vec<RestoreTask> = entries
        .into_iter()
        .map(|e| RestoreTask::new(e.path, e.deletion_handle))
        .collect();

    let opts = EngineOptions {
        aimd: cfg.aimd_options(),
        retry: cfg.retry_policy(),
        call_timeout: cfg.call_timeout(),
    };
    let metrics = Arc::new(MetricsTracker::new());
    let cancel = Arc::new(CancelFlag::new());

    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, draining in-flight restores");
                eprintln!("\ninterrupt: stopping admissions, letting in-flight calls finish...");
                cancel.cancel();
            }
        });
    }

    let reporter = {
        let metrics = Arc::clone(&metrics);
        let interval = cfg.report_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                print_progress_line(&metrics);
            }
        })
    };

    let summary = engine::run_restore(client, tasks, &opts, metrics, cancel).await;
    reporter.abort();

    print_summary(&summary);
    Ok(())
}

fn print_progress_line(metrics: &MetricsTracker) {
    let s = metrics.snapshot();
    let eta = s
        .eta_secs()
        .map(format_hms)
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "restored {:>7}  failed {:>5}  {:>8.2}/s  ETA {}  err {:>4.1}%  limit {:>3}  elapsed {}",
        s.restored,
        s.failed,
        s.completion_rate(),
        eta,
        s.error_rate() * 100.0,
        s.current_limit,
        format_hms(s.elapsed.as_secs_f64()),
    );
}

fn print_summary(summary: &RunSummary) {
    if summary.cancelled {
        println!("\nRun cancelled.");
    } else {
        println!("\nRun complete.");
    }
    let secs = summary.duration.as_secs_f64();
    println!("Total time: {}", format_hms(secs));
    println!("Restored: {} object(s)", summary.restored);
    println!("Skipped (already restored): {}", summary.skipped);
    println!("Failed: {}", summary.failed);
    if summary.not_processed > 0 {
        println!("Not processed: {}", summary.not_processed);
    }
    if secs > 0.0 {
        println!(
            "Average throughput: {:.2} objects/second",
            summary.restored as f64 / secs
        );
    }
    if summary.attempts > 0 {
        println!(
            "Final error rate: {:.1}%",
            summary.failed as f64 / summary.attempts as f64 * 100.0
        );
    }

    if !summary.failures.is_empty() {
        println!("\nFailed objects:");
        for failure in summary.failures.iter().take(MAX_PRINTED_FAILURES) {
            println!("  {}: {}", failure.path, failure.error);
        }
        if summary.failures.len() > MAX_PRINTED_FAILURES {
            println!(
                "  ... and {} more (see the log file)",
                summary.failures.len() - MAX_PRINTED_FAILURES
            );
        }
    }
}
