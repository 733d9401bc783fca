//! CLI for the undel mass-restore tool.

mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use undel_core::config::{self, validate_container_name, validate_endpoint, UndelConfig};
use url::Url;

use commands::{run_list, run_restore_run};

/// Top-level CLI for the undel mass-restore tool.
#[derive(Debug, Parser)]
#[command(name = "undel")]
#[command(about = "undel: adaptive mass restore of soft-deleted objects", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Identity of the account/container to operate on. Flags override the
/// config file; missing identity is a startup error.
#[derive(Debug, Args)]
pub struct IdentityArgs {
    /// Storage account endpoint, e.g. https://<account>.dfs.core.windows.net
    #[arg(short = 'u', long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Container holding the soft-deleted objects.
    #[arg(short = 'c', long, value_name = "NAME")]
    pub container: Option<String>,

    /// SAS token. If not provided, ambient credentials are used
    /// (AZURE_STORAGE_SAS_TOKEN or AZURE_STORAGE_BEARER_TOKEN).
    #[arg(short = 'k', long, value_name = "TOKEN")]
    pub sas: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Restore every soft-deleted object in the container.
    Run {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Lower bound on the adaptive concurrency limit.
        #[arg(long, value_name = "N")]
        min_concurrency: Option<usize>,

        /// Upper bound on the adaptive concurrency limit.
        #[arg(long, value_name = "N")]
        max_concurrency: Option<usize>,

        /// Maximum retries per object after the first attempt.
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,

        /// Seconds between progress report lines.
        #[arg(long, value_name = "SECS")]
        report_interval: Option<u64>,

        /// List and count deleted objects, but restore nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// List soft-deleted objects without restoring them.
    List {
        #[command(flatten)]
        identity: IdentityArgs,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run {
                identity,
                min_concurrency,
                max_concurrency,
                max_retries,
                report_interval,
                dry_run,
            } => {
                let mut cfg = cfg;
                if let Some(n) = min_concurrency {
                    cfg.controller.min_concurrency = n;
                }
                if let Some(n) = max_concurrency {
                    cfg.controller.max_concurrency = n;
                }
                if let Some(n) = max_retries {
                    cfg.retry.get_or_insert_with(Default::default).max_retries = n;
                }
                if let Some(secs) = report_interval {
                    cfg.report_interval_secs = secs;
                }
                cfg.validate()?;
                let (endpoint, container) = resolve_identity(&cfg, &identity)?;
                run_restore_run(&cfg, endpoint, container, identity.sas.as_deref(), dry_run)
                    .await?;
            }
            CliCommand::List { identity } => {
                cfg.validate()?;
                let (endpoint, container) = resolve_identity(&cfg, &identity)?;
                run_list(&cfg, endpoint, container, identity.sas.as_deref()).await?;
            }
        }

        Ok(())
    }
}

/// Merge CLI identity flags with config defaults and validate the result.
fn resolve_identity(cfg: &UndelConfig, args: &IdentityArgs) -> Result<(Url, String)> {
    let raw_endpoint = args
        .endpoint
        .as_deref()
        .or(cfg.endpoint.as_deref())
        .context("no endpoint: pass --endpoint or set it in the config file")?;
    let endpoint = validate_endpoint(raw_endpoint)?;

    let container = args
        .container
        .as_deref()
        .or(cfg.container.as_deref())
        .context("no container: pass --container or set it in the config file")?;
    validate_container_name(container)?;

    Ok((endpoint, container.to_string()))
}

#[cfg(test)]
mod tests;
