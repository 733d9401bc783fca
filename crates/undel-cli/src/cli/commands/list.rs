//! `undel list` – enumerate soft-deleted objects without restoring.

use anyhow::{Context, Result};
use undel_core::backend::dfs::{Credential, DfsRestoreClient};
use undel_core::backend::RestoreBackend;
use undel_core::config::UndelConfig;
use url::Url;

pub async fn run_list(
    cfg: &UndelConfig,
    endpoint: Url,
    container: String,
    sas: Option<&str>,
) -> Result<()> {
    let credential = Credential::resolve(sas)?;
    let client = DfsRestoreClient::new(endpoint, container.as_str(), credential, cfg.call_timeout());

    let entries = client
        .list_deleted()
        .await
        .context("listing deleted paths failed")?;

    if entries.is_empty() {
        println!("No deleted objects found in {container}.");
        return Ok(());
    }

    println!("{:<14} {}", "DELETION-ID", "PATH");
    for entry in &entries {
        println!("{:<14} {}", entry.deletion_handle, entry.path);
    }
    println!("{} deleted object(s) in {container}.", entries.len());
    Ok(())
}
