//! CLI parsing and identity-resolution tests.

use clap::Parser;
use undel_core::config::UndelConfig;

use super::{resolve_identity, Cli, CliCommand, IdentityArgs};

#[test]
fn parse_run_with_identity_and_overrides() {
    let cli = Cli::try_parse_from([
        "undel",
        "run",
        "--endpoint",
        "https://acct.dfs.core.windows.net",
        "--container",
        "backups",
        "--max-concurrency",
        "200",
        "--dry-run",
    ])
    .unwrap();
    match cli.command {
        CliCommand::Run {
            identity,
            max_concurrency,
            dry_run,
            ..
        } => {
            assert_eq!(
                identity.endpoint.as_deref(),
                Some("https://acct.dfs.core.windows.net")
            );
            assert_eq!(identity.container.as_deref(), Some("backups"));
            assert_eq!(max_concurrency, Some(200));
            assert!(dry_run);
        }
        other => panic!("expected run command, got {other:?}"),
    }
}

#[test]
fn parse_list_with_short_flags() {
    let cli = Cli::try_parse_from([
        "undel",
        "list",
        "-u",
        "https://acct.blob.core.windows.net",
        "-c",
        "data",
        "-k",
        "sv=2023&sig=x",
    ])
    .unwrap();
    match cli.command {
        CliCommand::List { identity } => {
            assert_eq!(identity.container.as_deref(), Some("data"));
            assert!(identity.sas.is_some());
        }
        other => panic!("expected list command, got {other:?}"),
    }
}

#[test]
fn unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["undel", "frobnicate"]).is_err());
}

fn identity(endpoint: Option<&str>, container: Option<&str>) -> IdentityArgs {
    IdentityArgs {
        endpoint: endpoint.map(str::to_string),
        container: container.map(str::to_string),
        sas: None,
    }
}

#[test]
fn identity_flags_override_config() {
    let mut cfg = UndelConfig::default();
    cfg.endpoint = Some("https://other.dfs.core.windows.net".to_string());
    cfg.container = Some("from-config".to_string());

    let (endpoint, container) = resolve_identity(
        &cfg,
        &identity(Some("https://acct.dfs.core.windows.net"), Some("from-flag")),
    )
    .unwrap();
    assert_eq!(endpoint.host_str(), Some("acct.dfs.core.windows.net"));
    assert_eq!(container, "from-flag");

    // Config fills in whatever the flags leave out.
    let (endpoint, container) = resolve_identity(&cfg, &identity(None, None)).unwrap();
    assert_eq!(endpoint.host_str(), Some("other.dfs.core.windows.net"));
    assert_eq!(container, "from-config");
}

#[test]
fn missing_identity_is_a_startup_error() {
    let cfg = UndelConfig::default();
    assert!(resolve_identity(&cfg, &identity(None, Some("data"))).is_err());
    assert!(resolve_identity(
        &cfg,
        &identity(Some("https://acct.dfs.core.windows.net"), None)
    )
    .is_err());
}

#[test]
fn invalid_identity_is_rejected() {
    let cfg = UndelConfig::default();
    assert!(resolve_identity(&cfg, &identity(Some("https://example.com"), Some("data"))).is_err());
    assert!(resolve_identity(
        &cfg,
        &identity(Some("https://acct.dfs.core.windows.net"), Some("BAD_NAME"))
    )
    .is_err());
}
