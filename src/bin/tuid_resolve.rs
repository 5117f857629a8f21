//! CLI front end: resolve TUIDs for a set of files at a revision and print
//! the result as JSON.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tuid::{build_service, Config, FileKey, RevisionId, ResolveOptions};

/// Resolve stable per-line identifiers for files at a Mercurial revision.
#[derive(Parser, Debug)]
#[command(name = "tuid-resolve", version, about)]
struct Cli {
    /// Path to a TOML configuration file (see `Config`). Defaults are used
    /// for anything not set.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory used for the durable TUID counter file.
    #[arg(long, default_value = ".")]
    state_dir: PathBuf,

    /// Revision to resolve at.
    revision: String,

    /// Files to resolve, repository-relative. When omitted, every file
    /// `json-info` reports for `revision` is resolved (spec §6's
    /// `resolve_revision` convenience operation).
    files: Vec<String>,

    /// Resolve against an ephemeral "try" push instead of the default
    /// branch (spec §4.8).
    #[arg(long)]
    try_branch: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let engine = match build_service(config, cli.state_dir.clone()) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to start resolution engine: {err}");
            return ExitCode::FAILURE;
        }
    };

    let revision = RevisionId::new(&cli.revision);

    let pairs = if cli.try_branch {
        let files: Vec<FileKey> = cli.files.iter().map(FileKey::new).collect();
        match engine.try_branch.resolve(&files, &revision) {
            Ok(pairs) => pairs,
            Err(err) => {
                eprintln!("try-branch resolution failed: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else if cli.files.is_empty() {
        match engine.service.resolve_revision(&revision) {
            Ok((pairs, completed)) => {
                if !completed {
                    eprintln!("note: some files were deferred to a background worker");
                }
                pairs
            }
            Err(err) => {
                eprintln!("resolve_revision failed: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        let files: Vec<FileKey> = cli.files.iter().map(FileKey::new).collect();
        let (pairs, completed) = engine.service.resolve(&files, &revision, ResolveOptions::default());
        if !completed {
            eprintln!("note: some files were deferred to a background worker");
        }
        pairs
    };

    let output: Vec<_> = pairs
        .into_iter()
        .map(|(file, tuids)| {
            serde_json::json!({
                "file": file.as_str(),
                "tuids": tuids.into_iter().map(|t| t.value()).collect::<Vec<_>>(),
            })
        })
        .collect();

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            eprintln!("failed to serialize result: {err}");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config, String> {
    match path {
        None => Ok(Config::default()),
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
            Config::from_toml(&text).map_err(|e| e.to_string())
        }
    }
}
