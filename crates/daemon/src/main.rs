use std::env;
use std::path::PathBuf;

use anyhow::{bail, Result};
use dbkeeper_daemon::build_orchestrator;
use dbkeeper_daemon::config::{self, Config};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let (mut cfg, mode) = parse_args()?;

    // Secrets may come from the environment instead of the file.
    if let Ok(password) = env::var("DBKEEPER_DB_PASSWORD") {
        cfg.database.password = Some(password);
    }
    if let Ok(credentials) = env::var("DBKEEPER_SENDER_CREDENTIALS") {
        cfg.notify.sender_credentials = Some(credentials);
    }

    let settings = config::validate(cfg)?;
    let orchestrator = build_orchestrator(&settings)?;

    match mode.as_deref() {
        Some("run-once") => {
            orchestrator.run_all_once().await;
            let summary = orchestrator.aggregate_summary().await;
            info!(
                attempts = summary.attempts,
                successes = summary.successes,
                failures = summary.failures,
                "one-shot run finished"
            );
            if summary.failures > 0 {
                bail!("{} of {} backup attempts failed", summary.failures, summary.attempts);
            }
            Ok(())
        }
        Some(other) => bail!("unknown subcommand: {other}"),
        None => {
            tokio::select! {
                _ = orchestrator.clone().run() => {}
                _ = tokio::signal::ctrl_c() => info!("received ctrl-c, shutting down"),
            }
            Ok(())
        }
    }
}

/// Parse CLI args, returning the loaded config and optional subcommand.
fn parse_args() -> Result<(Config, Option<String>)> {
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut mode: Option<String> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                if i >= args.len() {
                    bail!("--config requires a path argument");
                }
                config_path = Some(PathBuf::from(&args[i]));
            }
            other => {
                mode = Some(other.to_owned());
            }
        }
        i += 1;
    }

    let cfg = match config_path {
        Some(path) => {
            info!(?path, "loading config file");
            config::load_config(&path)?
        }
        None => Config::default(),
    };

    Ok((cfg, mode))
}
