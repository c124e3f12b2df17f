//! Release Keeper - Entry Point
//!
//! Tracks deployments of a single self-hosted service, validates them against
//! its liveness endpoint and rolls back to the last known-good release.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::Context;
use colored::Colorize;

use keeper::app::options::AppOptions;
use keeper::app::run::run;
use keeper::filesys::file::File;
use keeper::logs::{init_logging, LogOptions};
use keeper::models::deployment::{DeploymentRecord, DeploymentStatus};
use keeper::storage::layout::StorageLayout;
use keeper::storage::records::RecordStore;
use keeper::storage::settings::Settings;
use keeper::telemetry::init_metrics;
use keeper::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(text) => println!("{}", text),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let layout = match cli_args.get("data-dir") {
        Some(dir) => StorageLayout::new(PathBuf::from(dir)),
        None => StorageLayout::default(),
    };

    // Print the deployment history and exit
    if cli_args.contains_key("status") {
        print_status(&layout).await;
        return;
    }

    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(PathBuf::from(path)),
        None => layout.settings_file(),
    };
    let settings = match load_settings(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to load settings: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.log_json,
        log_dir: settings.log_dir.as_ref().map(PathBuf::from),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let metrics = init_metrics();

    let options = AppOptions::from_settings(&settings, layout);
    info!(
        "Running Release Keeper {} ({}) against {}",
        version.version, version.git_hash, options.probe.url
    );
    if let Err(e) = run(options, metrics, await_shutdown_signal()).await {
        error!("Failed to run Release Keeper: {e}");
        std::process::exit(1);
    }
}

async fn load_settings(file: &File) -> anyhow::Result<Settings> {
    let mut settings = if file.exists().await {
        file.read_json::<Settings>()
            .await
            .with_context(|| format!("reading {}", file.path().display()))?
    } else {
        Settings::default()
    };

    settings.apply_env();
    settings.validate().context("validating settings")?;
    Ok(settings)
}

async fn print_status(layout: &StorageLayout) {
    let store = RecordStore::open(layout.history_file()).await;
    let records = store.list().await;

    if records.is_empty() {
        println!("No deployments recorded in {}", store.file().path().display());
        return;
    }

    let current = store.current().await.ok().map(|r| r.id);
    for record in &records {
        println!("{}", status_line(record, current.as_deref() == Some(record.id.as_str())));
    }
}

fn status_line(record: &DeploymentRecord, is_current: bool) -> String {
    let status = match record.status {
        DeploymentStatus::Success => record.status.as_str().green(),
        DeploymentStatus::Failed => record.status.as_str().red(),
        DeploymentStatus::RolledBack => record.status.as_str().magenta(),
        DeploymentStatus::Pending | DeploymentStatus::Deploying => {
            record.status.as_str().yellow()
        }
    };
    let marker = if is_current { "*".bold() } else { " ".normal() };

    format!(
        "{} {}  {:<11}  {:<8}  {}  {}{}",
        marker,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        status,
        record.revision,
        record.git_ref,
        record.initiated_by.dimmed(),
        if record.rollback_eligible { "  (rollback target)" } else { "" }
    )
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Unable to install signal handlers, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
