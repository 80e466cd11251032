//! Stockledger - command-line host for the offline cache and invoice submitter.
//!
//! Drives the worker lifecycle (install, activate, fetch, sync, push) against
//! an on-disk cache, and submits invoice forms captured as JSON.

mod commands;
mod host;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stockledger_core::config::Config;
use stockledger_core::worker::SYNC_INVOICES_TAG;

use commands::CommandContext;

/// Log file prefix inside `<cache_dir>/logs`
const LOG_FILE_PREFIX: &str = "stockledger.log";

const USAGE: &str = "\
Usage: stockledger <command> [args]

Commands:
  install                   Precache assets and activate
  activate                  Remove obsolete cache partitions
  fetch <url> [--navigate]  Serve a URL through the offline cache
  status                    Show cache partitions and queued invoices
  push <text>               Show a push notification
  sync [tag]                Fire a background sync event (default: sync-invoices)
  submit <form.json>        Save a new invoice
  edit <form.json>          Save an edited invoice
  queue <form.json>         Queue an invoice for the next sync";

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
fn init_tracing(cache_dir: &Path) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_appender = tracing_appender::rolling::daily(cache_dir.join("logs"), LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let cache_dir = config
        .cache_dir()
        .unwrap_or_else(|_| PathBuf::from("./cache"));
    std::fs::create_dir_all(&cache_dir)?;

    let _guard = init_tracing(&cache_dir);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    info!(command = %command, base_url = %config.base_url, "Stockledger starting");
    let ctx = CommandContext::new(config, cache_dir);

    match command.as_str() {
        "install" => commands::install(&ctx).await,
        "activate" => commands::activate(&ctx).await,
        "fetch" => {
            let target = required_arg(&args, 1, "fetch <url>")?;
            let navigate = args.iter().any(|a| a == "--navigate");
            commands::fetch(&ctx, target, navigate).await
        }
        "status" => commands::status(&ctx).await,
        "push" => {
            let text = (args.len() > 1).then(|| args[1..].join(" "));
            commands::push(&ctx, text.as_deref()).await
        }
        "sync" => {
            let tag = args.get(1).map(String::as_str).unwrap_or(SYNC_INVOICES_TAG);
            commands::sync(&ctx, tag).await
        }
        "submit" => {
            let form = required_arg(&args, 1, "submit <form.json>")?;
            commands::submit(&ctx, Path::new(form), false).await
        }
        "edit" => {
            let form = required_arg(&args, 1, "edit <form.json>")?;
            commands::submit(&ctx, Path::new(form), true).await
        }
        "queue" => {
            let form = required_arg(&args, 1, "queue <form.json>")?;
            commands::queue(&ctx, Path::new(form)).await
        }
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("{}", USAGE);
            Err(anyhow::anyhow!("Unknown command: {}", other))
        }
    }
}

fn required_arg<'a>(args: &'a [String], index: usize, usage: &str) -> Result<&'a str> {
    args.get(index)
        .filter(|a| !a.starts_with("--"))
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Usage: stockledger {}", usage))
}
