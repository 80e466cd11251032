//! Command implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use stockledger_core::cache::DiskCacheStorage;
use stockledger_core::config::Config;
use stockledger_core::invoice::{
    collect_create, collect_edit, FormSnapshot, InvoiceClient, InvoiceSubmitter, Outbox,
    OutboxSync, SubmitOutcome,
};
use stockledger_core::models::Request;
use stockledger_core::net::HttpFetcher;
use stockledger_core::utils::{format_bytes, truncate_string};
use stockledger_core::worker::{FetchOutcome, OfflineCacheManager, ServiceWorker, Strategy};

use crate::host::{TerminalHost, TerminalUi};

/// Characters of body shown by `fetch`.
const BODY_PREVIEW_CHARS: usize = 300;

type Manager = OfflineCacheManager<DiskCacheStorage, HttpFetcher>;

pub struct CommandContext {
    config: Config,
    cache_dir: PathBuf,
}

impl CommandContext {
    pub fn new(config: Config, cache_dir: PathBuf) -> Self {
        Self { config, cache_dir }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    fn invoice_client(&self) -> Result<InvoiceClient> {
        Ok(InvoiceClient::with_timeout(self.config.base_url()?, self.timeout())?)
    }

    fn manager(&self, host: Arc<TerminalHost>) -> Result<Manager> {
        let storage = Arc::new(DiskCacheStorage::new(self.cache_dir.clone())?);
        let fetcher = Arc::new(HttpFetcher::with_timeout(self.timeout())?);
        let sync = OutboxSync::new(Outbox::new(self.cache_dir.clone()), self.invoice_client()?);
        Ok(
            OfflineCacheManager::new(self.config.cache_config()?, storage, fetcher, host)
                .with_sync(Arc::new(sync)),
        )
    }
}

fn read_form(path: &Path) -> Result<FormSnapshot> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read form file: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse form file: {}", path.display()))
}

pub async fn install(ctx: &CommandContext) -> Result<()> {
    let host = Arc::new(TerminalHost::default());
    let manager = ctx.manager(host.clone())?;
    manager.install().await?;
    println!("Installed into {}", ctx.cache_dir.display());

    if host.activation_requested() {
        manager.activate().await?;
        println!("Activated");
    }
    Ok(())
}

pub async fn activate(ctx: &CommandContext) -> Result<()> {
    let manager = ctx.manager(Arc::new(TerminalHost::default()))?;
    manager.activate().await?;
    println!("Activated");
    Ok(())
}

pub async fn fetch(ctx: &CommandContext, target: &str, navigate: bool) -> Result<()> {
    let manager = ctx.manager(Arc::new(TerminalHost::default()))?;
    let url = manager.config().resolve(target)?;
    let request = if navigate {
        Request::navigate(url)
    } else {
        Request::get(url)
    };

    let outcome = manager.fetch(&request).await;
    manager.settle().await;

    match outcome? {
        FetchOutcome::Passthrough => {
            println!("{} is cross-origin, not handled by the cache", request.url);
        }
        FetchOutcome::Respond { response, source } => {
            let strategy = Strategy::select(manager.config(), &request.url);
            println!(
                "{} {} ({}, from {}) {}",
                response.status,
                response.status_text,
                strategy,
                source,
                format_bytes(response.body.len())
            );
            if !response.body.is_empty() {
                println!("{}", truncate_string(&response.text(), BODY_PREVIEW_CHARS));
            }
        }
    }
    Ok(())
}

pub async fn status(ctx: &CommandContext) -> Result<()> {
    let storage = DiskCacheStorage::new(ctx.cache_dir.clone())?;
    let cache_config = ctx.config.cache_config()?;

    println!("Backend:   {}", ctx.config.base_url);
    println!("Cache dir: {}", ctx.cache_dir.display());
    println!();

    let summaries = storage.summaries().await?;
    if summaries.is_empty() {
        println!("No cache partitions (run `stockledger install`)");
    }
    for summary in summaries {
        let marker = if cache_config.current_names().contains(&summary.name.as_str()) {
            ""
        } else {
            " (obsolete)"
        };
        println!(
            "{:<16} {:>4} entries {:>10}  updated {}{}",
            summary.name,
            summary.entries,
            format_bytes(summary.bytes),
            summary.last_updated.as_deref().unwrap_or("never"),
            marker
        );
    }

    let queued = Outbox::new(ctx.cache_dir.clone()).len()?;
    println!();
    println!("Queued invoices: {}", queued);
    Ok(())
}

pub async fn push(ctx: &CommandContext, text: Option<&str>) -> Result<()> {
    let manager = ctx.manager(Arc::new(TerminalHost::default()))?;
    manager.push(text).await
}

pub async fn sync(ctx: &CommandContext, tag: &str) -> Result<()> {
    let manager = ctx.manager(Arc::new(TerminalHost::default()))?;
    manager.sync(tag).await
}

pub async fn submit(ctx: &CommandContext, form_path: &Path, edit: bool) -> Result<()> {
    let form = read_form(form_path)?;
    let submitter = InvoiceSubmitter::new(ctx.invoice_client()?, TerminalUi);
    let outcome = if edit {
        submitter.save_edit_invoice(&form).await
    } else {
        submitter.save_invoice(&form).await
    };
    if outcome != SubmitOutcome::Saved {
        bail!("Invoice was not saved");
    }
    Ok(())
}

pub async fn queue(ctx: &CommandContext, form_path: &Path) -> Result<()> {
    let form = read_form(form_path)?;
    let payload = if form.invoice_id.is_some() {
        collect_edit(&form)?
    } else {
        collect_create(&form)?
    };
    let len = Outbox::new(ctx.cache_dir.clone()).push(payload)?;
    println!("Queued for sync ({} waiting)", len);
    Ok(())
}
