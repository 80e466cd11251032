//! Terminal implementations of the platform seams.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use stockledger_core::invoice::UserInterface;
use stockledger_core::models::Notification;
use stockledger_core::worker::WorkerHost;
use tracing::info;

/// Worker host that reports lifecycle requests on the terminal.
#[derive(Default)]
pub struct TerminalHost {
    skip_waiting: AtomicBool,
}

impl TerminalHost {
    /// Whether the worker asked to be activated right after install.
    pub fn activation_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerHost for TerminalHost {
    async fn skip_waiting(&self) {
        info!("Worker requested immediate activation");
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    async fn claim_clients(&self) {
        info!("Worker claimed open clients");
    }

    async fn show_notification(&self, notification: Notification) -> anyhow::Result<()> {
        println!("🔔 {}", notification.title);
        println!("   {}", notification.options.body);
        Ok(())
    }
}

pub struct TerminalUi;

impl UserInterface for TerminalUi {
    fn alert(&self, message: &str) {
        eprintln!("✗ {}", message);
    }

    fn navigate(&self, path: &str) {
        println!("✓ Saved, continue at {}", path);
    }
}
