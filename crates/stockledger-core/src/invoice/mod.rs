//! Invoice form submission.
//!
//! This module provides:
//! - `InvoiceForm` / `FormSnapshot`: the form state a submission reads
//! - `InvoiceClient`: the reqwest client for the two save endpoints
//! - `InvoiceSubmitter`: create and edit, reporting through `UserInterface`
//! - `Outbox` / `OutboxSync`: invoices queued offline, replayed on sync

pub mod client;
pub mod error;
pub mod form;
pub mod outbox;
pub mod submitter;

pub use client::{InvoiceApi, InvoiceClient};
pub use error::{ApiError, FormError};
pub use form::{collect_create, collect_edit, FormSnapshot, InvoiceForm, ItemRow};
pub use outbox::{Outbox, OutboxSync, QueuedInvoice, SyncReport};
pub use submitter::{InvoiceSubmitter, SubmitOutcome, UserInterface, INVOICE_ENTRY_PATH};
