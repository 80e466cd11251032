//! Create and edit submission.
//!
//! Both operations gather the form, post it, then either navigate to the
//! invoice entry page or alert the user. Nothing is returned to the page
//! beyond what it sees through `UserInterface`; the `SubmitOutcome` is for
//! callers that want to log or test the result.

use tracing::{error, info, warn};

use crate::models::{InvoicePayload, SaveResponse};

use super::form::{collect_create, collect_edit, InvoiceForm};
use super::{ApiError, InvoiceApi};

/// Page shown after a successful save, for both create and edit.
pub const INVOICE_ENTRY_PATH: &str = "/new_invoice";

const SAVE_ERROR_PREFIX: &str = "Error saving invoice";

/// What the page can do in response to a submission.
pub trait UserInterface: Send + Sync {
    /// Blocking message box.
    fn alert(&self, message: &str);

    fn navigate(&self, path: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Saved,
    /// The form or the server refused the invoice; carries the alert text.
    Rejected(String),
    /// Transport or protocol failure.
    Failed,
}

pub struct InvoiceSubmitter<A, U> {
    api: A,
    ui: U,
}

impl<A: InvoiceApi, U: UserInterface> InvoiceSubmitter<A, U> {
    pub fn new(api: A, ui: U) -> Self {
        Self { api, ui }
    }

    /// Submit the form as a new invoice.
    pub async fn save_invoice(&self, form: &dyn InvoiceForm) -> SubmitOutcome {
        let payload = match collect_create(form) {
            Ok(payload) => payload,
            Err(e) => return self.reject(Some(e.to_string())),
        };
        let result = self.api.create(&payload).await;
        self.finish(&payload, result)
    }

    /// Submit the form as an edit of the invoice whose id it carries.
    pub async fn save_edit_invoice(&self, form: &dyn InvoiceForm) -> SubmitOutcome {
        let payload = match collect_edit(form) {
            Ok(payload) => payload,
            Err(e) => return self.reject(Some(e.to_string())),
        };
        let id = payload.id.clone().unwrap_or_default();
        let result = self.api.edit(&id, &payload).await;
        self.finish(&payload, result)
    }

    fn finish(
        &self,
        payload: &InvoicePayload,
        result: Result<SaveResponse, ApiError>,
    ) -> SubmitOutcome {
        match result {
            Ok(SaveResponse { success: true, .. }) => {
                info!(
                    id = payload.id.as_deref().unwrap_or("new"),
                    items = payload.items.len(),
                    total = payload.total_amount,
                    "Invoice saved"
                );
                self.ui.navigate(INVOICE_ENTRY_PATH);
                SubmitOutcome::Saved
            }
            Ok(SaveResponse { error, .. }) => {
                warn!(error = ?error, "Invoice rejected by server");
                self.reject(error)
            }
            Err(e) => {
                error!(error = %e, "Failed to save invoice");
                self.ui.alert(SAVE_ERROR_PREFIX);
                SubmitOutcome::Failed
            }
        }
    }

    fn reject(&self, reason: Option<String>) -> SubmitOutcome {
        let message = match reason.filter(|r| !r.is_empty()) {
            Some(reason) => format!("{}: {}", SAVE_ERROR_PREFIX, reason),
            None => SAVE_ERROR_PREFIX.to_string(),
        };
        self.ui.alert(&message);
        SubmitOutcome::Rejected(message)
    }
}
