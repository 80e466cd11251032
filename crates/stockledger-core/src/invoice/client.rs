//! HTTP client for the invoice save endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use tracing::debug;

use crate::models::{InvoicePayload, SaveResponse};

use super::ApiError;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const CREATE_PATH: &str = "new_invoice";

/// The backend's invoice endpoints.
#[async_trait]
pub trait InvoiceApi: Send + Sync {
    /// `POST /new_invoice`
    async fn create(&self, payload: &InvoicePayload) -> Result<SaveResponse, ApiError>;

    /// `POST /invoices/{id}/edit`
    async fn edit(&self, id: &str, payload: &InvoicePayload) -> Result<SaveResponse, ApiError>;
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct InvoiceClient {
    client: Client,
    base_url: Url,
}

impl InvoiceClient {
    pub fn new(base_url: Url) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidResponse(format!("cannot-be-a-base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn create_url(&self) -> Result<Url, ApiError> {
        self.endpoint(&[CREATE_PATH])
    }

    pub fn edit_url(&self, id: &str) -> Result<Url, ApiError> {
        self.endpoint(&["invoices", id, "edit"])
    }

    async fn post(&self, url: Url, payload: &InvoicePayload) -> Result<SaveResponse, ApiError> {
        let response = self
            .client
            .post(url.clone())
            .header(header::ACCEPT, "application/json")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(url = %url, status = status.as_u16(), "Invoice save response");

        // The backend reports application errors in the body, even on 4xx
        match serde_json::from_str::<SaveResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(ApiError::from_status(status, &body)),
            Err(e) => Err(ApiError::InvalidResponse(format!(
                "Failed to parse save response: {}",
                e
            ))),
        }
    }
}

#[async_trait]
impl InvoiceApi for InvoiceClient {
    async fn create(&self, payload: &InvoicePayload) -> Result<SaveResponse, ApiError> {
        let url = self.create_url()?;
        self.post(url, payload).await
    }

    async fn edit(&self, id: &str, payload: &InvoicePayload) -> Result<SaveResponse, ApiError> {
        let url = self.edit_url(id)?;
        self.post(url, payload).await
    }
}
