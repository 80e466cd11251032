//! Data models shared by the worker and the invoice submitter.
//!
//! - `Request`, `Response`: what flows through the cache strategies
//! - `InvoicePayload`, `InvoiceItem`, `SaveResponse`: backend wire types
//! - `Notification`: what a push message turns into

pub mod invoice;
pub mod notification;
pub mod request;

pub use invoice::{InvoiceItem, InvoicePayload, SaveResponse};
pub use notification::{Notification, NotificationOptions};
pub use request::{Request, RequestMode, Response, REQUEST_TIMEOUT_STATUS};
