//! Invoice payloads exchanged with the backend.
//!
//! The payload is built fresh for every submission and is the only body
//! accepted by `POST /new_invoice` and `POST /invoices/{id}/edit`.

use serde::{Deserialize, Serialize};

/// One line of the invoice table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct InvoiceItem {
    pub product_id: i64,
    pub quantity: f64,
    pub price: f64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct InvoicePayload {
    /// Present only when editing an existing invoice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(optional))]
    pub id: Option<String>,
    pub date: String,
    pub customer_id: String,
    pub customer_name: String,
    pub items: Vec<InvoiceItem>,
    pub total_amount: f64,
    pub total_items: f64,
}

impl InvoicePayload {
    pub fn new(
        date: impl Into<String>,
        customer_id: impl Into<String>,
        customer_name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            date: date.into(),
            customer_id: customer_id.into(),
            customer_name: customer_name.into(),
            items: Vec::new(),
            total_amount: 0.0,
            total_items: 0.0,
        }
    }

    /// Append an item and fold it into the running totals.
    pub fn push_item(&mut self, item: InvoiceItem) {
        self.total_amount += item.amount;
        self.total_items += item.quantity;
        self.items.push(item);
    }
}

/// Body returned by both save endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(optional))]
    pub error: Option<String>,
}
