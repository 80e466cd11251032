//! Reading invoice form state into a payload.
//!
//! `InvoiceForm` is what the submitter needs from the page: the header
//! fields and the rows of the item table, as raw field values.
//! `FormSnapshot` is a serde-loadable capture of that state.

use serde::{Deserialize, Serialize};

use crate::models::{InvoiceItem, InvoicePayload};

use super::FormError;

/// Raw values of one row of the item table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemRow {
    /// Selected product id, empty when no product is chosen.
    pub product: String,
    pub quantity: String,
    pub price: String,
    pub amount: String,
    /// The table's "no items yet" placeholder row.
    pub empty_row: bool,
}

pub trait InvoiceForm {
    /// Value of the hidden invoice id field, if the form has one.
    fn invoice_id(&self) -> Option<String>;

    fn date(&self) -> String;

    /// Value of the selected customer option.
    fn customer_id(&self) -> String;

    /// Displayed text of the selected customer option, if one is selected.
    fn customer_label(&self) -> Option<String>;

    fn rows(&self) -> Vec<ItemRow>;
}

/// A captured copy of the invoice form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSnapshot {
    pub invoice_id: Option<String>,
    pub date: String,
    pub customer_id: String,
    pub customer_label: Option<String>,
    pub rows: Vec<ItemRow>,
}

impl InvoiceForm for FormSnapshot {
    fn invoice_id(&self) -> Option<String> {
        self.invoice_id.clone()
    }

    fn date(&self) -> String {
        self.date.clone()
    }

    fn customer_id(&self) -> String {
        self.customer_id.clone()
    }

    fn customer_label(&self) -> Option<String> {
        self.customer_label.clone()
    }

    fn rows(&self) -> Vec<ItemRow> {
        self.rows.clone()
    }
}

fn parse_number(row: usize, field: &'static str, value: &str) -> Result<f64, FormError> {
    match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(FormError::InvalidNumber {
            row,
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_row(index: usize, row: &ItemRow) -> Result<InvoiceItem, FormError> {
    let product_id = row
        .product
        .trim()
        .parse::<i64>()
        .map_err(|_| FormError::InvalidNumber {
            row: index,
            field: "product",
            value: row.product.clone(),
        })?;

    Ok(InvoiceItem {
        product_id,
        quantity: parse_number(index, "quantity", &row.quantity)?,
        price: parse_number(index, "price", &row.price)?,
        amount: parse_number(index, "amount", &row.amount)?,
    })
}

/// Header fields plus every row with a product selected. Rows without a
/// product are skipped; row numbers in errors are 1-based table positions.
fn collect(form: &dyn InvoiceForm) -> Result<InvoicePayload, FormError> {
    let mut payload = InvoicePayload::new(
        form.date(),
        form.customer_id(),
        form.customer_label().unwrap_or_default(),
    );

    let rows = form.rows();
    for (index, row) in rows.iter().enumerate().filter(|(_, r)| !r.empty_row) {
        if row.product.is_empty() {
            continue;
        }
        payload.push_item(parse_row(index + 1, row)?);
    }
    Ok(payload)
}

/// Payload for `POST /new_invoice`. Never carries an id.
pub fn collect_create(form: &dyn InvoiceForm) -> Result<InvoicePayload, FormError> {
    collect(form)
}

/// Payload for `POST /invoices/{id}/edit`. Always carries the id.
pub fn collect_edit(form: &dyn InvoiceForm) -> Result<InvoicePayload, FormError> {
    let id = form
        .invoice_id()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or(FormError::MissingInvoiceId)?;

    let mut payload = collect(form)?;
    payload.id = Some(id);
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(product: &str, quantity: &str, price: &str, amount: &str) -> ItemRow {
        ItemRow {
            product: product.to_string(),
            quantity: quantity.to_string(),
            price: price.to_string(),
            amount: amount.to_string(),
            empty_row: false,
        }
    }

    fn snapshot(rows: Vec<ItemRow>) -> FormSnapshot {
        FormSnapshot {
            invoice_id: None,
            date: "2024-05-01".to_string(),
            customer_id: "3".to_string(),
            customer_label: Some("Acme Traders".to_string()),
            rows,
        }
    }

    #[test]
    fn test_rows_without_product_are_skipped() {
        let form = snapshot(vec![row("", "1", "1", "1"), row("5", "2", "10", "20")]);
        let payload = collect_create(&form).unwrap();

        assert_eq!(payload.items.len(), 1);
        assert_eq!(payload.items[0].product_id, 5);
        assert_eq!(payload.total_amount, 20.0);
        assert_eq!(payload.total_items, 2.0);
        assert!(payload.id.is_none());
        assert_eq!(payload.customer_name, "Acme Traders");
    }

    #[test]
    fn test_placeholder_row_is_never_read() {
        let mut placeholder = row("9", "x", "x", "x");
        placeholder.empty_row = true;
        let form = snapshot(vec![placeholder, row("5", "1.5", "4", "6")]);

        let payload = collect_create(&form).unwrap();
        assert_eq!(payload.items.len(), 1);
        assert_eq!(payload.total_items, 1.5);
    }

    #[test]
    fn test_totals_accumulate_over_rows() {
        let form = snapshot(vec![
            row("1", "2", "10", "20"),
            row("2", "3", "2.5", "7.5"),
            row("", "", "", ""),
        ]);
        let payload = collect_create(&form).unwrap();
        assert_eq!(payload.items.len(), 2);
        assert_eq!(payload.total_amount, 27.5);
        assert_eq!(payload.total_items, 5.0);
    }

    #[test]
    fn test_no_customer_selected_gives_empty_name() {
        let mut form = snapshot(vec![]);
        form.customer_label = None;
        let payload = collect_create(&form).unwrap();
        assert_eq!(payload.customer_name, "");
        assert!(payload.items.is_empty());
    }

    #[test]
    fn test_invalid_number_reports_row_and_field() {
        let form = snapshot(vec![row("5", "2", "ten", "20")]);
        assert_eq!(
            collect_create(&form).unwrap_err(),
            FormError::InvalidNumber {
                row: 1,
                field: "price",
                value: "ten".to_string(),
            }
        );

        let form = snapshot(vec![row("5", "NaN", "1", "1")]);
        assert!(collect_create(&form).is_err());
    }

    #[test]
    fn test_edit_includes_id() {
        let mut form = snapshot(vec![row("5", "2", "10", "20")]);
        form.invoice_id = Some(" 42 ".to_string());
        let payload = collect_edit(&form).unwrap();
        assert_eq!(payload.id.as_deref(), Some("42"));
        assert_eq!(payload.items.len(), 1);

        // The create path ignores the id field even when the form has one
        assert!(collect_create(&form).unwrap().id.is_none());
    }

    #[test]
    fn test_edit_without_id_fails() {
        let form = snapshot(vec![]);
        assert_eq!(collect_edit(&form).unwrap_err(), FormError::MissingInvoiceId);

        let mut form = snapshot(vec![]);
        form.invoice_id = Some("  ".to_string());
        assert_eq!(collect_edit(&form).unwrap_err(), FormError::MissingInvoiceId);
    }

    #[test]
    fn test_snapshot_from_json() {
        let json = r#"{
            "date": "2024-05-01",
            "customer_id": "3",
            "customer_label": "Acme",
            "rows": [
                {"empty_row": true},
                {"product": "5", "quantity": "2", "price": "10", "amount": "20"}
            ]
        }"#;
        let form: FormSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(form.rows.len(), 2);
        let payload = collect_create(&form).unwrap();
        assert_eq!(payload.total_amount, 20.0);
    }
}
