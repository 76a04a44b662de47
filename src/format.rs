//! Flattens an [`InvoiceRecord`] into the view model every template consumes.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::InvoiceRecord;

pub const CURRENCY_SYMBOL: &str = "₹";

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewItem {
    pub name: String,
    pub description: String,
    pub qty: f64,
    pub amount: f64,
    pub line_total: f64,
}

/// Renderer-ready projection of an invoice. Every field is always present.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceView {
    pub title: String,
    pub company_name: String,
    pub company_address: String,
    pub company_phone: String,
    pub company_logo: String,
    pub invoice_number: String,
    pub invoice_date: String,
    pub payment_date: String,

    pub account_name: String,
    pub account_number: String,
    pub account_ifsc_code: String,

    pub billing_name: String,
    pub billing_address: String,
    pub billing_phone: String,

    pub shipping_name: String,
    pub shipping_address: String,
    pub shipping_phone: String,

    pub currency_symbol: String,
    pub tax: f64,
    pub items: Vec<ViewItem>,
    pub notes: String,
    pub sub_total: f64,
    pub tax_amount: f64,
    pub total: f64,
}

/// Builds the view model. An absent record yields an all-empty view.
///
/// A missing tax counts as 0%. Non-finite numbers are rejected rather than
/// carried into the totals.
pub fn normalize(record: Option<&InvoiceRecord>) -> Result<InvoiceView> {
    let empty = InvoiceRecord::default();
    let record = record.unwrap_or(&empty);

    let tax = record.tax.unwrap_or(0.0);
    ensure_finite("tax", tax)?;

    let mut items = Vec::with_capacity(record.items.len());
    for (idx, item) in record.items.iter().enumerate() {
        ensure_finite(&format!("items[{}].qty", idx), item.qty)?;
        ensure_finite(&format!("items[{}].amount", idx), item.amount)?;
        items.push(ViewItem {
            name: item.name.clone(),
            description: item.description.clone(),
            qty: item.qty,
            amount: item.amount,
            line_total: item.qty * item.amount,
        });
    }

    let sub_total: f64 = items.iter().map(|i| i.line_total).sum();
    let tax_amount = sub_total * (tax / 100.0);
    let total = sub_total + tax_amount;

    Ok(InvoiceView {
        title: record.title.clone(),
        company_name: record.company.name.clone(),
        company_address: record.company.address.clone(),
        company_phone: record.company.phone.clone(),
        company_logo: record.logo_source().to_string(),
        invoice_number: record.invoice.number.clone(),
        invoice_date: record.invoice.date.clone(),
        payment_date: record.invoice.due_date.clone(),

        account_name: record.account.name.clone(),
        account_number: record.account.number.clone(),
        account_ifsc_code: record.account.ifsc_code.clone(),

        billing_name: record.billing.name.clone(),
        billing_address: record.billing.address.clone(),
        billing_phone: record.billing.phone.clone(),

        shipping_name: record.shipping.name.clone(),
        shipping_address: record.shipping.address.clone(),
        shipping_phone: record.shipping.phone.clone(),

        currency_symbol: CURRENCY_SYMBOL.to_string(),
        tax,
        items,
        notes: record.notes.clone(),
        sub_total,
        tax_amount,
        total,
    })
}

fn ensure_finite(field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidNumber {
            field: field.to_string(),
            value,
        })
    }
}

/// `2025-01-05` -> `05 Jan 2025`. Blank dates read `N/A`; anything that is
/// not an ISO date is shown as typed.
pub fn display_date(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "N/A".to_string();
    }
    // Date inputs sometimes carry a time part.
    let date_part = raw.split('T').next().unwrap_or(raw);
    match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        Ok(date) => date.format("%d %b %Y").to_string(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LineItem;

    fn record(items: Vec<LineItem>, tax: Option<f64>) -> InvoiceRecord {
        InvoiceRecord {
            items,
            tax,
            ..Default::default()
        }
    }

    #[test]
    fn computes_totals() {
        let r = record(
            vec![LineItem::new("Design", 2.0, 100.0), LineItem::new("Hosting", 1.0, 50.0)],
            Some(10.0),
        );
        let view = normalize(Some(&r)).unwrap();
        assert_eq!(view.sub_total, 250.0);
        assert_eq!(view.tax_amount, 25.0);
        assert_eq!(view.total, 275.0);
        assert_eq!(view.items[0].line_total, 200.0);
    }

    #[test]
    fn preserves_item_order() {
        let r = record(
            vec![
                LineItem::new("c", 1.0, 3.0),
                LineItem::new("a", 1.0, 1.0),
                LineItem::new("b", 1.0, 2.0),
            ],
            None,
        );
        let view = normalize(Some(&r)).unwrap();
        let order: Vec<_> = view.items.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(order, ["c", "a", "b"]);
    }

    #[test]
    fn total_is_subtotal_plus_tax_for_many_rates() {
        let items = vec![
            LineItem::new("x", 3.0, 19.99),
            LineItem::new("y", 0.5, 7.25),
            LineItem::new("z", 12.0, 1.1),
        ];
        for tax in [0.0, 5.0, 12.5, 18.0, 28.0, 100.0, -3.0] {
            let view = normalize(Some(&record(items.clone(), Some(tax)))).unwrap();
            let expected_sub: f64 = items.iter().map(|i| i.qty * i.amount).sum();
            assert_eq!(view.sub_total, expected_sub);
            assert_eq!(view.tax_amount, expected_sub * (tax / 100.0));
            assert_eq!(view.total, view.sub_total + view.tax_amount);
        }
    }

    #[test]
    fn missing_tax_counts_as_zero() {
        let view = normalize(Some(&record(vec![LineItem::new("x", 2.0, 10.0)], None))).unwrap();
        assert_eq!(view.tax, 0.0);
        assert_eq!(view.total, 20.0);
    }

    #[test]
    fn non_finite_tax_is_an_error() {
        let err = normalize(Some(&record(vec![LineItem::new("x", 1.0, 1.0)], Some(f64::NAN))))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidNumber { ref field, .. } if field == "tax"));
    }

    #[test]
    fn non_finite_amount_names_the_item() {
        let r = record(
            vec![LineItem::new("ok", 1.0, 1.0), LineItem::new("bad", 1.0, f64::INFINITY)],
            Some(5.0),
        );
        let err = normalize(Some(&r)).unwrap_err();
        assert!(matches!(err, Error::InvalidNumber { ref field, .. } if field == "items[1].amount"));
    }

    #[test]
    fn absent_record_gives_empty_view() {
        let view = normalize(None).unwrap();
        assert_eq!(view.sub_total, 0.0);
        assert_eq!(view.total, 0.0);
        assert!(view.items.is_empty());
        assert_eq!(view.company_name, "");
        assert_eq!(view.currency_symbol, "₹");

        let json = serde_json::to_value(&view).unwrap();
        for key in [
            "title", "companyName", "companyAddress", "companyPhone", "companyLogo",
            "invoiceNumber", "invoiceDate", "paymentDate", "accountName", "accountNumber",
            "accountIfscCode", "billingName", "billingAddress", "billingPhone", "shippingName",
            "shippingAddress", "shippingPhone", "currencySymbol", "tax", "items", "notes",
            "subTotal", "taxAmount", "total",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn formats_dates() {
        assert_eq!(display_date("2025-01-05"), "05 Jan 2025");
        assert_eq!(display_date("2025-12-31T00:00:00Z"), "31 Dec 2025");
        assert_eq!(display_date(""), "N/A");
        assert_eq!(display_date("next friday"), "next friday");
    }
}
