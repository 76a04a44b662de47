use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Company {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub logo: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct InvoiceMeta {
    pub number: String,
    pub date: String,
    pub due_date: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Account {
    pub name: String,
    pub number: String,
    #[serde(alias = "ifsccode")]
    pub ifsc_code: String,
}

/// Billing or shipping party.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Party {
    pub name: String,
    pub address: String,
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LineItem {
    pub name: String,
    pub description: String,
    #[serde(alias = "quantity", deserialize_with = "loose_number_or_zero")]
    pub qty: f64,
    #[serde(deserialize_with = "loose_number_or_zero")]
    pub amount: f64,
    /// Keys the form or backend added that nothing here reads.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LineItem {
    pub fn new(description: impl Into<String>, qty: f64, amount: f64) -> Self {
        Self {
            name: String::new(),
            description: description.into(),
            qty,
            amount,
            extra: Map::new(),
        }
    }
}

/// An invoice as the form produces it and the backend stores it.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct InvoiceRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub company: Company,
    pub invoice: InvoiceMeta,
    pub account: Account,
    pub billing: Party,
    pub shipping: Party,
    /// Percentage. `None` when the form left it blank.
    #[serde(deserialize_with = "loose_number")]
    pub tax: Option<f64>,
    pub notes: String,
    pub items: Vec<LineItem>,
    /// Older records keep the logo next to `company` instead of inside it.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub logo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Backend bookkeeping (`createdAt`, `clerkId`, ...), passed back on save.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InvoiceRecord {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    /// Persisted id, ignoring blank strings.
    pub fn persisted_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    pub fn logo_source(&self) -> &str {
        if self.company.logo.trim().is_empty() {
            self.logo.trim()
        } else {
            self.company.logo.trim()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Number(f64),
    Text(String),
}

// Form inputs hand numbers over as strings; blank means absent.
fn loose_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<LooseNumber>::deserialize(deserializer)? {
        None => Ok(None),
        Some(LooseNumber::Number(n)) => Ok(Some(n)),
        Some(LooseNumber::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(LooseNumber::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("`{}` is not a number", s))),
    }
}

fn loose_number_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    loose_number(deserializer).map(|n| n.unwrap_or(0.0))
}
