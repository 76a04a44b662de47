//! Invoice layouts. Each layout is a Tera template producing Typst markup and
//! consumes the same [`InvoiceView`].

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera, Value};

use crate::error::Result;
use crate::format::{InvoiceView, display_date};

// Embedded at compile time so the binary works without a template folder.
const TEMPLATE_1: &str = include_str!("../templates/template1.typ.tera");
const TEMPLATE_2: &str = include_str!("../templates/template2.typ.tera");
const TEMPLATE_3: &str = include_str!("../templates/template3.typ.tera");
const TEMPLATE_4: &str = include_str!("../templates/template4.typ.tera");
const TEMPLATE_5: &str = include_str!("../templates/template5.typ.tera");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateId {
    #[default]
    Template1,
    Template2,
    Template3,
    Template4,
    Template5,
}

impl TemplateId {
    pub const ALL: [TemplateId; 5] = [
        TemplateId::Template1,
        TemplateId::Template2,
        TemplateId::Template3,
        TemplateId::Template4,
        TemplateId::Template5,
    ];

    pub fn key(self) -> &'static str {
        match self {
            TemplateId::Template1 => "template1",
            TemplateId::Template2 => "template2",
            TemplateId::Template3 => "template3",
            TemplateId::Template4 => "template4",
            TemplateId::Template5 => "template5",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TemplateId::Template1 => "Classic",
            TemplateId::Template2 => "Modern",
            TemplateId::Template3 => "Minimal",
            TemplateId::Template4 => "Bold",
            TemplateId::Template5 => "Compact",
        }
    }

    pub fn from_key(key: &str) -> Option<TemplateId> {
        let key = key.trim();
        TemplateId::ALL.into_iter().find(|t| t.key() == key)
    }

    /// Like [`TemplateId::from_key`] but falls back to the default layout.
    pub fn resolve(key: &str) -> TemplateId {
        TemplateId::from_key(key).unwrap_or_else(|| {
            warn!("unknown template {:?}, using {}", key, TemplateId::default());
            TemplateId::default()
        })
    }

    fn file_name(self) -> String {
        format!("{}.typ.tera", self.key())
    }

    fn embedded_source(self) -> &'static str {
        match self {
            TemplateId::Template1 => TEMPLATE_1,
            TemplateId::Template2 => TEMPLATE_2,
            TemplateId::Template3 => TEMPLATE_3,
            TemplateId::Template4 => TEMPLATE_4,
            TemplateId::Template5 => TEMPLATE_5,
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

pub struct TemplateRegistry {
    tera: Tera,
}

impl TemplateRegistry {
    /// Registry with the built-in layouts only.
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(
            TemplateId::ALL
                .iter()
                .map(|id| (id.file_name(), id.embedded_source())),
        )?;
        register_filters(&mut tera);
        Ok(Self { tera })
    }

    /// Built-in layouts, replaced by any `<key>.typ.tera` found in `dir`.
    pub fn with_overrides(dir: &Path) -> Result<Self> {
        let mut registry = Self::new()?;
        for id in TemplateId::ALL {
            let path = dir.join(id.file_name());
            if path.exists() {
                debug!("loading template override {:?}", path);
                let source = fs::read_to_string(&path)?;
                registry.tera.add_raw_template(&id.file_name(), &source)?;
            }
        }
        Ok(registry)
    }

    /// Renders `view` with layout `id`. Output depends only on the inputs.
    pub fn render(&self, id: TemplateId, view: &InvoiceView) -> Result<String> {
        let mut context = Context::from_serialize(view)?;
        context.insert("logoAsset", &logo_asset_name(&view.company_logo));
        context.insert("templateLabel", id.label());
        Ok(self.tera.render(&id.file_name(), &context)?)
    }
}

/// File name the logo is staged under next to the rendered source.
pub fn logo_asset_name(source: &str) -> Option<String> {
    let source = source.trim();
    if source.is_empty() {
        return None;
    }

    let ext = if let Some(rest) = source.strip_prefix("data:") {
        let mime = rest.split([';', ',']).next().unwrap_or_default();
        match mime {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/gif" => "gif",
            "image/svg+xml" => "svg",
            "image/webp" => "webp",
            _ => "png",
        }
    } else {
        let path = source.split(['?', '#']).next().unwrap_or(source);
        match path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
            Some(ext) if ext == "jpg" || ext == "jpeg" => "jpg",
            Some(ext) if ext == "gif" => "gif",
            Some(ext) if ext == "svg" => "svg",
            Some(ext) if ext == "webp" => "webp",
            _ => "png",
        }
    };
    Some(format!("logo.{}", ext))
}

fn register_filters(tera: &mut Tera) {
    tera.register_filter("typst_str", typst_str_filter);
    tera.register_filter("money", money_filter);
    tera.register_filter("display_date", display_date_filter);
}

fn typst_str_filter(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map(plain_number).unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    };
    Ok(Value::String(typst_string_literal(&text)))
}

fn money_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let amount = value
        .as_f64()
        .ok_or_else(|| tera::Error::msg(format!("money filter expects a number, got {}", value)))?;
    let symbol = args.get("symbol").and_then(Value::as_str).unwrap_or("");
    Ok(Value::String(format!("{}{:.2}", symbol, amount)))
}

fn display_date_filter(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(display_date(value.as_str().unwrap_or(""))))
}

/// Quotes `text` as a Typst string literal.
pub fn typst_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// Quantities read better as `2` than `2.0`.
fn plain_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::normalize;
    use crate::model::{InvoiceRecord, LineItem};

    fn sample_view() -> InvoiceView {
        let mut record = InvoiceRecord::default();
        record.title = "Invoice".into();
        record.company.name = "Acme \"Works\"".into();
        record.invoice.number = "INV-7".into();
        record.invoice.date = "2025-03-09".into();
        record.tax = Some(18.0);
        record.items = vec![LineItem::new("Consulting", 2.0, 1200.0)];
        normalize(Some(&record)).unwrap()
    }

    #[test]
    fn unknown_keys_fall_back_to_default() {
        assert_eq!(TemplateId::resolve("template3"), TemplateId::Template3);
        assert_eq!(TemplateId::resolve("fancy"), TemplateId::Template1);
        assert_eq!(TemplateId::resolve(""), TemplateId::Template1);
        assert_eq!(TemplateId::from_key("nope"), None);
    }

    #[test]
    fn every_template_renders_the_view() {
        let registry = TemplateRegistry::new().unwrap();
        let view = sample_view();
        for id in TemplateId::ALL {
            let out = registry.render(id, &view).unwrap();
            assert!(out.contains(r#""Acme \"Works\"""#), "{} lost company name", id);
            assert!(out.contains(r#""INV-7""#), "{} lost invoice number", id);
            assert!(out.contains("09 Mar 2025"), "{} lost date", id);
            assert!(out.contains("₹2832.00"), "{} lost total", id);
            assert!(out.contains("#set page("), "{} has no page setup", id);
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let registry = TemplateRegistry::new().unwrap();
        let view = sample_view();
        for id in TemplateId::ALL {
            assert_eq!(registry.render(id, &view).unwrap(), registry.render(id, &view).unwrap());
        }
    }

    #[test]
    fn logo_is_referenced_only_when_present() {
        let registry = TemplateRegistry::new().unwrap();
        let mut view = sample_view();
        let out = registry.render(TemplateId::Template1, &view).unwrap();
        assert!(!out.contains("logo."));

        view.company_logo = "https://cdn.example.com/acme.JPG?v=2".into();
        let out = registry.render(TemplateId::Template1, &view).unwrap();
        assert!(out.contains(r#"image("logo.jpg""#));
    }

    #[test]
    fn overrides_replace_builtin_layout() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("template2.typ.tera"), "custom {{ invoiceNumber }}").unwrap();
        let registry = TemplateRegistry::with_overrides(dir.path()).unwrap();
        let view = sample_view();
        assert_eq!(registry.render(TemplateId::Template2, &view).unwrap(), "custom INV-7");
        assert!(registry.render(TemplateId::Template1, &view).unwrap().contains("#set page("));
    }

    #[test]
    fn names_logo_assets_by_type() {
        assert_eq!(logo_asset_name(""), None);
        assert_eq!(logo_asset_name("data:image/jpeg;base64,AAA").as_deref(), Some("logo.jpg"));
        assert_eq!(logo_asset_name("data:image/svg+xml;base64,AAA").as_deref(), Some("logo.svg"));
        assert_eq!(logo_asset_name("./brand/logo.png").as_deref(), Some("logo.png"));
        assert_eq!(logo_asset_name("https://x.io/img").as_deref(), Some("logo.png"));
    }

    #[test]
    fn escapes_typst_strings() {
        assert_eq!(typst_string_literal(r#"a "b" \ c"#), r#""a \"b\" \\ c""#);
        assert_eq!(typst_string_literal("line\r\nnext"), r#""line\nnext""#);
        assert_eq!(plain_number(2.0), "2");
        assert_eq!(plain_number(2.5), "2.5");
    }
}
