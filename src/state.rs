use crate::model::InvoiceRecord;
use crate::template::TemplateId;

/// Application state handed to the preview page and its actions.
///
/// Fields change only through the setters below so every mutation has one
/// owner.
#[derive(Debug, Clone)]
pub struct AppState {
    base_url: String,
    title: String,
    invoice: InvoiceRecord,
    selected_template: TemplateId,
}

pub const DEFAULT_TITLE: &str = "New Invoice";

impl AppState {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            title: DEFAULT_TITLE.to_string(),
            invoice: blank_invoice(),
            selected_template: TemplateId::default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn invoice(&self) -> &InvoiceRecord {
        &self.invoice
    }

    pub fn selected_template(&self) -> TemplateId {
        self.selected_template
    }

    /// Loads a record, adopting its title and stored template when present.
    pub fn set_invoice(&mut self, invoice: InvoiceRecord) {
        if !invoice.title.trim().is_empty() {
            self.title = invoice.title.clone();
        }
        if let Some(key) = invoice.template.as_deref() {
            self.selected_template = TemplateId::resolve(key);
        }
        self.invoice = invoice;
        self.invoice.title = self.title.clone();
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.invoice.title = self.title.clone();
    }

    pub fn select_template(&mut self, template: TemplateId) {
        self.selected_template = template;
    }

    /// Back to the blank invoice a fresh form starts from.
    pub fn reset(&mut self) {
        self.title = DEFAULT_TITLE.to_string();
        self.invoice = blank_invoice();
        self.selected_template = TemplateId::default();
    }
}

fn blank_invoice() -> InvoiceRecord {
    InvoiceRecord {
        title: DEFAULT_TITLE.to_string(),
        ..Default::default()
    }
}
