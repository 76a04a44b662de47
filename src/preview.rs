use crate::error::Result;
use crate::format::{InvoiceView, normalize};
use crate::state::AppState;
use crate::template::{TemplateId, TemplateRegistry, logo_asset_name};

/// An image the rendered source refers to by file name.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub name: String,
    /// Data URL, local path or http(s) URL.
    pub source: String,
}

/// The rendered invoice the export pipeline captures.
#[derive(Debug, Clone)]
pub struct PreviewSurface {
    template: TemplateId,
    view: InvoiceView,
    source: String,
    assets: Vec<Asset>,
    scroll_y: f32,
}

impl PreviewSurface {
    pub fn render(registry: &TemplateRegistry, state: &AppState) -> Result<Self> {
        let view = normalize(Some(state.invoice()))?;
        let template = state.selected_template();
        let source = registry.render(template, &view)?;

        let assets = logo_asset_name(&view.company_logo)
            .map(|name| Asset {
                name,
                source: view.company_logo.trim().to_string(),
            })
            .into_iter()
            .collect();

        Ok(Self {
            template,
            view,
            source,
            assets,
            scroll_y: 0.0,
        })
    }

    pub fn template(&self) -> TemplateId {
        self.template
    }

    pub fn view(&self) -> &InvoiceView {
        &self.view
    }

    /// Typst markup for the whole invoice.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    /// How far the host has scrolled past the top of the preview, in points.
    pub fn scroll_y(&self) -> f32 {
        self.scroll_y
    }

    pub fn set_scroll_y(&mut self, scroll_y: f32) {
        self.scroll_y = scroll_y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InvoiceRecord, LineItem};

    #[test]
    fn renders_selected_template_with_logo_asset() {
        let registry = TemplateRegistry::new().unwrap();
        let mut state = AppState::new("");
        let mut record = InvoiceRecord::default();
        record.company.logo = "data:image/png;base64,iVBORw0KGgo=".into();
        record.items.push(LineItem::new("x", 1.0, 10.0));
        state.set_invoice(record);
        state.select_template(TemplateId::Template3);

        let surface = PreviewSurface::render(&registry, &state).unwrap();
        assert_eq!(surface.template(), TemplateId::Template3);
        assert_eq!(surface.view().total, 10.0);
        assert_eq!(surface.assets().len(), 1);
        assert_eq!(surface.assets()[0].name, "logo.png");
        assert!(surface.source().contains(r#"image("logo.png""#));
        assert_eq!(surface.scroll_y(), 0.0);
    }

    #[test]
    fn no_logo_means_no_assets() {
        let registry = TemplateRegistry::new().unwrap();
        let state = AppState::new("");
        let surface = PreviewSurface::render(&registry, &state).unwrap();
        assert!(surface.assets().is_empty());
    }
}
