use std::fs;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs, UserDirs};
use inquire::{Confirm, Select, Text};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pdf::PageLayout;
use crate::service::{CloudinaryConfig, StaticAuth};
use crate::template::TemplateId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub default_template: TemplateId,
    pub download_dir: Option<String>,
    pub typst_binary: String,
    pub page_layout: PageLayout,
    pub reveal_downloads: bool,
    pub template_dir: Option<String>,
    pub cloudinary: CloudinaryConfig,
    pub auth: StaticAuth,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            default_template: TemplateId::default(),
            download_dir: None,
            typst_binary: "typst".to_string(),
            page_layout: PageLayout::default(),
            reveal_downloads: false,
            template_dir: None,
            cloudinary: CloudinaryConfig::default(),
            auth: StaticAuth::default(),
        }
    }
}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Configured download folder, else the user's Downloads, else `.`.
    pub fn resolved_download_dir(&self) -> PathBuf {
        if let Some(dir) = self.download_dir.as_deref().filter(|d| !d.trim().is_empty()) {
            return PathBuf::from(expand_home_dir(dir));
        }
        UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn resolved_template_dir(&self) -> Option<PathBuf> {
        self.template_dir
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(|d| PathBuf::from(expand_home_dir(d)))
    }
}

pub fn get_config_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "invoice-preview", "app") {
        return proj_dirs.config_dir().join("settings.toml");
    }
    PathBuf::from("settings.toml")
}

/// Reads `path`; a missing file means defaults.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        debug!("no settings at {:?}, using defaults", path);
        return Ok(Settings::default());
    }
    let content = fs::read_to_string(path)?;
    Settings::from_toml(&content)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, settings.to_toml()?)?;
    Ok(())
}

pub fn expand_home_dir(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(base_dirs) = BaseDirs::new() {
            let home = base_dirs.home_dir().to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

pub fn setup_config_wizard(path: &Path) -> Result<Settings> {
    println!("\n⚙️  --- Configuration Setup ---");
    let current = load_settings(path)?;

    let base_url = Text::new("Invoice API base URL:")
        .with_default(&current.base_url)
        .prompt()?;

    let labels: Vec<String> = TemplateId::ALL
        .iter()
        .map(|t| format!("{} ({})", t.label(), t.key()))
        .collect();
    let start = TemplateId::ALL
        .iter()
        .position(|t| *t == current.default_template)
        .unwrap_or(0);
    let picked = Select::new("Default template:", labels.clone())
        .with_starting_cursor(start)
        .prompt()?;
    let default_template = labels
        .iter()
        .position(|l| *l == picked)
        .map(|i| TemplateId::ALL[i])
        .unwrap_or_default();

    println!("📂 Opening folder picker for downloads...");
    let download_dir = match rfd::FileDialog::new()
        .set_title("Select Download Directory")
        .pick_folder()
    {
        Some(dir) => Some(dir.to_string_lossy().to_string()),
        None => {
            println!("❌ No folder selected. Falling back to manual input.");
            let default_dir = current
                .download_dir
                .clone()
                .unwrap_or_else(|| current.resolved_download_dir().to_string_lossy().to_string());
            let typed = Text::new("Download directory:")
                .with_default(&default_dir)
                .prompt()?;
            Some(typed)
        }
    };

    let paginated = Confirm::new("Split tall invoices into A4 pages?")
        .with_default(current.page_layout == PageLayout::Paginated)
        .prompt()?;

    let cloud_name = Text::new("Cloudinary cloud name (for thumbnails):")
        .with_default(&current.cloudinary.cloud_name)
        .prompt()?;
    let upload_preset = Text::new("Cloudinary upload preset:")
        .with_default(&current.cloudinary.upload_preset)
        .prompt()?;

    let settings = Settings {
        base_url,
        default_template,
        download_dir,
        page_layout: if paginated { PageLayout::Paginated } else { PageLayout::Single },
        cloudinary: CloudinaryConfig {
            cloud_name,
            upload_preset,
        },
        ..current
    };

    save_settings(path, &settings)?;
    println!("✅ Settings saved to {:?}", path);
    Ok(settings)
}
