use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use clap::{CommandFactory, Parser, Subcommand};
use comfy_table::{Attribute, Cell, CellAlignment, Table};
use inquire::Text;
use log::info;

use invoice_preview::config::{Settings, get_config_path, load_settings, setup_config_wizard};
use invoice_preview::controller::{Collaborators, ConsoleNotifier, PreviewController, Route};
use invoice_preview::format::display_date;
use invoice_preview::model::InvoiceRecord;
use invoice_preview::pdf::PdfOptions;
use invoice_preview::preview::PreviewSurface;
use invoice_preview::raster::TypstRasterizer;
use invoice_preview::service::{CloudinaryUploader, HttpInvoiceService, StaticAuth};
use invoice_preview::state::AppState;
use invoice_preview::template::{TemplateId, TemplateRegistry};
use invoice_preview::Result;

#[derive(Parser)]
#[command(name = "invoice-preview", version)]
struct Cli {
    /// Print debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available templates
    Templates,
    /// Show the invoice as the templates see it
    Show {
        /// Invoice JSON file
        file: PathBuf,
        #[arg(short, long)]
        template: Option<String>,
        /// Print the rendered Typst source instead of the summary
        #[arg(long)]
        source: bool,
    },
    /// Export the invoice to PDF
    Download {
        file: PathBuf,
        #[arg(short, long)]
        template: Option<String>,
        /// Folder to save into (defaults to the configured download folder)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Save the invoice to the backend
    Save {
        file: PathBuf,
        #[arg(short, long)]
        template: Option<String>,
    },
    /// Delete the stored invoice
    Delete { file: PathBuf },
    /// Email the invoice to a customer as a PDF
    Email {
        file: PathBuf,
        #[arg(short, long)]
        template: Option<String>,
        /// Customer email (prompted for when omitted)
        #[arg(long)]
        to: Option<String>,
    },
    /// Configure API, downloads and thumbnails
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let Some(command) = cli.command else {
        Cli::command().print_help().ok();
        return ExitCode::SUCCESS;
    };

    let config_path = cli.config.unwrap_or_else(get_config_path);
    match run(command, &config_path) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

fn run(command: Commands, config_path: &Path) -> Result<ExitCode> {
    if let Commands::Config = command {
        setup_config_wizard(config_path)?;
        return Ok(ExitCode::SUCCESS);
    }

    let settings = load_settings(config_path)?;
    let registry = match settings.resolved_template_dir() {
        Some(dir) => TemplateRegistry::with_overrides(&dir)?,
        None => TemplateRegistry::new()?,
    };

    match command {
        Commands::Templates => {
            list_templates(settings.default_template);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { file, template, source } => {
            let state = load_state(&settings, &file, template.as_deref())?;
            let surface = PreviewSurface::render(&registry, &state)?;
            if source {
                println!("{}", surface.source());
            } else {
                print_summary(&surface);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Download { file, template, out } => {
            let state = load_state(&settings, &file, template.as_deref())?;
            let controller = build_controller(&settings, &state);
            if controller.guard_entry(&state).is_err() {
                return Ok(ExitCode::FAILURE);
            }
            let surface = PreviewSurface::render(&registry, &state)?;
            let dir = out.unwrap_or_else(|| settings.resolved_download_dir());
            Ok(match controller.download(&surface, &dir) {
                Ok(path) => {
                    if settings.reveal_downloads {
                        open_and_reveal(&path);
                    }
                    ExitCode::SUCCESS
                }
                Err(_) => ExitCode::FAILURE,
            })
        }
        Commands::Save { file, template } => {
            let state = load_state(&settings, &file, template.as_deref())?;
            let controller = build_controller(&settings, &state);
            if controller.guard_entry(&state).is_err() {
                return Ok(ExitCode::FAILURE);
            }
            let surface = PreviewSurface::render(&registry, &state)?;
            Ok(finish(controller.save_and_exit(&state, &surface)))
        }
        Commands::Delete { file } => {
            let state = load_state(&settings, &file, None)?;
            let controller = build_controller(&settings, &state);
            Ok(finish(controller.delete(&state)))
        }
        Commands::Email { file, template, to } => {
            let state = load_state(&settings, &file, template.as_deref())?;
            let controller = build_controller(&settings, &state);
            if controller.guard_entry(&state).is_err() {
                return Ok(ExitCode::FAILURE);
            }
            let surface = PreviewSurface::render(&registry, &state)?;
            let to = match to {
                Some(to) => to,
                None => Text::new("Customer Email:").prompt()?,
            };
            Ok(match controller.send_email(&surface, &to) {
                Ok(()) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            })
        }
        Commands::Config => Ok(ExitCode::SUCCESS),
    }
}

// The controller has already reported the outcome.
fn finish(result: Result<Route>) -> ExitCode {
    match result {
        Ok(route) => {
            info!("next: {:?}", route);
            ExitCode::SUCCESS
        }
        Err(_) => ExitCode::FAILURE,
    }
}

fn load_state(settings: &Settings, file: &Path, template: Option<&str>) -> Result<AppState> {
    let text = fs::read_to_string(file)?;
    let record = InvoiceRecord::from_json(&text)?;

    let mut state = AppState::new(settings.base_url.clone());
    state.select_template(settings.default_template);
    state.set_invoice(record);
    if let Some(key) = template {
        state.select_template(TemplateId::resolve(key));
    }
    Ok(state)
}

fn build_controller(settings: &Settings, state: &AppState) -> PreviewController {
    let deps = Collaborators {
        service: Box::new(HttpInvoiceService::new(state.base_url())),
        thumbnails: Box::new(CloudinaryUploader::new(settings.cloudinary.clone())),
        auth: Box::new(StaticAuth::from_env_or(settings.auth.clone())),
        rasterizer: Box::new(TypstRasterizer::new(&settings.typst_binary)),
        notifier: Box::new(ConsoleNotifier),
    };
    PreviewController::new(
        deps,
        PdfOptions {
            layout: settings.page_layout,
            ..Default::default()
        },
    )
}

fn list_templates(default: TemplateId) {
    let mut table = Table::new();
    table.set_header(vec![Cell::new("Key"), Cell::new("Name"), Cell::new("")]);
    for id in TemplateId::ALL {
        let marker = if id == default { "default" } else { "" };
        table.add_row(vec![Cell::new(id.key()), Cell::new(id.label()), Cell::new(marker)]);
    }
    println!("{table}");
}

fn print_summary(surface: &PreviewSurface) {
    let view = surface.view();
    let money = |n: f64| format!("{}{:.2}", view.currency_symbol, n);

    println!(
        "\n--- {} #{} ({} template) ---",
        if view.title.is_empty() { "Invoice" } else { view.title.as_str() },
        view.invoice_number,
        surface.template().label()
    );
    println!("From:   {}", view.company_name);
    println!("Bill:   {}", view.billing_name);
    println!("Date:   {}", display_date(&view.invoice_date));
    println!("Due:    {}", display_date(&view.payment_date));

    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("Item"),
        Cell::new("Qty"),
        Cell::new("Rate"),
        Cell::new("Amount"),
    ]);
    for item in &view.items {
        let label = if item.name.is_empty() {
            item.description.clone()
        } else {
            format!("{} - {}", item.name, item.description)
        };
        table.add_row(vec![
            Cell::new(label),
            Cell::new(item.qty).set_alignment(CellAlignment::Right),
            Cell::new(money(item.amount)).set_alignment(CellAlignment::Right),
            Cell::new(money(item.line_total)).set_alignment(CellAlignment::Right),
        ]);
    }
    table.add_row(vec![
        Cell::new("Sub Total"),
        Cell::new(""),
        Cell::new(""),
        Cell::new(money(view.sub_total)).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new(format!("Tax ({}%)", view.tax)),
        Cell::new(""),
        Cell::new(""),
        Cell::new(money(view.tax_amount)).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(""),
        Cell::new(""),
        Cell::new(money(view.total))
            .add_attribute(Attribute::Bold)
            .set_alignment(CellAlignment::Right),
    ]);
    println!("{table}");
}

// Helper: Open file and reveal in Finder/Explorer
fn open_and_reveal(path: &Path) {
    #[cfg(target_os = "macos")]
    Command::new("open").arg("-R").arg(path).spawn().ok();

    #[cfg(target_os = "windows")]
    Command::new("explorer")
        .arg(format!("/select,{}", path.to_string_lossy()))
        .spawn()
        .ok();

    #[cfg(target_os = "linux")]
    if let Some(parent) = path.parent() {
        Command::new("xdg-open").arg(parent).spawn().ok();
    }
}
