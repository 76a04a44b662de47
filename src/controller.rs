//! The preview page's actions: save, delete, download and email.
//!
//! Every action runs the same way: claim its busy flag, perform the steps in
//! order, report the outcome through the [`Notifier`], release the flag. A
//! flag that is already held (by the same action, or by a conflicting one)
//! rejects the call with [`Error::Busy`] before any step runs.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, PoisonError};

use chrono::Utc;
use log::{debug, error, info, warn};
use regex::Regex;

use crate::error::{Error, Result};
use crate::pdf::{PdfOptions, encode_pdf, pdf_file_name, save_pdf};
use crate::preview::PreviewSurface;
use crate::raster::{CaptureOptions, Rasterizer, png_data_url};
use crate::service::{
    AuthProvider, EmailAttachment, InvoiceService, STATUS_NO_CONTENT, STATUS_OK, SavePayload,
    ThumbnailUploader,
};
use crate::state::AppState;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Save,
    Delete,
    Download,
    Email,
}

impl Action {
    /// Save and delete both write the stored record, so they exclude each other.
    pub fn conflicts_with(self, other: Action) -> bool {
        self == other
            || matches!(
                (self, other),
                (Action::Save, Action::Delete) | (Action::Delete, Action::Save)
            )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Save => "save",
            Action::Delete => "delete",
            Action::Download => "download",
            Action::Email => "email",
        })
    }
}

/// Where the page should go next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Dashboard,
}

pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Prints notifications the way the rest of the CLI reports progress.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn success(&self, message: &str) {
        info!("{}", message);
        println!("✅ {}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
        eprintln!("❌ {}", message);
    }
}

/// In-flight actions. Claiming and releasing happen under one lock.
#[derive(Debug, Default)]
pub struct BusyBoard {
    active: Mutex<BTreeSet<Action>>,
}

impl BusyBoard {
    pub fn try_begin(&self, action: Action) -> Result<BusyGuard<'_>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&holder) = active.iter().find(|a| a.conflicts_with(action)) {
            debug!("{} rejected while {} is running", action, holder);
            return Err(Error::Busy { action });
        }
        active.insert(action);
        Ok(BusyGuard { board: self, action })
    }

    pub fn is_busy(&self, action: Action) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&action)
    }

    fn release(&self, action: Action) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&action);
    }
}

/// Clears its action's flag when dropped, whatever the outcome.
pub struct BusyGuard<'a> {
    board: &'a BusyBoard,
    action: Action,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.board.release(self.action);
    }
}

pub struct Collaborators {
    pub service: Box<dyn InvoiceService>,
    pub thumbnails: Box<dyn ThumbnailUploader>,
    pub auth: Box<dyn AuthProvider>,
    pub rasterizer: Box<dyn Rasterizer>,
    pub notifier: Box<dyn Notifier>,
}

/// Redirects home when there is nothing to preview.
pub fn guard_entry(state: &AppState, notifier: &dyn Notifier) -> std::result::Result<(), Route> {
    if state.invoice().has_items() {
        Ok(())
    } else {
        notifier.error("Invoice data is empty");
        Err(Route::Home)
    }
}

pub struct PreviewController {
    deps: Collaborators,
    pdf: PdfOptions,
    busy: BusyBoard,
}

impl PreviewController {
    pub fn new(deps: Collaborators, pdf: PdfOptions) -> Self {
        Self {
            deps,
            pdf,
            busy: BusyBoard::default(),
        }
    }

    pub fn busy(&self) -> &BusyBoard {
        &self.busy
    }

    pub fn guard_entry(&self, state: &AppState) -> std::result::Result<(), Route> {
        guard_entry(state, self.deps.notifier.as_ref())
    }

    /// Snapshot → thumbnail upload → persist. Goes to the dashboard on success.
    pub fn save_and_exit(&self, state: &AppState, surface: &PreviewSurface) -> Result<Route> {
        let _busy = self.busy.try_begin(Action::Save)?;
        let result = self.save_steps(state, surface);
        match &result {
            Ok(_) => self.deps.notifier.success("Successfully saved invoice !"),
            Err(Error::UnexpectedStatus { .. }) => self.deps.notifier.error("Something Went Wrong"),
            Err(e) => {
                warn!("save failed: {}", e);
                self.deps.notifier.error("Failed to save invoice");
            }
        }
        result
    }

    fn save_steps(&self, state: &AppState, surface: &PreviewSurface) -> Result<Route> {
        let bitmap = self.capture(surface)?;
        let thumbnail_url = self.deps.thumbnails.upload_thumbnail(&png_data_url(&bitmap)?)?;
        let payload = SavePayload::new(
            state.invoice(),
            self.deps.auth.user_id(),
            thumbnail_url,
            state.selected_template().key(),
        );
        let token = self.deps.auth.token()?;
        let response = self.deps.service.save_invoice(&payload, &token)?;
        expect_status(Action::Save, response.status, STATUS_OK)?;
        Ok(Route::Dashboard)
    }

    pub fn delete(&self, state: &AppState) -> Result<Route> {
        let Some(id) = state.invoice().persisted_id() else {
            self.deps.notifier.error("No invoice ID found.");
            return Err(Error::MissingId);
        };

        let _busy = self.busy.try_begin(Action::Delete)?;
        let result = self.delete_steps(id);
        match &result {
            Ok(_) => self.deps.notifier.success("Invoice Deleted Successfully !"),
            Err(e) => {
                warn!("delete of {} failed: {}", id, e);
                self.deps.notifier.error("Failed to delete invoice");
            }
        }
        result
    }

    fn delete_steps(&self, id: &str) -> Result<Route> {
        let token = self.deps.auth.token()?;
        let response = self.deps.service.delete_invoice(id, &token)?;
        expect_status(Action::Delete, response.status, STATUS_NO_CONTENT)?;
        Ok(Route::Dashboard)
    }

    /// Saves `invoice_<epoch-ms>.pdf` into `dir`.
    pub fn download(&self, surface: &PreviewSurface, dir: &Path) -> Result<PathBuf> {
        let _busy = self.busy.try_begin(Action::Download)?;
        let result = self.download_steps(surface, dir);
        match &result {
            Ok(path) => self
                .deps
                .notifier
                .success(&format!("Invoice saved to {}", path.display())),
            Err(e) => {
                warn!("download failed: {}", e);
                self.deps.notifier.error("Failed to generate invoice.");
            }
        }
        result
    }

    fn download_steps(&self, surface: &PreviewSurface, dir: &Path) -> Result<PathBuf> {
        let bitmap = self.capture(surface)?;
        save_pdf(&bitmap, &self.pdf_options(surface), dir)
    }

    pub fn send_email(&self, surface: &PreviewSurface, email: &str) -> Result<()> {
        let email = email.trim();
        if !is_valid_email(email) {
            self.deps
                .notifier
                .error("Please enter valid email address and try again.");
            return Err(Error::InvalidEmail(email.to_string()));
        }

        let _busy = self.busy.try_begin(Action::Email)?;
        let result = self.email_steps(surface, email);
        match &result {
            Ok(()) => self.deps.notifier.success("Email sent successfully !"),
            Err(e) => {
                warn!("sending to {} failed: {}", email, e);
                self.deps.notifier.error("Failed to send email");
            }
        }
        result
    }

    fn email_steps(&self, surface: &PreviewSurface, email: &str) -> Result<()> {
        let bitmap = self.capture(surface)?;
        let attachment = EmailAttachment {
            file_name: pdf_file_name(Utc::now()),
            pdf: encode_pdf(&bitmap, &self.pdf_options(surface))?,
            email: email.to_string(),
        };
        let token = self.deps.auth.token()?;
        let response = self.deps.service.send_invoice(&attachment, &token)?;
        expect_status(Action::Email, response.status, STATUS_OK)
    }

    fn capture(&self, surface: &PreviewSurface) -> Result<image::RgbImage> {
        let options = CaptureOptions::for_surface(surface);
        Ok(self.deps.rasterizer.rasterize(surface, &options)?)
    }

    fn pdf_options(&self, surface: &PreviewSurface) -> PdfOptions {
        PdfOptions {
            title: Some(surface.view().title.clone()),
            ..self.pdf.clone()
        }
    }
}

fn expect_status(action: Action, status: u16, expected: u16) -> Result<()> {
    if status == expected {
        Ok(())
    } else {
        Err(Error::UnexpectedStatus { action, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_actions_are_rejected() {
        let board = BusyBoard::default();
        let save = board.try_begin(Action::Save).unwrap();
        assert!(matches!(board.try_begin(Action::Save), Err(Error::Busy { action: Action::Save })));
        assert!(matches!(board.try_begin(Action::Delete), Err(Error::Busy { action: Action::Delete })));
        let download = board.try_begin(Action::Download).unwrap();
        assert!(board.try_begin(Action::Email).is_ok());
        drop(save);
        assert!(!board.is_busy(Action::Save));
        assert!(board.is_busy(Action::Download));
        drop(download);
        assert!(board.try_begin(Action::Delete).is_ok());
    }

    #[test]
    fn guard_releases_on_early_return() {
        fn failing(board: &BusyBoard) -> Result<()> {
            let _busy = board.try_begin(Action::Email)?;
            Err(Error::MissingId)
        }
        let board = BusyBoard::default();
        assert!(failing(&board).is_err());
        assert!(!board.is_busy(Action::Email));
    }

    #[test]
    fn email_pattern_compiles() {
        assert!(EMAIL_RE.as_str().starts_with('^'));
    }

    #[test]
    fn email_shape_is_checked() {
        assert!(is_valid_email("client@example.com"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("client@localhost"));
        assert!(!is_valid_email("two words@example.com"));
    }

    #[test]
    fn status_must_match_exactly() {
        assert!(expect_status(Action::Delete, 204, STATUS_NO_CONTENT).is_ok());
        assert!(matches!(
            expect_status(Action::Delete, 200, STATUS_NO_CONTENT),
            Err(Error::UnexpectedStatus { action: Action::Delete, status: 200 })
        ));
    }
}
