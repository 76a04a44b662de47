//! Invoice preview and export: normalize an invoice, render it with one of
//! several layouts, capture it as a bitmap, wrap it in a PDF, and hand the
//! result to the invoice backend.

pub mod config;
pub mod controller;
pub mod error;
pub mod format;
pub mod model;
pub mod pdf;
pub mod preview;
pub mod raster;
pub mod service;
pub mod state;
pub mod template;

pub use error::{Error, Result};
