//! Turns a [`PreviewSurface`] into a bitmap.
//!
//! The default [`TypstRasterizer`] compiles the rendered markup with the
//! `typst` CLI straight to PNG at `72 × scale` ppi. Whatever produced the raw
//! pixels, [`finish_capture`] lines the capture up with the element and
//! flattens it onto an opaque background.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use log::{debug, info};

use crate::error::RasterError;
use crate::preview::{Asset, PreviewSurface};

/// Print quality: two device pixels per point.
pub const CAPTURE_SCALE: f32 = 2.0;
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureOptions {
    pub scale: f32,
    pub background: Rgb<u8>,
    /// Added to the surface's own scroll offset before capturing.
    pub scroll_y: f32,
}

impl CaptureOptions {
    /// Options that cancel out the host scroll position.
    pub fn for_surface(surface: &PreviewSurface) -> Self {
        Self {
            scale: CAPTURE_SCALE,
            background: WHITE,
            scroll_y: -surface.scroll_y(),
        }
    }
}

pub trait Rasterizer: Send + Sync {
    fn rasterize(
        &self,
        surface: &PreviewSurface,
        options: &CaptureOptions,
    ) -> Result<RgbImage, RasterError>;
}

/// Shifts `raw` by the effective scroll offset and composites every pixel
/// over `options.background`. Uncovered rows take the background color.
pub fn finish_capture(raw: &RgbaImage, surface_scroll: f32, options: &CaptureOptions) -> RgbImage {
    let (width, height) = raw.dimensions();
    let offset = ((surface_scroll + options.scroll_y) * options.scale).round() as i64;
    let mut out = RgbImage::from_pixel(width, height, options.background);

    for (x, y, px) in raw.enumerate_pixels() {
        let dest_y = y as i64 - offset;
        if dest_y < 0 || dest_y >= height as i64 {
            continue;
        }
        out.put_pixel(x, dest_y as u32, blend(px, options.background));
    }
    out
}

fn blend(px: &Rgba<u8>, bg: Rgb<u8>) -> Rgb<u8> {
    let alpha = px[3] as u32;
    let mix = |fg: u8, bg: u8| ((fg as u32 * alpha + bg as u32 * (255 - alpha) + 127) / 255) as u8;
    Rgb([mix(px[0], bg[0]), mix(px[1], bg[1]), mix(px[2], bg[2])])
}

/// Stacks page images top to bottom, left aligned.
pub fn stack_pages(pages: &[RgbaImage]) -> Result<RgbaImage, RasterError> {
    if pages.is_empty() {
        return Err(RasterError::Empty);
    }
    let width = pages.iter().map(|p| p.width()).max().unwrap_or(0);
    let height = pages.iter().map(|p| p.height()).sum();
    let mut canvas = RgbaImage::new(width, height);
    let mut top = 0i64;
    for page in pages {
        image::imageops::overlay(&mut canvas, page, 0, top);
        top += page.height() as i64;
    }
    Ok(canvas)
}

/// `data:image/png;base64,...` for the thumbnail upload.
pub fn png_data_url(bitmap: &RgbImage) -> Result<String, RasterError> {
    let mut buf = Cursor::new(Vec::new());
    bitmap.write_to(&mut buf, ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(buf.into_inner())))
}

pub struct TypstRasterizer {
    binary: PathBuf,
    http: reqwest::blocking::Client,
}

impl TypstRasterizer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn stage(&self, dir: &Path, surface: &PreviewSurface) -> Result<(), RasterError> {
        fs::write(dir.join("main.typ"), surface.source())?;
        for asset in surface.assets() {
            let bytes = self.load_asset(asset)?;
            fs::write(dir.join(&asset.name), bytes)?;
        }
        Ok(())
    }

    fn load_asset(&self, asset: &Asset) -> Result<Vec<u8>, RasterError> {
        let fail = |reason: String| RasterError::Asset {
            name: asset.name.clone(),
            reason,
        };
        let source = asset.source.as_str();

        if let Some(rest) = source.strip_prefix("data:") {
            let (meta, payload) = rest
                .split_once(',')
                .ok_or_else(|| fail("data URL has no payload".to_string()))?;
            return if meta.ends_with(";base64") {
                BASE64.decode(payload.trim()).map_err(|e| fail(e.to_string()))
            } else {
                Ok(payload.as_bytes().to_vec())
            };
        }

        if source.starts_with("http://") || source.starts_with("https://") {
            debug!("fetching {}", source);
            let response = self
                .http
                .get(source)
                .send()
                .and_then(|r| r.error_for_status())
                .map_err(|e| fail(e.to_string()))?;
            return response
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| fail(e.to_string()));
        }

        fs::read(source).map_err(|e| fail(e.to_string()))
    }
}

impl Rasterizer for TypstRasterizer {
    fn rasterize(
        &self,
        surface: &PreviewSurface,
        options: &CaptureOptions,
    ) -> Result<RgbImage, RasterError> {
        let workdir = tempfile::tempdir()?;
        self.stage(workdir.path(), surface)?;

        let ppi = 72.0 * options.scale;
        info!("rasterizing {} at {} ppi", surface.template(), ppi);
        let output = Command::new(&self.binary)
            .arg("compile")
            .arg("--format")
            .arg("png")
            .arg("--ppi")
            .arg(ppi.to_string())
            .arg("main.typ")
            .arg("page-{p}.png")
            .current_dir(workdir.path())
            .output()
            .map_err(|source| RasterError::MissingRenderer {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(RasterError::Compilation(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let pages = read_pages(workdir.path())?;
        let raw = stack_pages(&pages)?;
        Ok(finish_capture(&raw, surface.scroll_y(), options))
    }
}

fn read_pages(dir: &Path) -> Result<Vec<RgbaImage>, RasterError> {
    let mut numbered = Vec::new();
    for entry in fs::read_dir(dir)?.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let page = name
            .strip_prefix("page-")
            .and_then(|rest| rest.strip_suffix(".png"))
            .and_then(|n| n.parse::<u32>().ok());
        if let Some(n) = page {
            numbered.push((n, entry.path()));
        }
    }
    numbered.sort_by_key(|(n, _)| *n);

    let mut pages = Vec::with_capacity(numbered.len());
    for (_, path) in numbered {
        pages.push(image::open(path)?.to_rgba8());
    }
    Ok(pages)
}
