//! # PDF export
//!
//! Wraps a captured bitmap in a minimal PDF 1.4 file. The bitmap is stored
//! once as a JPEG image XObject (`/DCTDecode`) and drawn full width on an
//! A4-wide page.
//!
//! ```text
//! 1 0 obj  Catalog
//! 2 0 obj  Pages
//! 3 0 obj  Image XObject (JPEG)
//! 4 0 obj  Info (title, producer)
//! 5.. obj  content stream + page, per page
//! ```
//!
//! In [`PageLayout::Single`] the page is as tall as the scaled bitmap. In
//! [`PageLayout::Paginated`] the bitmap is cut into A4-high segments by
//! drawing the same image on each page, shifted up one page height at a time.

use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use log::info;
use miniz_oxide::deflate::compress_to_vec_zlib;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const A4_WIDTH: f64 = 595.28;
pub const A4_HEIGHT: f64 = 841.89;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageLayout {
    /// One page, height follows the bitmap's aspect ratio.
    #[default]
    Single,
    /// A4 pages, as many as the bitmap needs.
    Paginated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    pub layout: PageLayout,
    pub title: Option<String>,
    pub jpeg_quality: u8,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            layout: PageLayout::Single,
            title: None,
            jpeg_quality: 92,
        }
    }
}

/// `invoice_<epoch-ms>.pdf`
pub fn pdf_file_name(now: DateTime<Utc>) -> String {
    format!("invoice_{}.pdf", now.timestamp_millis())
}

/// Encodes the bitmap and saves it as `invoice_<epoch-ms>.pdf` inside `dir`.
/// A taken name moves the timestamp forward a millisecond at a time.
pub fn save_pdf(bitmap: &RgbImage, options: &PdfOptions, dir: &Path) -> Result<PathBuf> {
    let bytes = encode_pdf(bitmap, options)?;
    fs::create_dir_all(dir)?;
    let mut now = Utc::now();
    let mut path = dir.join(pdf_file_name(now));
    while path.exists() {
        now += chrono::Duration::milliseconds(1);
        path = dir.join(pdf_file_name(now));
    }
    fs::write(&path, bytes)?;
    info!("saved {:?}", path);
    Ok(path)
}

pub fn encode_pdf(bitmap: &RgbImage, options: &PdfOptions) -> Result<Vec<u8>> {
    let (width_px, height_px) = bitmap.dimensions();
    if width_px == 0 || height_px == 0 {
        return Err(Error::Pdf("bitmap is empty".to_string()));
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, options.jpeg_quality)
        .encode_image(bitmap)
        .map_err(|e| Error::Pdf(e.to_string()))?;

    let image_height = height_px as f64 * A4_WIDTH / width_px as f64;
    let (page_height, page_count) = match options.layout {
        PageLayout::Single => (image_height, 1),
        PageLayout::Paginated => {
            let pages = (image_height / A4_HEIGHT).ceil().max(1.0) as usize;
            (A4_HEIGHT, pages)
        }
    };

    // Objects 1-4 are fixed; pages follow.
    let mut objects: Vec<Vec<u8>> = vec![Vec::new(); 4];

    let mut image_obj = Vec::new();
    let _ = write!(
        image_obj,
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} \
         /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>\nstream\n",
        width_px,
        height_px,
        jpeg.len()
    );
    image_obj.extend_from_slice(&jpeg);
    image_obj.extend_from_slice(b"\nendstream");
    objects[2] = image_obj;

    let mut info = String::from("<< /Producer (invoice-preview)");
    if let Some(title) = options.title.as_deref().filter(|t| !t.is_empty()) {
        let _ = write!(info, " /Title {}", utf16_hex_string(title));
    }
    info.push_str(" >>");
    objects[3] = info.into_bytes();

    let mut page_ids = Vec::with_capacity(page_count);
    for index in 0..page_count {
        let offset_y = page_height - image_height + index as f64 * page_height;
        let content = format!(
            "q\n{:.2} 0 0 {:.2} 0 {:.2} cm\n/Im0 Do\nQ\n",
            A4_WIDTH, image_height, offset_y
        );
        let compressed = compress_to_vec_zlib(content.as_bytes(), 6);

        let mut content_obj = Vec::new();
        let _ = write!(
            content_obj,
            "<< /Length {} /Filter /FlateDecode >>\nstream\n",
            compressed.len()
        );
        content_obj.extend_from_slice(&compressed);
        content_obj.extend_from_slice(b"\nendstream");
        objects.push(content_obj);
        let content_id = objects.len();

        let page = format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
             /Contents {} 0 R /Resources << /XObject << /Im0 3 0 R >> >> >>",
            A4_WIDTH, page_height, content_id
        );
        objects.push(page.into_bytes());
        page_ids.push(objects.len());
    }

    objects[0] = b"<< /Type /Catalog /Pages 2 0 R >>".to_vec();
    let kids = page_ids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");
    objects[1] = format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, page_ids.len()).into_bytes();

    Ok(serialize(&objects))
}

fn serialize(objects: &[Vec<u8>]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (idx, data) in objects.iter().enumerate() {
        offsets.push(out.len());
        let _ = write!(out, "{} 0 obj\n", idx + 1);
        out.extend_from_slice(data);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = out.len();
    let _ = write!(out, "xref\n0 {}\n", objects.len() + 1);
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        let _ = write!(out, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R /Info 4 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    );
    out
}

// UTF-16BE with BOM keeps non-Latin titles (and the rupee sign) intact.
fn utf16_hex_string(text: &str) -> String {
    let mut hex = String::from("<FEFF");
    for unit in text.encode_utf16() {
        let _ = write!(hex, "{:04X}", unit);
    }
    hex.push('>');
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use miniz_oxide::inflate::decompress_to_vec_zlib;

    fn bitmap(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([250, 250, 250]))
    }

    fn text(pdf: &[u8]) -> String {
        String::from_utf8_lossy(pdf).to_string()
    }

    #[test]
    fn single_page_keeps_aspect_ratio() {
        let pdf = encode_pdf(&bitmap(200, 400), &PdfOptions::default()).unwrap();
        let s = text(&pdf);
        assert!(s.starts_with("%PDF-1.4"));
        assert!(s.trim_end().ends_with("%%EOF"));
        assert!(s.contains("/Count 1"));
        assert!(s.contains("/MediaBox [0 0 595.28 1190.56]"));
        assert!(s.contains("/Width 200 /Height 400"));
        assert!(s.contains("/Filter /DCTDecode"));
    }

    #[test]
    fn tall_bitmaps_split_into_a4_pages() {
        let options = PdfOptions {
            layout: PageLayout::Paginated,
            ..Default::default()
        };
        // 200x1000 scales to ~2976pt, four A4 pages.
        let pdf = encode_pdf(&bitmap(200, 1000), &options).unwrap();
        let s = text(&pdf);
        assert!(s.contains("/Count 4"));
        assert_eq!(s.matches("/MediaBox [0 0 595.28 841.89]").count(), 4);
        assert_eq!(s.matches("/Subtype /Image").count(), 1);
    }

    #[test]
    fn short_bitmap_still_gets_one_a4_page() {
        let options = PdfOptions {
            layout: PageLayout::Paginated,
            ..Default::default()
        };
        let pdf = encode_pdf(&bitmap(400, 100), &options).unwrap();
        assert!(text(&pdf).contains("/Count 1"));
    }

    #[test]
    fn content_stream_places_image_at_page_top() {
        let pdf = encode_pdf(&bitmap(100, 100), &PdfOptions::default()).unwrap();
        let start = find(&pdf, b"/FlateDecode >>\nstream\n").unwrap() + b"/FlateDecode >>\nstream\n".len();
        let end = start + find(&pdf[start..], b"\nendstream").unwrap();
        let content = decompress_to_vec_zlib(&pdf[start..end]).unwrap();
        assert_eq!(
            String::from_utf8(content).unwrap(),
            "q\n595.28 0 0 595.28 0 0.00 cm\n/Im0 Do\nQ\n"
        );
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let pdf = encode_pdf(&bitmap(10, 30), &PdfOptions::default()).unwrap();
        // Byte offset; the tail after the image stream is plain ASCII.
        let xref = pdf.windows(6).rposition(|w| w == b"\nxref\n").unwrap() + 1;
        let tail = text(&pdf[xref..]);
        let entries: Vec<usize> = tail
            .lines()
            .skip(3)
            .take_while(|l| l.ends_with(" n "))
            .map(|l| l[..10].parse().unwrap())
            .collect();
        // catalog, pages, image, info, one content stream, one page
        assert_eq!(entries.len(), 6);
        let startxref: usize = tail.rsplit("startxref\n").next().unwrap().lines().next().unwrap().parse().unwrap();
        assert_eq!(startxref, xref);
        for (idx, offset) in entries.iter().enumerate() {
            let header = format!("{} 0 obj", idx + 1);
            assert_eq!(&pdf[*offset..*offset + header.len()], header.as_bytes());
        }
    }

    #[test]
    fn title_is_utf16_encoded() {
        let options = PdfOptions {
            title: Some("₹ Invoice".into()),
            ..Default::default()
        };
        let pdf = encode_pdf(&bitmap(10, 10), &options).unwrap();
        assert!(text(&pdf).contains("/Title <FEFF20B900200049006E0076006F006900630065>"));
    }

    #[test]
    fn empty_bitmap_is_rejected() {
        assert!(matches!(encode_pdf(&RgbImage::new(0, 0), &PdfOptions::default()), Err(Error::Pdf(_))));
    }

    #[test]
    fn download_writes_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_pdf(&bitmap(10, 10), &PdfOptions::default(), dir.path()).unwrap();
        assert_eq!(path.parent().unwrap(), dir.path());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("invoice_") && name.ends_with(".pdf"));
        assert!(name["invoice_".len()..name.len() - 4].parse::<i64>().is_ok());
        assert!(fs::read(&path).unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn repeated_downloads_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let first = save_pdf(&bitmap(10, 10), &PdfOptions::default(), dir.path()).unwrap();
        let second = save_pdf(&bitmap(10, 10), &PdfOptions::default(), dir.path()).unwrap();
        assert_ne!(first, second);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn file_name_uses_epoch_millis() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(pdf_file_name(at), "invoice_1700000000123.pdf");
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }
}
