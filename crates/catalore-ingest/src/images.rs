//! Product-image extraction with smart naming.
//!
//! Poppler's `pdfimages` pulls the embedded images for one page at a time;
//! each file is then renamed to a stem derived from that page's OCR text so
//! the enricher can find it later: a SKU token if the page has one, else a
//! normalized `model:` token, else `<brand>_page<N>`. Extraction is
//! best-effort per page; a page that fails is logged and skipped, never fatal
//! to the catalog.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::enrich::{model_token_re, normalize_name_token, sku_token_re};
use crate::ocr::{run_checked, ScratchDir};

/// File-name stem for images found on one page, from that page's text.
///
/// The same priority chain the enricher resolves with, so names written here
/// are names lookups will hit.
pub fn page_image_stem(brand: &str, page: u32, page_text: &str) -> String {
    let text = page_text.to_lowercase();
    if let Some(m) = sku_token_re().find(&text) {
        return m.as_str().to_string();
    }
    if let Some(caps) = model_token_re().captures(&text) {
        return normalize_name_token(&caps[1]);
    }
    format!("{brand}_page{page}")
}

/// Extracts embedded images page by page via `pdfimages`.
#[derive(Debug, Clone, Default)]
pub struct ImageExtractor {
    /// Directory containing the poppler binaries, or `None` for `PATH`.
    pub poppler_path: Option<PathBuf>,
}

impl ImageExtractor {
    pub fn new(poppler_path: Option<PathBuf>) -> Self {
        Self { poppler_path }
    }

    fn pdfimages_bin(&self) -> PathBuf {
        match &self.poppler_path {
            Some(dir) => dir.join("pdfimages"),
            None => PathBuf::from("pdfimages"),
        }
    }

    /// Pull the images of every page of `pdf` into `image_dir`, named by
    /// [`page_image_stem`] with a 1-based index suffix. `pages` is the
    /// per-page OCR text, in page order. Returns the paths written.
    pub fn extract(
        &self,
        pdf: &Path,
        brand: &str,
        pages: &[String],
        image_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(image_dir)
            .with_context(|| format!("failed to create {}", image_dir.display()))?;

        let mut written = Vec::new();
        for (i, page_text) in pages.iter().enumerate() {
            let page_no = (i + 1) as u32;
            match self.extract_page(pdf, page_no, page_image_stem(brand, page_no, page_text), image_dir) {
                Ok(mut paths) => written.append(&mut paths),
                Err(e) => {
                    tracing::warn!(
                        pdf = %pdf.display(),
                        page = page_no,
                        error = %e,
                        "image extraction failed for page; continuing"
                    );
                }
            }
        }
        tracing::info!(pdf = %pdf.display(), images = written.len(), "extracted product images");
        Ok(written)
    }

    fn extract_page(
        &self,
        pdf: &Path,
        page: u32,
        stem: String,
        image_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let scratch = ScratchDir::create("images")?;
        run_checked(
            Command::new(self.pdfimages_bin())
                .arg("-f")
                .arg(page.to_string())
                .arg("-l")
                .arg(page.to_string())
                .arg("-png")
                .arg(pdf)
                .arg(scratch.path().join("img")),
            "pdfimages",
        )?;

        let mut produced: Vec<PathBuf> = std::fs::read_dir(scratch.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        produced.sort();

        let mut written = Vec::with_capacity(produced.len());
        for (idx, src) in produced.iter().enumerate() {
            let ext = src
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_else(|| "png".to_string());
            let dest = image_dir.join(format!("{stem}_{}.{ext}", idx + 1));
            // Scratch lives in the system temp dir, which may be another
            // filesystem, so copy rather than rename.
            std::fs::copy(src, &dest)
                .with_context(|| format!("failed to write {}", dest.display()))?;
            written.push(dest);
        }
        Ok(written)
    }
}
