//! Page-text extraction from catalog PDFs.
//!
//! Two engines behind one trait: [`TesseractEngine`] shells out to poppler's
//! `pdftoppm` to rasterize pages and to `tesseract` to OCR each rendering
//! (scanned catalogs), and [`TextLayerEngine`] reads the embedded text layer
//! via `pdf-extract` (born-digital catalogs, no external tools). Both return
//! per-page strings; [`paginate`] joins them with the `--- Page N ---` markers
//! the rest of the pipeline keys page attribution on.

use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

/// Extracts the text of each page of a PDF, in page order.
pub trait OcrEngine {
    fn extract_pages(&self, pdf: &Path) -> Result<Vec<String>>;
}

/// Join per-page texts into one blob with 1-based page markers.
pub fn paginate(pages: &[String]) -> String {
    let mut out = String::new();
    for (i, page) in pages.iter().enumerate() {
        out.push_str(&format!("{}{} ---\n", crate::segment::PAGE_MARKER_PREFIX, i + 1));
        out.push_str(page.trim_end());
        out.push_str("\n\n");
    }
    out
}

/// Run an engine over `pdf` and write the paginated text to `dest`, returning
/// the text.
pub fn extract_to_file(engine: &dyn OcrEngine, pdf: &Path, dest: &Path) -> Result<String> {
    let pages = engine.extract_pages(pdf)?;
    let text = paginate(&pages);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, &text)
        .with_context(|| format!("failed to write extracted text {}", dest.display()))?;
    tracing::info!(pdf = %pdf.display(), pages = pages.len(), "extracted page text");
    Ok(text)
}

// ============================================================================
// Tesseract + poppler engine
// ============================================================================

/// OCR via external tools: `pdftoppm` renders each page to PNG, `tesseract`
/// reads the text back.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    /// Path to the `tesseract` binary, or `None` to resolve from `PATH`.
    pub tesseract_path: Option<PathBuf>,
    /// Directory containing the poppler binaries, or `None` for `PATH`.
    pub poppler_path: Option<PathBuf>,
    /// Rasterization resolution. OCR quality drops sharply below ~200.
    pub dpi: u32,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            poppler_path: None,
            dpi: 300,
        }
    }
}

impl TesseractEngine {
    pub fn new(tesseract_path: Option<PathBuf>, poppler_path: Option<PathBuf>) -> Self {
        Self {
            tesseract_path,
            poppler_path,
            ..Self::default()
        }
    }

    fn tesseract_bin(&self) -> PathBuf {
        self.tesseract_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("tesseract"))
    }

    fn poppler_bin(&self, name: &str) -> PathBuf {
        match &self.poppler_path {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    fn rasterize(&self, pdf: &Path, scratch: &Path) -> Result<Vec<PathBuf>> {
        let root = scratch.join("page");
        run_checked(
            Command::new(self.poppler_bin("pdftoppm"))
                .arg("-png")
                .arg("-r")
                .arg(self.dpi.to_string())
                .arg(pdf)
                .arg(&root),
            "pdftoppm",
        )?;

        // pdftoppm zero-pads page numbers, so a name sort is page order.
        let mut pngs: Vec<PathBuf> = std::fs::read_dir(scratch)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map_or(false, |e| e == "png"))
            .collect();
        pngs.sort();
        Ok(pngs)
    }

    /// Verify that the external tools can be spawned at all. Called once
    /// before any catalog is processed, so a missing install fails the run
    /// up front instead of once per document.
    pub fn ensure_available(&self) -> Result<()> {
        require_binary(&self.tesseract_bin(), "TESSERACT_PATH")?;
        require_binary(&self.poppler_bin("pdftoppm"), "POPPLER_PATH")
    }

    fn ocr_image(&self, image: &Path) -> Result<String> {
        let output = Command::new(self.tesseract_bin())
            .arg(image)
            .arg("stdout")
            .output()
            .with_context(|| "failed to spawn tesseract (is TESSERACT_PATH set correctly?)")?;
        if !output.status.success() {
            bail!(
                "tesseract failed on {}: {}",
                image.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl OcrEngine for TesseractEngine {
    fn extract_pages(&self, pdf: &Path) -> Result<Vec<String>> {
        let scratch = ScratchDir::create("ocr")?;
        let pngs = self
            .rasterize(pdf, scratch.path())
            .with_context(|| format!("failed to rasterize {}", pdf.display()))?;
        if pngs.is_empty() {
            bail!("pdftoppm produced no pages for {}", pdf.display());
        }

        let mut pages = Vec::with_capacity(pngs.len());
        for png in &pngs {
            pages.push(self.ocr_image(png)?);
        }
        Ok(pages)
    }
}

// ============================================================================
// Text-layer engine
// ============================================================================

/// Reads the PDF's embedded text layer. Pages come back separated by form
/// feeds, so splitting on `\x0C` recovers the page structure.
#[cfg(feature = "text-layer")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLayerEngine;

#[cfg(feature = "text-layer")]
impl OcrEngine for TextLayerEngine {
    fn extract_pages(&self, pdf: &Path) -> Result<Vec<String>> {
        let text = pdf_extract::extract_text(pdf)
            .with_context(|| format!("failed to extract text layer from {}", pdf.display()))?;
        let pages: Vec<String> = text.split('\x0C').map(|p| p.to_string()).collect();
        if pages.iter().all(|p| p.trim().is_empty()) {
            bail!(
                "{} has no text layer; OCR (tesseract) is required for scanned catalogs",
                pdf.display()
            );
        }
        Ok(pages)
    }
}

// ============================================================================
// Subprocess plumbing
// ============================================================================

/// Spawn `bin` with a version flag and only require that the spawn succeeds;
/// the exit status does not matter, a tool that answers anything exists.
pub(crate) fn require_binary(bin: &Path, hint: &str) -> Result<()> {
    Command::new(bin)
        .arg("--version")
        .output()
        .map(|_| ())
        .map_err(|e| {
            anyhow!(
                "required tool {} is not runnable ({e}); install it or set {hint}",
                bin.display()
            )
        })
}

pub(crate) fn run_checked(cmd: &mut Command, name: &str) -> Result<()> {
    let output = cmd
        .output()
        .with_context(|| format!("failed to spawn {name} (is POPPLER_PATH set correctly?)"))?;
    if !output.status.success() {
        bail!(
            "{name} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// A process-private scratch directory, removed on drop.
pub(crate) struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub(crate) fn create(label: &str) -> Result<Self> {
        let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "catalore-{label}-{}-{seq}",
            std::process::id()
        ));
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create scratch dir {}", path.display()))?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::find_page_boundaries;

    #[test]
    fn paginate_writes_one_marker_per_page() {
        let pages = vec!["first page".to_string(), "second page\n".to_string()];
        let text = paginate(&pages);

        let boundaries = find_page_boundaries(&text);
        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[0].1, 1);
        assert_eq!(boundaries[1].1, 2);
        assert!(text.contains("--- Page 1 ---\nfirst page\n"));
        assert!(text.contains("--- Page 2 ---\nsecond page\n"));
    }

    #[test]
    fn paginate_of_nothing_is_empty() {
        assert_eq!(paginate(&[]), "");
    }

    #[test]
    fn missing_tesseract_fails_the_availability_check() {
        let engine = TesseractEngine::new(
            Some(PathBuf::from("/nonexistent/bin/tesseract")),
            Some(PathBuf::from("/nonexistent/bin")),
        );
        let err = engine.ensure_available().unwrap_err();
        assert!(err.to_string().contains("TESSERACT_PATH"), "{err}");
    }

    #[test]
    fn missing_poppler_fails_the_availability_check() {
        // Spawning the test binary stands in for a resolvable tesseract.
        let engine = TesseractEngine::new(
            Some(std::env::current_exe().unwrap()),
            Some(PathBuf::from("/nonexistent/bin")),
        );
        let err = engine.ensure_available().unwrap_err();
        assert!(err.to_string().contains("pdftoppm"), "{err}");
        assert!(err.to_string().contains("POPPLER_PATH"), "{err}");
    }

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let path = {
            let scratch = ScratchDir::create("test").unwrap();
            assert!(scratch.path().is_dir());
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    struct FixedPages(Vec<String>);

    impl OcrEngine for FixedPages {
        fn extract_pages(&self, _pdf: &Path) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn extract_to_file_persists_paginated_text() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("extracted_text/acme.txt");
        let engine = FixedPages(vec!["LED bulb 9W".to_string()]);

        let text = extract_to_file(&engine, Path::new("acme.pdf"), &dest).unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), text);
        assert!(text.starts_with("--- Page 1 ---\n"));
    }
}
