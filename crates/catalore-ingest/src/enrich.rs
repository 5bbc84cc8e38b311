//! Chunk metadata enrichment.
//!
//! Associates each chunk with a product image, a display name, and a pointer
//! back into the source PDF. Image resolution is a strict priority chain
//! (SKU token, then `model:` token, then page fallback) and the first match
//! wins. Enrichment is pure given the chunk and the image directory listing;
//! a chunk nothing matches simply keeps `image_path = None`.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::{Chunk, PageRef};

pub(crate) fn sku_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3,}\b").unwrap())
}

pub(crate) fn model_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"model\s*[:\-]?\s*([a-z0-9\-]+)").unwrap())
}

// ============================================================================
// Image catalog
// ============================================================================

/// A snapshot of the product-image directory.
///
/// The listing is read once and sorted, so resolution is deterministic for a
/// given directory state and does not touch the filesystem per chunk.
#[derive(Debug, Clone, Default)]
pub struct ImageCatalog {
    dir: PathBuf,
    files: Vec<String>,
}

impl ImageCatalog {
    /// Load the file names under `dir`. A missing directory is an empty
    /// catalog, not an error: every chunk then degrades to `None`.
    pub fn load(dir: &Path) -> Self {
        let mut files = Vec::new();
        match std::fs::read_dir(dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    if entry.file_type().map_or(false, |t| t.is_file()) {
                        files.push(entry.file_name().to_string_lossy().to_string());
                    }
                }
            }
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "image directory not readable; chunks will have no images");
            }
        }
        files.sort();
        Self {
            dir: dir.to_path_buf(),
            files,
        }
    }

    #[cfg(test)]
    pub fn from_names(dir: &Path, mut names: Vec<String>) -> Self {
        names.sort();
        Self {
            dir: dir.to_path_buf(),
            files: names,
        }
    }

    fn first_starting_with(&self, prefix: &str) -> Option<PathBuf> {
        self.files
            .iter()
            .find(|f| f.starts_with(prefix))
            .map(|f| self.dir.join(f))
    }

    fn first_containing(&self, needle: &str) -> Option<PathBuf> {
        self.files
            .iter()
            .find(|f| f.contains(needle))
            .map(|f| self.dir.join(f))
    }
}

// ============================================================================
// Enrichment
// ============================================================================

/// Fixed per-run enrichment inputs.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Catalog identifier supplied by ingestion configuration; not inferred
    /// per chunk.
    pub brand: String,
    /// Where the original PDFs live (for `pdf_path`).
    pub pdf_dir: PathBuf,
}

/// Fill in the chunk's metadata in place. `page` is set by the segmenter and
/// left untouched here.
pub fn enrich_chunk(chunk: &mut Chunk, images: &ImageCatalog, cfg: &EnrichConfig) {
    let source_file = chunk
        .source_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    chunk.metadata.brand = cfg.brand.clone();
    chunk.metadata.product_name = product_name_from_source(&chunk.source_path);
    chunk.metadata.image_path = resolve_image(&chunk.text, chunk.metadata.page, images);
    chunk.metadata.pdf_path = cfg.pdf_dir.join(source_file.replace(".txt", ".pdf"));
    chunk.metadata.source_file = source_file;
}

/// Display name derived from the source file's base name: lower-cased,
/// hyphens to spaces, title-cased.
pub fn product_name_from_source(source_path: &Path) -> String {
    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    stem.replace('-', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Image resolution priority chain; first match wins.
fn resolve_image(text: &str, page: PageRef, images: &ImageCatalog) -> Option<PathBuf> {
    let text = text.to_lowercase();

    // 1. SKU match: a numeric token of >= 3 digits.
    if let Some(m) = sku_token_re().find(&text) {
        if let Some(path) = images.first_starting_with(m.as_str()) {
            return Some(path);
        }
    }

    // 2. Model match, normalized to the underscore form used by image naming.
    if let Some(caps) = model_token_re().captures(&text) {
        let model = normalize_name_token(&caps[1]);
        if let Some(path) = images.first_starting_with(&model) {
            return Some(path);
        }
    }

    // 3. Page fallback.
    if let PageRef::Page(n) = page {
        if let Some(path) = images.first_containing(&format!("_page{n}_")) {
            return Some(path);
        }
    }

    None
}

/// Lower-case and collapse anything outside `[a-z0-9]` to `_`, matching the
/// naming used when images are extracted.
pub fn normalize_name_token(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chunk_id_for, ChunkMetadata};

    fn chunk(text: &str, page: PageRef) -> Chunk {
        let source = PathBuf::from("catalog_data/extracted_text/philips-lighting.txt");
        Chunk {
            chunk_id: chunk_id_for(&source, text),
            text: text.to_string(),
            source_path: source,
            metadata: ChunkMetadata {
                page,
                ..ChunkMetadata::default()
            },
        }
    }

    fn catalog(names: &[&str]) -> ImageCatalog {
        ImageCatalog::from_names(
            Path::new("catalog_data/product_images"),
            names.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn cfg() -> EnrichConfig {
        EnrichConfig {
            brand: "philips".to_string(),
            pdf_dir: PathBuf::from("catalog_data/pdf_catalogs"),
        }
    }

    #[test]
    fn sku_match_beats_model_match() {
        let images = catalog(&["482910_a.png", "ax100_b.png"]);
        let mut c = chunk("great bulb, model: ax100, serial 482910 in stock", PageRef::Page(2));
        enrich_chunk(&mut c, &images, &cfg());
        assert_eq!(
            c.metadata.image_path.as_deref(),
            Some(Path::new("catalog_data/product_images/482910_a.png"))
        );
    }

    #[test]
    fn model_match_normalizes_token() {
        let images = catalog(&["tl_20_1.png"]);
        let mut c = chunk("tube light Model: TL-20 cool daylight", PageRef::Unknown);
        enrich_chunk(&mut c, &images, &cfg());
        assert_eq!(
            c.metadata.image_path.as_deref(),
            Some(Path::new("catalog_data/product_images/tl_20_1.png"))
        );
    }

    #[test]
    fn page_fallback_when_no_sku_or_model() {
        let images = catalog(&["philips_page3_1.png"]);
        let mut c = chunk("assorted fixtures and mounts", PageRef::Page(3));
        enrich_chunk(&mut c, &images, &cfg());
        assert_eq!(
            c.metadata.image_path.as_deref(),
            Some(Path::new("catalog_data/product_images/philips_page3_1.png"))
        );
    }

    #[test]
    fn no_match_degrades_to_none() {
        let images = catalog(&["unrelated.png"]);
        let mut c = chunk("assorted fixtures and mounts", PageRef::Unknown);
        enrich_chunk(&mut c, &images, &cfg());
        assert_eq!(c.metadata.image_path, None);
    }

    #[test]
    fn names_and_paths_are_derived_from_source() {
        let images = catalog(&[]);
        let mut c = chunk("anything", PageRef::Page(1));
        enrich_chunk(&mut c, &images, &cfg());

        assert_eq!(c.metadata.product_name, "Philips Lighting");
        assert_eq!(c.metadata.brand, "philips");
        assert_eq!(c.metadata.source_file, "philips-lighting.txt");
        assert_eq!(
            c.metadata.pdf_path,
            PathBuf::from("catalog_data/pdf_catalogs/philips-lighting.pdf")
        );
    }

    #[test]
    fn enrichment_is_pure() {
        let images = catalog(&["482910_a.png"]);
        let mut a = chunk("serial 482910", PageRef::Page(1));
        let mut b = a.clone();
        enrich_chunk(&mut a, &images, &cfg());
        enrich_chunk(&mut b, &images, &cfg());
        assert_eq!(a.metadata, b.metadata);
    }
}
