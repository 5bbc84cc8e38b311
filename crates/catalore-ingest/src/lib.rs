//! Catalog ingestion for Catalore
//!
//! Turns scanned/PDF product catalogs into:
//! - paginated OCR text blobs (one per catalog, with `--- Page N ---` markers)
//! - extracted product images with SKU/model-derived names
//! - overlapping text chunks with content-addressed ids and enriched metadata
//! - structured price-list records (SKU, model, price, specs) via a
//!   flush-on-price line accumulator
//!
//! The OCR engine itself (image → text) and the PDF rasterizer are external
//! collaborators invoked as subprocesses; this crate owns everything that
//! happens after text exists. Data-shape anomalies never raise: a chunk with
//! no resolvable image gets `image_path = None`, a chunk before the first page
//! marker gets `PageRef::Unknown`. Connectivity and configuration failures
//! always propagate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub mod enrich;
pub mod export;
pub mod images;
pub mod ocr;
pub mod records;
pub mod segment;

pub use enrich::{enrich_chunk, EnrichConfig, ImageCatalog};
pub use export::{read_price_list, write_price_list_replacing_brand};
pub use ocr::{OcrEngine, TesseractEngine};
pub use records::{extract_records, ProductRecord, RecordAccumulator};
pub use segment::Segmenter;

// ============================================================================
// Page references
// ============================================================================

/// Page attribution for a chunk.
///
/// OCR text carries `--- Page N ---` markers; text before the first marker
/// has no page. Keeping this a typed branch (rather than the string "N/A")
/// means callers match instead of comparing sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PageRef {
    Page(u32),
    Unknown,
}

impl PageRef {
    pub fn number(&self) -> Option<u32> {
        match self {
            PageRef::Page(n) => Some(*n),
            PageRef::Unknown => None,
        }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRef::Page(n) => write!(f, "{n}"),
            PageRef::Unknown => write!(f, "N/A"),
        }
    }
}

impl From<String> for PageRef {
    fn from(s: String) -> Self {
        match s.trim().parse::<u32>() {
            Ok(n) => PageRef::Page(n),
            Err(_) => PageRef::Unknown,
        }
    }
}

impl From<PageRef> for String {
    fn from(p: PageRef) -> Self {
        p.to_string()
    }
}

// ============================================================================
// Documents and chunks
// ============================================================================

/// One OCR'd catalog: the full paginated text plus the byte offsets where
/// each `--- Page N ---` marker starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub source_path: PathBuf,
    pub brand: String,
    pub full_text: String,
    /// `(byte_offset, page_number)`, ascending by offset.
    pub page_boundaries: Vec<(usize, u32)>,
}

impl Document {
    /// Parse page markers out of an OCR text blob.
    pub fn new(source_path: impl Into<PathBuf>, brand: impl Into<String>, full_text: String) -> Self {
        let page_boundaries = segment::find_page_boundaries(&full_text);
        Self {
            source_path: source_path.into(),
            brand: brand.into(),
            full_text,
            page_boundaries,
        }
    }

    /// Page of the nearest marker at or before `offset`, or `Unknown` if no
    /// marker precedes it.
    pub fn page_at(&self, offset: usize) -> PageRef {
        match self
            .page_boundaries
            .partition_point(|(start, _)| *start <= offset)
        {
            0 => PageRef::Unknown,
            n => PageRef::Page(self.page_boundaries[n - 1].1),
        }
    }
}

/// Chunk metadata filled in by the enricher. Every field that can be absent
/// is an `Option`, not a magic string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub brand: String,
    pub product_name: String,
    pub page: PageRef,
    pub image_path: Option<PathBuf>,
    pub pdf_path: PathBuf,
    pub source_file: String,
}

impl Default for ChunkMetadata {
    fn default() -> Self {
        Self {
            brand: String::new(),
            product_name: String::new(),
            page: PageRef::Unknown,
            image_path: None,
            pdf_path: PathBuf::new(),
            source_file: String::new(),
        }
    }
}

/// A bounded, overlapping slice of a document's text: the unit of embedding
/// and retrieval.
///
/// `chunk_id` is content-addressed over `(source_path, sha256(text))`, so
/// re-segmenting unchanged input reproduces the same ids and any byte-level
/// text change produces a new one. It is the natural key for store upserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    pub source_path: PathBuf,
    pub metadata: ChunkMetadata,
}

/// Content-addressed chunk identity.
pub fn chunk_id_for(source_path: &Path, text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    format!("{}_{}", source_path.display(), hex_lower(&digest))
}

pub(crate) fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
    }
    out
}

// ============================================================================
// Catalog directory layout
// ============================================================================

/// The fixed on-disk tree the pipeline reads and writes.
#[derive(Debug, Clone)]
pub struct CatalogLayout {
    pub root: PathBuf,
}

impl CatalogLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Source PDFs.
    pub fn pdf_dir(&self) -> PathBuf {
        self.root.join("pdf_catalogs")
    }

    /// OCR'd text, one `<brand>.txt` per catalog.
    pub fn text_dir(&self) -> PathBuf {
        self.root.join("extracted_text")
    }

    /// Extracted product images.
    pub fn image_dir(&self) -> PathBuf {
        self.root.join("product_images")
    }

    /// Structured exports (price list CSV and the keyed price store).
    pub fn structured_dir(&self) -> PathBuf {
        self.root.join("structured_data")
    }

    pub fn price_list_path(&self) -> PathBuf {
        self.structured_dir().join("price_list.csv")
    }

    pub fn price_store_path(&self) -> PathBuf {
        self.structured_dir().join("price_store.cbor")
    }

    pub fn text_path(&self, brand: &str) -> PathBuf {
        self.text_dir().join(format!("{brand}.txt"))
    }

    /// Create the output subdirectories (the PDF dir is caller-supplied).
    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(self.text_dir())?;
        std::fs::create_dir_all(self.image_dir())?;
        std::fs::create_dir_all(self.structured_dir())?;
        Ok(())
    }
}

/// List the `*.pdf` files under a directory, sorted by file name so that runs
/// are deterministic.
pub fn list_catalog_pdfs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();
    if !dir.exists() {
        return Ok(pdfs);
    }
    for entry in walkdir::WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path
            .extension()
            .map_or(false, |e| e.eq_ignore_ascii_case("pdf"))
        {
            pdfs.push(path.to_path_buf());
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

/// Brand identifier for a catalog file: the file stem, verbatim.
pub fn brand_for_pdf(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "catalog".to_string())
}
