//! The `catalore ingest` command: PDFs in, searchable catalog out.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use catalore_ingest::images::ImageExtractor;
use catalore_ingest::ocr::{paginate, OcrEngine, TesseractEngine, TextLayerEngine};
use catalore_ingest::{
    brand_for_pdf, enrich_chunk, extract_records, list_catalog_pdfs,
    write_price_list_replacing_brand, CatalogLayout, Document, EnrichConfig, ImageCatalog,
    Segmenter,
};
use catalore_store::{Embedder, StoredRecord, StructuredStore, UpsertSummary, VectorStore};

use crate::config::{Config, OcrBackend};

const EMBED_BATCH_SIZE: usize = 32;

struct DocReport {
    pages: usize,
    chunks: usize,
    records: usize,
    upserts: UpsertSummary,
}

pub fn run(cfg: &Config) -> Result<()> {
    let layout = CatalogLayout::new(&cfg.data_dir);
    layout.ensure_dirs()?;

    let pdfs = list_catalog_pdfs(&layout.pdf_dir())?;
    if pdfs.is_empty() {
        println!(
            "{} no PDFs found in {}; drop catalogs there and rerun",
            "info:".yellow().bold(),
            layout.pdf_dir().display()
        );
        return Ok(());
    }

    let engine: Box<dyn OcrEngine> = match cfg.ocr_backend {
        OcrBackend::Tesseract => {
            let engine = TesseractEngine::new(cfg.tesseract_path.clone(), cfg.poppler_path.clone());
            // Missing OCR tooling aborts the run before any catalog is touched.
            engine.ensure_available()?;
            Box::new(engine)
        }
        OcrBackend::TextLayer => Box::new(TextLayerEngine),
    };
    let extractor = ImageExtractor::new(cfg.poppler_path.clone());
    let embedder = cfg.embedder()?;
    let mut store = VectorStore::open_or_create(&cfg.store_path(), embedder.identity())
        .context("failed to open vector store")?;
    let mut prices = StructuredStore::open_or_create(&layout.price_store_path())
        .context("failed to open price store")?;

    let mut ingested = 0usize;
    let mut failed = 0usize;
    for pdf in &pdfs {
        let brand = brand_for_pdf(pdf);
        println!(
            "{} {} ({})",
            "Ingesting".green().bold(),
            pdf.display(),
            brand
        );
        match ingest_one(pdf, &brand, &layout, engine.as_ref(), &extractor, embedder.as_ref(), &mut store, &mut prices) {
            Ok(report) => {
                println!(
                    "  {} {} pages, {} chunks ({} new, {} refreshed), {} records",
                    "→".cyan(),
                    report.pages,
                    report.chunks,
                    report.upserts.inserted,
                    report.upserts.updated,
                    report.records
                );
                ingested += 1;
            }
            Err(e) => {
                tracing::warn!(pdf = %pdf.display(), error = %e, "catalog ingestion failed");
                eprintln!("  {} {e:#}", "error:".red().bold());
                failed += 1;
            }
        }
    }

    println!(
        "{} {ingested} catalog(s) ingested, {failed} failed, store holds {} chunks",
        "ok".green().bold(),
        store.len()
    );
    Ok(())
}

fn ingest_one(
    pdf: &Path,
    brand: &str,
    layout: &CatalogLayout,
    engine: &dyn OcrEngine,
    extractor: &ImageExtractor,
    embedder: &dyn Embedder,
    store: &mut VectorStore,
    prices: &mut StructuredStore,
) -> Result<DocReport> {
    let pages = engine.extract_pages(pdf)?;
    let text = paginate(&pages);
    let text_path = layout.text_path(brand);
    std::fs::write(&text_path, &text)
        .with_context(|| format!("failed to write {}", text_path.display()))?;

    // Best-effort: a catalog with no extractable images still ingests.
    if let Err(e) = extractor.extract(pdf, brand, &pages, &layout.image_dir()) {
        tracing::warn!(pdf = %pdf.display(), error = %e, "image extraction skipped");
    }

    let doc = Document::new(&text_path, brand, text.clone());
    let mut chunks = Segmenter::default().segment(&doc);

    let images = ImageCatalog::load(&layout.image_dir());
    let enrich_cfg = EnrichConfig {
        brand: brand.to_string(),
        pdf_dir: layout.pdf_dir(),
    };
    for chunk in &mut chunks {
        enrich_chunk(chunk, &images, &enrich_cfg);
    }

    let records = extract_records(brand, &text);
    write_price_list_replacing_brand(&layout.price_list_path(), brand, &records)?;
    prices.upsert_records(&records)?;

    let mut upserts = UpsertSummary::default();
    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts)?;
        let stored: Vec<StoredRecord> = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| StoredRecord {
                key: chunk.chunk_id.clone(),
                text: chunk.text.clone(),
                vector,
                metadata: chunk.metadata.clone(),
            })
            .collect();
        let summary = store.upsert_batch(stored)?;
        upserts.inserted += summary.inserted;
        upserts.updated += summary.updated;
    }

    Ok(DocReport {
        pages: pages.len(),
        chunks: chunks.len(),
        records: records.len(),
        upserts,
    })
}
