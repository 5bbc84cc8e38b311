//! Environment-driven configuration.
//!
//! Everything comes from the process environment (a local `.env` is loaded
//! first for development). Each command validates what it needs at startup
//! and aborts with a clear message before any work begins.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

use catalore_chat::HashEmbedder;
use catalore_store::Embedder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedBackend {
    Ollama,
    Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrBackend {
    Tesseract,
    TextLayer,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the catalog data tree (PDFs in, everything else out).
    pub data_dir: PathBuf,
    pub embed_backend: EmbedBackend,
    pub ocr_backend: OcrBackend,
    pub ollama_host: String,
    pub embed_model: String,
    pub chat_model: String,
    pub hash_dim: usize,
    pub tesseract_path: Option<PathBuf>,
    pub poppler_path: Option<PathBuf>,
    pub top_k: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env if present (local development).
        dotenvy::dotenv().ok();

        let embed_backend = match env::var("CATALORE_EMBED_BACKEND")
            .unwrap_or_else(|_| "ollama".to_string())
            .to_lowercase()
            .as_str()
        {
            "ollama" => EmbedBackend::Ollama,
            "hash" => EmbedBackend::Hash,
            other => bail!("CATALORE_EMBED_BACKEND must be `ollama` or `hash`, got `{other}`"),
        };

        let ocr_backend = match env::var("CATALORE_OCR_BACKEND")
            .unwrap_or_else(|_| "tesseract".to_string())
            .to_lowercase()
            .as_str()
        {
            "tesseract" => OcrBackend::Tesseract,
            "text-layer" => OcrBackend::TextLayer,
            other => bail!("CATALORE_OCR_BACKEND must be `tesseract` or `text-layer`, got `{other}`"),
        };

        Ok(Config {
            data_dir: PathBuf::from(
                env::var("CATALORE_DATA_DIR").unwrap_or_else(|_| "catalog_data".to_string()),
            ),
            embed_backend,
            ocr_backend,
            ollama_host: env::var("OLLAMA_HOST").unwrap_or_default(),
            embed_model: env::var("CATALORE_EMBED_MODEL")
                .unwrap_or_else(|_| "nomic-embed-text".to_string()),
            chat_model: env::var("CATALORE_CHAT_MODEL")
                .unwrap_or_else(|_| "llama3.2".to_string()),
            hash_dim: env::var("CATALORE_HASH_DIM")
                .unwrap_or_else(|_| "384".to_string())
                .parse()
                .context("failed to parse CATALORE_HASH_DIM")?,
            tesseract_path: env::var("TESSERACT_PATH").ok().map(PathBuf::from),
            poppler_path: env::var("POPPLER_PATH").ok().map(PathBuf::from),
            top_k: env::var("CATALORE_TOP_K")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("failed to parse CATALORE_TOP_K")?,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("vector_store.cbor")
    }

    pub fn embedder(&self) -> Result<Box<dyn Embedder>> {
        match self.embed_backend {
            EmbedBackend::Ollama => Ok(Box::new(catalore_chat::OllamaClient::new(
                &self.ollama_host,
                &self.chat_model,
                &self.embed_model,
            ))),
            EmbedBackend::Hash => Ok(Box::new(HashEmbedder::new(self.hash_dim)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var reads are process-global, so the defaults test leaves the
    // variables it cares about unset rather than mutating them.
    #[test]
    fn defaults_are_sane() {
        let cfg = Config::from_env().unwrap();
        assert!(cfg.top_k > 0);
        assert!(cfg.hash_dim > 0);
        assert!(!cfg.embed_model.is_empty());
        assert!(!cfg.chat_model.is_empty());
        assert_eq!(cfg.store_path().file_name().unwrap(), "vector_store.cbor");
    }
}
