//! Embedding store and vector retrieval for Catalore
//!
//! A single-file CBOR store of `(key, text, vector, metadata)` records, keyed
//! by content-addressed chunk id so that upserts are idempotent: re-ingesting
//! an unchanged catalog rewrites existing records in place and the store does
//! not grow. The file records which embedding backend and model produced its
//! vectors; opening it with a different identity is a hard error, because
//! vectors from different models share no geometry and silently mixing them
//! would corrupt every later similarity ranking.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use catalore_ingest::ChunkMetadata;

pub mod structured;
pub use structured::StructuredStore;

pub const STORE_FILE_VERSION_V1: &str = "catalore_store_v1";

// ============================================================================
// Embedder seam
// ============================================================================

/// Which embedding space a set of vectors lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedderIdentity {
    pub backend: String,
    pub model: String,
}

impl EmbedderIdentity {
    pub fn new(backend: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for EmbedderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.backend, self.model)
    }
}

/// Turns text into vectors. Implementations live with the LLM clients; the
/// store only needs the seam.
pub trait Embedder {
    fn identity(&self) -> EmbedderIdentity;

    /// Embed a batch of texts, one vector per input, in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("embedder returned no vector for single input"))
    }
}

// ============================================================================
// Records and file format
// ============================================================================

/// One embedded chunk as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFileV1 {
    version: String,
    created_at_unix_secs: u64,
    backend: String,
    model: String,
    #[serde(default)]
    dim: Option<usize>,
    records: Vec<StoredRecord>,
}

/// Outcome of an upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// One retrieval result, best first.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub key: String,
    pub text: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

// ============================================================================
// Store
// ============================================================================

/// The on-disk vector store. All mutation goes through [`upsert_batch`],
/// which persists before returning.
///
/// [`upsert_batch`]: VectorStore::upsert_batch
#[derive(Debug)]
pub struct VectorStore {
    path: PathBuf,
    identity: EmbedderIdentity,
    created_at_unix_secs: u64,
    /// Learned from the first upserted batch, then enforced.
    dim: Option<usize>,
    records: BTreeMap<String, StoredRecord>,
}

impl VectorStore {
    /// Open the store at `path`, creating an empty one if the file does not
    /// exist. An existing file whose embedding identity differs from
    /// `identity` is refused.
    pub fn open_or_create(path: &Path, identity: EmbedderIdentity) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                identity,
                created_at_unix_secs: unix_now(),
                dim: None,
                records: BTreeMap::new(),
            });
        }

        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read store file {}", path.display()))?;
        let file: StoreFileV1 = ciborium::de::from_reader(bytes.as_slice())
            .map_err(|e| anyhow!("failed to CBOR-decode store file {}: {e}", path.display()))?;
        if file.version != STORE_FILE_VERSION_V1 {
            bail!(
                "unsupported store file version: {} (expected {STORE_FILE_VERSION_V1})",
                file.version
            );
        }

        let stored = EmbedderIdentity::new(file.backend, file.model);
        if stored != identity {
            bail!(
                "store {} holds {} vectors but the configured embedder is {}; \
                 re-ingest into a fresh store to switch models",
                path.display(),
                stored,
                identity
            );
        }

        let mut records = BTreeMap::new();
        for record in file.records {
            if let Some(dim) = file.dim {
                if record.vector.len() != dim {
                    bail!(
                        "store {} is corrupt: record {} has dim {} (expected {dim})",
                        path.display(),
                        record.key,
                        record.vector.len()
                    );
                }
            }
            records.insert(record.key.clone(), record);
        }

        Ok(Self {
            path: path.to_path_buf(),
            identity,
            created_at_unix_secs: file.created_at_unix_secs,
            dim: file.dim,
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn identity(&self) -> &EmbedderIdentity {
        &self.identity
    }

    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Insert or overwrite records by key, then persist.
    ///
    /// The whole batch is validated first (every vector the same dimension,
    /// matching the store's learned dimension); a bad batch changes nothing.
    pub fn upsert_batch(&mut self, batch: Vec<StoredRecord>) -> Result<UpsertSummary> {
        if batch.is_empty() {
            return Ok(UpsertSummary::default());
        }

        let batch_dim = batch[0].vector.len();
        if batch_dim == 0 {
            bail!("refusing to store zero-dimensional vectors");
        }
        for record in &batch {
            if record.vector.len() != batch_dim {
                bail!(
                    "mixed vector dimensions in upsert batch: {} has {} (expected {batch_dim})",
                    record.key,
                    record.vector.len()
                );
            }
        }
        if let Some(dim) = self.dim {
            if batch_dim != dim {
                bail!(
                    "upsert batch has dim {batch_dim} but store {} holds dim {dim}",
                    self.path.display()
                );
            }
        }

        let mut summary = UpsertSummary::default();
        for record in batch {
            match self.records.insert(record.key.clone(), record) {
                Some(_) => summary.updated += 1,
                None => summary.inserted += 1,
            }
        }
        self.dim = Some(batch_dim);
        self.save()?;

        tracing::debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            total = self.records.len(),
            "upserted embedding batch"
        );
        Ok(summary)
    }

    fn save(&self) -> Result<()> {
        let file = StoreFileV1 {
            version: STORE_FILE_VERSION_V1.to_string(),
            created_at_unix_secs: self.created_at_unix_secs,
            backend: self.identity.backend.clone(),
            model: self.identity.model.clone(),
            dim: self.dim,
            records: self.records.values().cloned().collect(),
        };

        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&file, &mut bytes)
            .map_err(|e| anyhow!("failed to CBOR-encode store file: {e}"))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // Write-then-rename so a crash mid-save never truncates the store.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Top-`k` records by cosine similarity to `query`, best first.
    /// An empty store yields an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(dim) = self.dim {
            if query.len() != dim {
                bail!("query vector has dim {} but store holds dim {dim}", query.len());
            }
        }

        let mut hits: Vec<SearchHit> = self
            .records
            .values()
            .map(|r| SearchHit {
                key: r.key.clone(),
                text: r.text.clone(),
                score: cosine_similarity(query, &r.vector),
                metadata: r.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
        hits.truncate(k);
        Ok(hits)
    }
}

/// Embed `query` and search the store with it. The embedder must be the one
/// the store was built with.
pub fn retrieve(
    store: &VectorStore,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
) -> Result<Vec<SearchHit>> {
    let identity = embedder.identity();
    if &identity != store.identity() {
        bail!(
            "retrieval embedder {} does not match store identity {}",
            identity,
            store.identity()
        );
    }
    if store.is_empty() {
        return Ok(Vec::new());
    }
    let vector = embedder.embed_one(query)?;
    store.search(&vector, k)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
