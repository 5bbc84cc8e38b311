//! Deterministic token-hash embeddings.
//!
//! Each lowercased alphanumeric token is hashed into one of `dim` buckets and
//! the bucket counts are L2-normalized. No network, no model weights, fully
//! reproducible; retrieval quality is bag-of-words, which is enough for tests
//! and offline smoke runs against small catalogs.

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};

use catalore_store::{Embedder, EmbedderIdentity};

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            bail!("hash embedder dimension must be positive");
        }
        Ok(Self { dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_be_bytes(prefix) % self.dim as u64) as usize;
            v[bucket] += 1.0;
        }
        normalize_in_place(&mut v);
        v
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn normalize_in_place(v: &mut [f32]) {
    let mut norm2 = 0.0f32;
    for x in v.iter() {
        norm2 += x * x;
    }
    if norm2 <= 0.0 {
        return;
    }
    let inv = 1.0f32 / norm2.sqrt();
    for x in v.iter_mut() {
        *x *= inv;
    }
}

impl Embedder for HashEmbedder {
    fn identity(&self) -> EmbedderIdentity {
        EmbedderIdentity::new("hash", format!("token-hash-{}", self.dim))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_deterministic() {
        let e = HashEmbedder::new(64).unwrap();
        let a = e.embed_one("LED bulb 9W warm white").unwrap();
        let b = e.embed_one("LED bulb 9W warm white").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn vectors_are_unit_length() {
        let e = HashEmbedder::new(32).unwrap();
        let v = e.embed_one("tube light 20W cool daylight").unwrap();
        let norm2: f32 = v.iter().map(|x| x * x).sum();
        assert!((norm2 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_embeds_to_zero() {
        let e = HashEmbedder::new(16).unwrap();
        let v = e.embed_one("   ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn shared_tokens_raise_similarity() {
        let e = HashEmbedder::new(128).unwrap();
        let bulb = e.embed_one("led bulb warm white").unwrap();
        let also_bulb = e.embed_one("bulb led bright white").unwrap();
        let fan = e.embed_one("ceiling fan remote").unwrap();

        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&bulb, &also_bulb) > dot(&bulb, &fan));
    }

    #[test]
    fn zero_dim_is_rejected() {
        assert!(HashEmbedder::new(0).is_err());
    }
}
