//! Keyed store for structured price records.
//!
//! The CSV price list is the human-readable export; this file is the keyed
//! counterpart the pipeline upserts into, so re-ingesting a catalog updates
//! each product's price in place instead of appending a duplicate row. SKU is
//! the key; a record the extractor could not attach a SKU to has no identity
//! to upsert under and is skipped here (it still reaches the CSV).

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use catalore_ingest::ProductRecord;

use crate::{unix_now, UpsertSummary};

pub const PRICE_STORE_FILE_VERSION_V1: &str = "catalore_prices_v1";

#[derive(Debug, Serialize, Deserialize)]
struct PriceStoreFileV1 {
    version: String,
    created_at_unix_secs: u64,
    records: Vec<ProductRecord>,
}

/// On-disk map of SKU to [`ProductRecord`]. All mutation goes through
/// [`upsert_records`], which persists before returning.
///
/// [`upsert_records`]: StructuredStore::upsert_records
#[derive(Debug)]
pub struct StructuredStore {
    path: PathBuf,
    created_at_unix_secs: u64,
    records: BTreeMap<String, ProductRecord>,
}

impl StructuredStore {
    /// Open the price store at `path`, creating an empty one if the file does
    /// not exist.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                created_at_unix_secs: unix_now(),
                records: BTreeMap::new(),
            });
        }

        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read price store {}", path.display()))?;
        let file: PriceStoreFileV1 = ciborium::de::from_reader(bytes.as_slice())
            .map_err(|e| anyhow!("failed to CBOR-decode price store {}: {e}", path.display()))?;
        if file.version != PRICE_STORE_FILE_VERSION_V1 {
            bail!(
                "unsupported price store version: {} (expected {PRICE_STORE_FILE_VERSION_V1})",
                file.version
            );
        }

        let mut records = BTreeMap::new();
        for record in file.records {
            records.insert(record.sku.clone(), record);
        }
        Ok(Self {
            path: path.to_path_buf(),
            created_at_unix_secs: file.created_at_unix_secs,
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, sku: &str) -> Option<&ProductRecord> {
        self.records.get(sku)
    }

    /// Insert or overwrite records keyed by SKU, then persist. Records with
    /// an empty SKU are not counted in the summary.
    pub fn upsert_records(&mut self, records: &[ProductRecord]) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        for record in records {
            if record.sku.is_empty() {
                tracing::debug!(brand = %record.brand, price = %record.price, "record has no SKU to key on; skipped");
                continue;
            }
            match self.records.insert(record.sku.clone(), record.clone()) {
                Some(_) => summary.updated += 1,
                None => summary.inserted += 1,
            }
        }
        if summary.inserted + summary.updated > 0 {
            self.save()?;
        }

        tracing::debug!(
            inserted = summary.inserted,
            updated = summary.updated,
            total = self.records.len(),
            "upserted price records"
        );
        Ok(summary)
    }

    fn save(&self) -> Result<()> {
        let file = PriceStoreFileV1 {
            version: PRICE_STORE_FILE_VERSION_V1.to_string(),
            created_at_unix_secs: self.created_at_unix_secs,
            records: self.records.values().cloned().collect(),
        };

        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&file, &mut bytes)
            .map_err(|e| anyhow!("failed to CBOR-encode price store: {e}"))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // Write-then-rename, same as the vector store.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(sku: &str, price: &str) -> ProductRecord {
        ProductRecord {
            brand: "acme".to_string(),
            product_name: "AX-100".to_string(),
            sku: sku.to_string(),
            price: price.to_string(),
            specs: vec!["Watt: 9".to_string()],
        }
    }

    #[test]
    fn upsert_is_keyed_by_sku() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prices.cbor");
        let mut store = StructuredStore::open_or_create(&path).unwrap();

        let batch = vec![record("482910", "₹499"), record("560001", "₹299")];
        let first = store.upsert_records(&batch).unwrap();
        assert_eq!(first, UpsertSummary { inserted: 2, updated: 0 });

        let second = store.upsert_records(&batch).unwrap();
        assert_eq!(second, UpsertSummary { inserted: 0, updated: 2 });
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn reupsert_overwrites_the_price_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prices.cbor");
        let mut store = StructuredStore::open_or_create(&path).unwrap();

        store.upsert_records(&[record("482910", "₹499")]).unwrap();
        store.upsert_records(&[record("482910", "₹549")]).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("482910").unwrap().price, "₹549");
    }

    #[test]
    fn records_without_a_sku_are_not_keyed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prices.cbor");
        let mut store = StructuredStore::open_or_create(&path).unwrap();

        let summary = store
            .upsert_records(&[record("", "₹120"), record("482910", "₹499")])
            .unwrap();
        assert_eq!(summary, UpsertSummary { inserted: 1, updated: 0 });
        assert_eq!(store.len(), 1);
        assert!(store.get("").is_none());
    }

    #[test]
    fn price_store_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prices.cbor");
        {
            let mut store = StructuredStore::open_or_create(&path).unwrap();
            store.upsert_records(&[record("482910", "₹499")]).unwrap();
        }

        let store = StructuredStore::open_or_create(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("482910").unwrap().price, "₹499");
    }
}
