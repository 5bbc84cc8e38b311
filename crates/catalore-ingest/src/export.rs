//! Structured data export: the price-list CSV.
//!
//! One file per catalog type under `structured_data/`, with brand-scoped full
//! replacement on re-ingestion: rows for the brand being re-ingested are
//! dropped and the new rows appended, rows for every other brand survive
//! untouched.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::records::ProductRecord;

const HEADER: &str = "brand,product_name,sku,price,specs";
const SPEC_DELIMITER: &str = "; ";

/// Rewrite the price list with `brand`'s rows replaced by `records`.
///
/// An empty `records` leaves the file untouched (a catalog that parsed to
/// nothing is a skip, not a wipe).
pub fn write_price_list_replacing_brand(
    path: &Path,
    brand: &str,
    records: &[ProductRecord],
) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let mut rows: Vec<ProductRecord> = if path.exists() {
        read_price_list(path)?
            .into_iter()
            .filter(|r| r.brand != brand)
            .collect()
    } else {
        Vec::new()
    };
    rows.extend_from_slice(records);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    for row in &rows {
        let fields = [
            row.brand.as_str(),
            row.product_name.as_str(),
            row.sku.as_str(),
            row.price.as_str(),
            &row.specs_joined(),
        ];
        let encoded: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&encoded.join(","));
        out.push('\n');
    }

    std::fs::write(path, out)
        .with_context(|| format!("failed to write price list {}", path.display()))?;
    Ok(())
}

/// Parse the price list back into records.
pub fn read_price_list(path: &Path) -> Result<Vec<ProductRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read price list {}", path.display()))?;

    let mut rows = parse_csv(&text)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    // Drop the header row.
    rows.remove(0);

    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        if row.len() != 5 {
            bail!(
                "malformed price list row {} in {}: expected 5 fields, got {}",
                i + 2,
                path.display(),
                row.len()
            );
        }
        let mut fields = row.into_iter();
        records.push(ProductRecord {
            brand: fields.next().unwrap_or_default(),
            product_name: fields.next().unwrap_or_default(),
            sku: fields.next().unwrap_or_default(),
            price: fields.next().unwrap_or_default(),
            specs: split_specs(&fields.next().unwrap_or_default()),
        });
    }
    Ok(records)
}

fn split_specs(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        Vec::new()
    } else {
        joined.split(SPEC_DELIMITER).map(|s| s.to_string()).collect()
    }
}

// ============================================================================
// Minimal CSV encoding (RFC-4180 quoting)
// ============================================================================

fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn parse_csv(text: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => {
                row.push(std::mem::take(&mut field));
            }
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        bail!("unterminated quoted CSV field");
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    // Ignore trailing blank lines.
    rows.retain(|r| !(r.len() == 1 && r[0].is_empty()));
    Ok(rows)
}
