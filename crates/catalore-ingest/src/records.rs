//! Structured record extraction from OCR'd price-list text.
//!
//! A line tokenizer classifies each non-empty line (SKU label, model label,
//! currency-prefixed price, spec keyword), and a small finite-state
//! accumulator folds the token stream into [`ProductRecord`]s. The load-
//! bearing policy is flush-on-price: a record is emitted the instant a price
//! token appears, one record per detected price, and a record that never
//! reaches a price line is silently discarded at end of input. That is a
//! normal outcome for noisy OCR, not an error.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One product parsed out of a price list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub brand: String,
    pub product_name: String,
    pub sku: String,
    pub price: String,
    pub specs: Vec<String>,
}

impl ProductRecord {
    fn fresh(brand: &str) -> Self {
        Self {
            brand: brand.to_string(),
            ..Self::default()
        }
    }

    /// Spec lines joined the way the CSV export stores them.
    pub fn specs_joined(&self) -> String {
        self.specs.join("; ")
    }
}

// ============================================================================
// Line tokenizer
// ============================================================================

/// What a single OCR line contributes to the open record.
///
/// A line can carry several tokens (e.g. both a SKU and a model label), but a
/// price line contributes nothing past the price: the flush consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineToken {
    Sku(String),
    Model(String),
    Price(String),
    Spec(String),
}

/// Compiled patterns, built once per extraction run.
#[derive(Debug)]
pub struct LinePatterns {
    sku: Regex,
    sku_label: Regex,
    model: Regex,
    model_label: Regex,
    price: Regex,
}

const SPEC_KEYWORDS: &[&str] = &["watt", "volt", "mm", "kg", "capacity", "power"];

impl Default for LinePatterns {
    fn default() -> Self {
        Self {
            sku: Regex::new(r"(?i)SKU[:\s\-]*[A-Z0-9\-]+").unwrap(),
            sku_label: Regex::new(r"(?i)SKU|:").unwrap(),
            model: Regex::new(r"(?i)Model[:\s\-]*[A-Z0-9\-]+").unwrap(),
            model_label: Regex::new(r"(?i)Model|:").unwrap(),
            price: Regex::new(r"(₹\s?\d+[,\d]*\.?\d*|Rs\.?\s?\d+[,\d]*\.?\d*)").unwrap(),
        }
    }
}

impl LinePatterns {
    /// Classify one line. Empty lines yield no tokens. Spec classification is
    /// skipped on a price line so the flush never swallows a trailing spec.
    pub fn tokenize_line(&self, line: &str) -> Vec<LineToken> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        let mut tokens = Vec::new();

        if self.sku.is_match(line) {
            tokens.push(LineToken::Sku(
                self.sku_label.replace_all(line, "").trim().to_string(),
            ));
        }
        if self.model.is_match(line) {
            tokens.push(LineToken::Model(
                self.model_label.replace_all(line, "").trim().to_string(),
            ));
        }
        if let Some(m) = self.price.find(line) {
            tokens.push(LineToken::Price(m.as_str().to_string()));
            return tokens;
        }

        let lower = line.to_lowercase();
        if SPEC_KEYWORDS.iter().any(|k| lower.contains(k)) {
            tokens.push(LineToken::Spec(line.to_string()));
        }

        tokens
    }
}

// ============================================================================
// Accumulator
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing captured since the last flush (or start of input).
    Idle,
    /// The open record has at least one captured field or spec.
    Accumulating,
}

/// Folds a token stream into emitted records.
#[derive(Debug)]
pub struct RecordAccumulator {
    brand: String,
    state: State,
    open: ProductRecord,
    emitted: Vec<ProductRecord>,
    patterns: LinePatterns,
}

impl RecordAccumulator {
    pub fn new(brand: &str) -> Self {
        Self {
            brand: brand.to_string(),
            state: State::Idle,
            open: ProductRecord::fresh(brand),
            emitted: Vec::new(),
            patterns: LinePatterns::default(),
        }
    }

    pub fn feed_line(&mut self, line: &str) {
        for token in self.patterns.tokenize_line(line) {
            match token {
                LineToken::Sku(value) => {
                    self.open.sku = value;
                    self.state = State::Accumulating;
                }
                LineToken::Model(value) => {
                    self.open.product_name = value;
                    self.state = State::Accumulating;
                }
                LineToken::Spec(value) => {
                    self.open.specs.push(value);
                    self.state = State::Accumulating;
                }
                LineToken::Price(value) => self.flush(value),
            }
        }
    }

    /// Close the open record: set the price, emit it, and start a fresh one
    /// carrying forward only the brand. A price with no accumulated fields
    /// still emits (one record per detected price).
    fn flush(&mut self, price: String) {
        let mut record = std::mem::replace(&mut self.open, ProductRecord::fresh(&self.brand));
        record.price = price;
        self.emitted.push(record);
        self.state = State::Idle;
    }

    /// End of input: whatever is still open never saw a price and is
    /// discarded.
    pub fn finish(self) -> Vec<ProductRecord> {
        self.emitted
    }

    #[cfg(test)]
    fn state(&self) -> State {
        self.state
    }
}

/// Extract all records for one brand from an OCR text blob, in price-line
/// order.
pub fn extract_records(brand: &str, text: &str) -> Vec<ProductRecord> {
    let mut acc = RecordAccumulator::new(brand);
    for line in text.lines() {
        acc.feed_line(line);
    }
    acc.finish()
}
