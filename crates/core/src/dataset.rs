//! Retail transactions: CSV loading, cleaning and the train/test split.
//!
//! The cleaned transactions double as the reference data the feature encoder is
//! fit on, so cleaning must be deterministic for a given input file.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::DataError;

/// One row exactly as it appears in the transactions export.
#[derive(Debug, Clone, Deserialize)]
struct RawTransaction {
    #[serde(rename = "InvoiceNo")]
    invoice_no: String,
    #[serde(rename = "StockCode")]
    stock_code: String,
    #[serde(rename = "Description", default)]
    description: String,
    #[serde(rename = "Quantity", deserialize_with = "csv::invalid_option")]
    quantity: Option<i64>,
    #[serde(rename = "InvoiceDate", default)]
    invoice_date: String,
    #[serde(rename = "UnitPrice", deserialize_with = "csv::invalid_option")]
    unit_price: Option<f32>,
    #[serde(rename = "CustomerID", default)]
    customer_id: String,
    #[serde(rename = "Country", default)]
    country: String,
}

/// A cleaned transaction line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub invoice_no: String,
    pub stock_code: String,
    pub description: String,
    pub quantity: i64,
    pub invoice_date: String,
    pub unit_price: f32,
    pub customer_id: String,
    pub country: String,
}

/// Counts of rows dropped while cleaning, reported by the `prepare` step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub total_rows: usize,
    pub kept_rows: usize,
    pub missing_customer: usize,
    pub non_positive_quantity: usize,
    pub non_positive_price: usize,
    pub missing_description: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionSet {
    rows: Vec<Transaction>,
}

impl TransactionSet {
    pub fn new(rows: Vec<Transaction>) -> Self {
        Self { rows }
    }

    /// Load and clean a transactions CSV file.
    pub fn load(path: &Path) -> Result<(Self, CleanReport), DataError> {
        let file = File::open(path)
            .map_err(|source| DataError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_reader(file, path)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        origin: &Path,
    ) -> Result<(Self, CleanReport), DataError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut report = CleanReport::default();
        let mut rows = Vec::new();

        for record in csv_reader.deserialize::<RawTransaction>() {
            let raw = record
                .map_err(|source| DataError::Csv { path: PathBuf::from(origin), source })?;
            report.total_rows += 1;

            if let Some(transaction) = clean_row(raw, &mut report) {
                rows.push(transaction);
            }
        }

        report.kept_rows = rows.len();
        tracing::debug!(
            event_name = "data.transactions.loaded",
            path = %origin.display(),
            total_rows = report.total_rows,
            kept_rows = report.kept_rows,
            "transactions loaded"
        );
        Ok((Self { rows }, report))
    }

    pub fn rows(&self) -> &[Transaction] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Deterministically assign each row to train or test.
    ///
    /// Every row draws once from a generator seeded with `seed`, so the same
    /// file and seed always produce the same partition.
    pub fn split(&self, test_fraction: f64, seed: u64) -> (Vec<&Transaction>, Vec<&Transaction>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut train = Vec::with_capacity(self.rows.len());
        let mut test = Vec::new();

        for row in &self.rows {
            if rng.gen::<f64>() < test_fraction {
                test.push(row);
            } else {
                train.push(row);
            }
        }

        (train, test)
    }
}

/// Customer ids are exported as floats (`17850.0`); keep the integral form.
pub fn normalize_customer_id(value: &str) -> String {
    let trimmed = value.trim();
    trimmed.strip_suffix(".0").unwrap_or(trimmed).to_owned()
}

/// Hex SHA-256 of raw bytes.
pub fn content_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Digest of a file as it sits on disk, before any cleaning.
pub fn file_digest(path: &Path) -> Result<String, DataError> {
    let bytes =
        fs::read(path).map_err(|source| DataError::ReadFile { path: path.to_path_buf(), source })?;
    Ok(content_digest(&bytes))
}

fn clean_row(raw: RawTransaction, report: &mut CleanReport) -> Option<Transaction> {
    let customer_id = normalize_customer_id(&raw.customer_id);
    if customer_id.is_empty() {
        report.missing_customer += 1;
        return None;
    }

    let quantity = match raw.quantity {
        Some(quantity) if quantity > 0 => quantity,
        _ => {
            report.non_positive_quantity += 1;
            return None;
        }
    };

    let unit_price = match raw.unit_price {
        Some(price) if price > 0.0 && price.is_finite() => price,
        _ => {
            report.non_positive_price += 1;
            return None;
        }
    };

    let description = raw.description.trim().to_owned();
    if description.is_empty() {
        report.missing_description += 1;
        return None;
    }

    Some(Transaction {
        invoice_no: raw.invoice_no,
        stock_code: raw.stock_code.trim().to_owned(),
        description,
        quantity,
        invoice_date: raw.invoice_date,
        unit_price,
        customer_id,
        country: raw.country.trim().to_owned(),
    })
}
