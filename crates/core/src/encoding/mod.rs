//! Feature encoding shared by training-data export and inference.
//!
//! Column layout: `[stock_code | customer_id | country | description | unit_price]`.
//! The three categorical blocks are one-hot with a trailing unknown bucket, the
//! description block is a 3-gram similarity encoding against frequent
//! descriptions, and the final column is the raw unit price.
//!
//! A model is only meaningful with the encoder it was trained with. The encoder
//! carries a fingerprint of its fitted vocabulary and layout; callers must check
//! it with [`FeatureEncoder::ensure_compatible`] before scoring.

mod onehot;
mod similarity;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sprs::CsMat;

use crate::dataset::Transaction;
use crate::errors::DataError;

pub use onehot::CategoricalField;
pub use similarity::{ngram_similarity, PreparedSimilarity, SimilarityField};

/// Borrowed view of the five fields that make up one feature row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow<'a> {
    pub stock_code: &'a str,
    pub customer_id: &'a str,
    pub country: &'a str,
    pub description: &'a str,
    pub unit_price: f32,
}

impl<'a> From<&'a Transaction> for FeatureRow<'a> {
    fn from(transaction: &'a Transaction) -> Self {
        Self {
            stock_code: &transaction.stock_code,
            customer_id: &transaction.customer_id,
            country: &transaction.country,
            description: &transaction.description,
            unit_price: transaction.unit_price,
        }
    }
}

/// Fingerprint plus dimension: what a trained model expects from its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub fingerprint: String,
    pub feature_dim: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    stock_code: CategoricalField,
    customer_id: CategoricalField,
    country: CategoricalField,
    description: SimilarityField,
    fingerprint: String,
}

impl FeatureEncoder {
    /// Fit the encoder on the reference transactions.
    pub fn fit(reference: &[Transaction], n_prototypes: usize) -> Result<Self, DataError> {
        if reference.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        let stock_code =
            CategoricalField::fit("stock_code", reference.iter().map(|t| t.stock_code.as_str()));
        let customer_id =
            CategoricalField::fit("customer_id", reference.iter().map(|t| t.customer_id.as_str()));
        let country =
            CategoricalField::fit("country", reference.iter().map(|t| t.country.as_str()));
        let description = SimilarityField::fit(
            "description",
            reference.iter().map(|t| t.description.as_str()),
            n_prototypes,
        );

        let fingerprint = fingerprint_of(&stock_code, &customer_id, &country, &description);
        Ok(Self { stock_code, customer_id, country, description, fingerprint })
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn feature_dim(&self) -> usize {
        self.price_column() + 1
    }

    pub fn signature(&self) -> ModelSignature {
        ModelSignature { fingerprint: self.fingerprint.clone(), feature_dim: self.feature_dim() }
    }

    pub fn stock_codes(&self) -> &CategoricalField {
        &self.stock_code
    }

    pub fn customer_ids(&self) -> &CategoricalField {
        &self.customer_id
    }

    pub fn countries(&self) -> &CategoricalField {
        &self.country
    }

    pub fn descriptions(&self) -> &SimilarityField {
        &self.description
    }

    fn customer_offset(&self) -> usize {
        self.stock_code.width()
    }

    fn country_offset(&self) -> usize {
        self.customer_offset() + self.customer_id.width()
    }

    fn description_offset(&self) -> usize {
        self.country_offset() + self.country.width()
    }

    fn price_column(&self) -> usize {
        self.description_offset() + self.description.width()
    }

    /// Refuse to encode for a model fit with a different encoder.
    pub fn ensure_compatible(&self, expected: &ModelSignature) -> Result<(), DataError> {
        if expected.fingerprint != self.fingerprint {
            return Err(DataError::EncoderMismatch {
                expected: expected.fingerprint.clone(),
                actual: self.fingerprint.clone(),
            });
        }
        if expected.feature_dim != self.feature_dim() {
            return Err(DataError::DimensionMismatch {
                expected: expected.feature_dim,
                actual: self.feature_dim(),
            });
        }
        Ok(())
    }

    /// Sparse `(column, value)` pairs for one row, in ascending column order.
    pub fn encode_row(&self, row: &FeatureRow<'_>) -> Vec<(usize, f32)> {
        let prepared = self.description.prepare();
        self.encode_with(row, &prepared.encode(row.description))
    }

    fn encode_with(&self, row: &FeatureRow<'_>, description: &[(usize, f32)]) -> Vec<(usize, f32)> {
        let mut entries = Vec::with_capacity(4 + description.len());
        entries.push((self.stock_code.index_of(row.stock_code), 1.0));
        entries.push((self.customer_offset() + self.customer_id.index_of(row.customer_id), 1.0));
        entries.push((self.country_offset() + self.country.index_of(row.country), 1.0));

        let description_offset = self.description_offset();
        entries.extend(
            description.iter().map(|(column, value)| (description_offset + column, *value)),
        );

        if row.unit_price != 0.0 {
            entries.push((self.price_column(), row.unit_price));
        }
        entries
    }

    /// Encode a batch of rows into a CSR matrix with `feature_dim` columns.
    ///
    /// Description similarities are memoised per distinct description since
    /// transaction exports repeat them heavily.
    pub fn encode_rows<'a, I>(&self, rows: I) -> CsMat<f32>
    where
        I: IntoIterator<Item = FeatureRow<'a>>,
    {
        let prepared = self.description.prepare();
        let mut memo: HashMap<&'a str, Vec<(usize, f32)>> = HashMap::new();

        let mut indptr = vec![0usize];
        let mut indices = Vec::new();
        let mut data = Vec::new();

        for row in rows {
            let description =
                memo.entry(row.description).or_insert_with(|| prepared.encode(row.description));
            for (column, value) in self.encode_with(&row, description) {
                indices.push(column);
                data.push(value);
            }
            indptr.push(indices.len());
        }

        let n_rows = indptr.len() - 1;
        CsMat::new((n_rows, self.feature_dim()), indptr, indices, data)
    }

    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        let payload = serde_json::to_vec_pretty(self)
            .map_err(|source| DataError::Json { path: path.to_path_buf(), source })?;
        fs::write(path, payload)
            .map_err(|source| DataError::WriteFile { path: path.to_path_buf(), source })
    }

    pub fn load(path: &Path) -> Result<Self, DataError> {
        let raw = fs::read(path)
            .map_err(|source| DataError::ReadFile { path: path.to_path_buf(), source })?;
        serde_json::from_slice(&raw)
            .map_err(|source| DataError::Json { path: path.to_path_buf(), source })
    }
}

fn fingerprint_of(
    stock_code: &CategoricalField,
    customer_id: &CategoricalField,
    country: &CategoricalField,
    description: &SimilarityField,
) -> String {
    let mut hasher = Sha256::new();
    for field in [stock_code, customer_id, country] {
        hasher.update(b"onehot\0");
        hasher.update(field.name().as_bytes());
        for category in field.categories() {
            hasher.update(b"\0");
            hasher.update(category.as_bytes());
        }
        hasher.update(b"\n");
    }
    hasher.update(b"similarity\0");
    hasher.update(description.name().as_bytes());
    for prototype in description.prototypes() {
        hasher.update(b"\0");
        hasher.update(prototype.as_bytes());
    }
    hasher.update(b"\nunit_price");
    format!("{:x}", hasher.finalize())
}
