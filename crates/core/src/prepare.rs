//! Local dataset preparation: clean, split, fit the encoder, export matrices.

use std::fs;

use chrono::Utc;
use serde::Serialize;

use crate::config::DataConfig;
use crate::dataset::{file_digest, CleanReport, Transaction, TransactionSet};
use crate::encoding::{FeatureEncoder, FeatureRow};
use crate::errors::DataError;
use crate::matrix::write_libsvm_file;
use crate::state::DatasetState;

#[derive(Debug, Clone, Serialize)]
pub struct PrepareSummary {
    pub clean: CleanReport,
    pub feature_dim: usize,
    pub fingerprint: String,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Prepare training inputs in `config.work_dir`.
///
/// The encoder is fit on every cleaned transaction; that same file is the
/// reference data `recommend` later derives candidate rows from.
pub fn prepare_dataset(config: &DataConfig) -> Result<(DatasetState, PrepareSummary), DataError> {
    let reference_digest = file_digest(&config.transactions_path)?;
    let (transactions, clean) = TransactionSet::load(&config.transactions_path)?;
    if transactions.is_empty() {
        return Err(DataError::EmptyDataset);
    }

    fs::create_dir_all(&config.work_dir)
        .map_err(|source| DataError::WriteFile { path: config.work_dir.clone(), source })?;

    let encoder = FeatureEncoder::fit(transactions.rows(), config.n_prototypes)?;
    let encoder_path = config.work_dir.join("encoder.json");
    encoder.save(&encoder_path)?;

    let (train, test) = transactions.split(config.test_fraction, config.seed);
    let train_path = config.work_dir.join("train.libsvm");
    let test_path = config.work_dir.join("test.libsvm");
    export(&encoder, &train, &train_path)?;
    export(&encoder, &test, &test_path)?;

    tracing::info!(
        event_name = "data.prepare.completed",
        fingerprint = encoder.fingerprint(),
        feature_dim = encoder.feature_dim(),
        train_rows = train.len(),
        test_rows = test.len(),
        "training inputs exported"
    );

    let summary = PrepareSummary {
        clean,
        feature_dim: encoder.feature_dim(),
        fingerprint: encoder.fingerprint().to_owned(),
        train_rows: train.len(),
        test_rows: test.len(),
    };
    let state = DatasetState {
        encoder_path,
        signature: encoder.signature(),
        train_path,
        test_path,
        train_uri: config.train_uri.clone(),
        test_uri: config.test_uri.clone(),
        train_rows: train.len(),
        test_rows: test.len(),
        reference_digest,
        uploaded: None,
        prepared_at: Utc::now(),
    };
    Ok((state, summary))
}

fn export(
    encoder: &FeatureEncoder,
    rows: &[&Transaction],
    path: &std::path::Path,
) -> Result<(), DataError> {
    let matrix = encoder.encode_rows(rows.iter().map(|row| FeatureRow::from(*row)));
    let targets: Vec<f32> = rows.iter().map(|row| row.quantity as f32).collect();
    write_libsvm_file(&matrix, &targets, path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::prepare_dataset;
    use crate::config::AppConfig;
    use crate::dataset::file_digest;
    use crate::encoding::FeatureEncoder;

    const CSV: &str = "\
InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country
536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01 08:26:00,2.55,17850.0,United Kingdom
536365,71053,WHITE METAL LANTERN,6,2010-12-01 08:26:00,3.39,17850.0,United Kingdom
536366,22633,HAND WARMER UNION JACK,6,2010-12-01 08:28:00,1.85,17850.0,United Kingdom
536367,84879,ASSORTED COLOUR BIRD ORNAMENT,32,2010-12-01 08:34:00,1.69,13047.0,United Kingdom
536368,22960,JAM MAKING SET WITH JARS,6,2010-12-01 08:34:00,4.25,13047.0,United Kingdom
536370,22728,ALARM CLOCK BAKELIKE PINK,24,2010-12-01 08:45:00,3.75,12583.0,France
C536379,D,Discount,-1,2010-12-01 09:41:00,27.5,14527.0,United Kingdom
";

    #[test]
    fn prepare_writes_encoder_and_matrices() {
        let dir = TempDir::new().expect("temp dir");
        let csv_path = dir.path().join("transactions.csv");
        fs::write(&csv_path, CSV).expect("write csv");

        let mut config = AppConfig::default().data;
        config.transactions_path = csv_path;
        config.work_dir = dir.path().join("work");
        config.n_prototypes = 3;

        let (state, summary) = prepare_dataset(&config).expect("prepare");

        assert_eq!(summary.clean.kept_rows, 6);
        assert_eq!(state.train_rows + state.test_rows, 6);
        assert_eq!(state.signature.feature_dim, summary.feature_dim);

        assert_eq!(state.reference_digest, file_digest(&config.transactions_path).expect("digest"));
        assert!(state.uploaded.is_none());

        let encoder = FeatureEncoder::load(&state.encoder_path).expect("encoder");
        assert_eq!(encoder.signature(), state.signature);

        let train = fs::read_to_string(&state.train_path).expect("train file");
        let test = fs::read_to_string(&state.test_path).expect("test file");
        assert_eq!(train.lines().count() + test.lines().count(), 6);
    }

    #[test]
    fn prepare_rejects_files_without_usable_rows() {
        let dir = TempDir::new().expect("temp dir");
        let csv_path = dir.path().join("transactions.csv");
        fs::write(&csv_path, CSV.lines().take(1).collect::<Vec<_>>().join("\n")).expect("write");

        let mut config = AppConfig::default().data;
        config.transactions_path = csv_path;
        config.work_dir = dir.path().join("work");

        let error = prepare_dataset(&config).expect_err("empty");
        assert_eq!(error.error_class(), "data");
    }
}
