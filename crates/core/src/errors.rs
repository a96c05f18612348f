use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("could not read `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not write `{path}`: {source}")]
    WriteFile { path: PathBuf, source: std::io::Error },
    #[error("malformed transactions csv `{path}`: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("malformed json document `{path}`: {source}")]
    Json { path: PathBuf, source: serde_json::Error },
    #[error("dataset has no usable rows after cleaning")]
    EmptyDataset,
    #[error(
        "encoder fingerprint `{actual}` does not match the `{expected}` the model was trained with"
    )]
    EncoderMismatch { expected: String, actual: String },
    #[error("feature dimension {actual} does not match the model dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("endpoint returned {actual} scores for {expected} candidates")]
    ScoreCountMismatch { expected: usize, actual: usize },
    #[error(
        "reference data `{path}` changed since `recfm prepare` (digest {actual}, expected {expected})"
    )]
    ReferenceChanged { path: PathBuf, expected: String, actual: String },
    #[error("workflow step `{step}` has not been run yet: {hint}")]
    MissingState { step: &'static str, hint: &'static str },
}

impl DataError {
    /// Stable classification used in structured command output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::ReadFile { .. } | Self::WriteFile { .. } => "io",
            Self::Csv { .. } | Self::Json { .. } | Self::EmptyDataset => "data",
            Self::EncoderMismatch { .. }
            | Self::DimensionMismatch { .. }
            | Self::ScoreCountMismatch { .. }
            | Self::ReferenceChanged { .. } => "model_contract",
            Self::MissingState { .. } => "missing_state",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DataError;

    #[test]
    fn encoder_mismatch_is_a_model_contract_error() {
        let error = DataError::EncoderMismatch {
            expected: "abc".to_owned(),
            actual: "def".to_owned(),
        };

        assert_eq!(error.error_class(), "model_contract");
        assert!(error.to_string().contains("abc"));
    }

    #[test]
    fn missing_state_message_names_the_step() {
        let error = DataError::MissingState { step: "train", hint: "run `recfm train` first" };

        assert_eq!(error.error_class(), "missing_state");
        assert!(error.to_string().contains("`train`"));
    }
}
