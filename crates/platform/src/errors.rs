use recfm_core::errors::DataError;
use thiserror::Error;

/// Failures talking to the managed platform.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Transport(String),
    #[error("platform returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode platform response: {0}")]
    Decode(String),
    #[error("{resource} `{name}` already exists")]
    AlreadyExists { resource: &'static str, name: String },
    #[error("{resource} `{name}` was not found")]
    NotFound { resource: &'static str, name: String },
}

/// Failures of a workflow step.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("training job `{job}` ended as {status}: {reason}")]
    TrainingFailed { job: String, status: String, reason: String },
    #[error("training job `{0}` completed without a model artifact")]
    MissingArtifact(String),
    #[error("model package `{0}` is not approved for deployment; run `recfm approve` first")]
    NotApproved(String),
    #[error("endpoint `{endpoint}` ended as {status}: {reason}")]
    EndpointFailed { endpoint: String, status: String, reason: String },
    #[error("{what} did not reach a terminal status after {attempts} polls")]
    Timeout { what: String, attempts: u32 },
}

impl WorkflowError {
    /// Stable classification used in structured command output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Platform(PlatformError::Transport(_)) => "platform_unreachable",
            Self::Platform(_) => "platform",
            Self::Data(error) => error.error_class(),
            Self::TrainingFailed { .. } | Self::MissingArtifact(_) => "training",
            Self::NotApproved(_) => "registry",
            Self::EndpointFailed { .. } => "deployment",
            Self::Timeout { .. } => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use recfm_core::errors::DataError;

    use super::{PlatformError, WorkflowError};

    #[test]
    fn data_errors_keep_their_class() {
        let error = WorkflowError::from(DataError::MissingState { step: "train", hint: "run it" });
        assert_eq!(error.error_class(), "missing_state");
    }

    #[test]
    fn transport_failures_are_distinguished_from_api_errors() {
        let transport = WorkflowError::from(PlatformError::Transport("refused".to_owned()));
        let status =
            WorkflowError::from(PlatformError::Status { status: 500, body: "boom".to_owned() });

        assert_eq!(transport.error_class(), "platform_unreachable");
        assert_eq!(status.error_class(), "platform");
        assert!(status.to_string().contains("HTTP 500"));
    }
}
