//! Workflow state persisted between CLI steps.
//!
//! Each step reads what earlier steps recorded and writes its own section, so
//! steps can run one at a time or as a single pipeline.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encoding::ModelSignature;
use crate::errors::DataError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training: Option<TrainingState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage: Option<LineageState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetState {
    pub encoder_path: PathBuf,
    pub signature: ModelSignature,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub train_uri: String,
    pub test_uri: String,
    pub train_rows: usize,
    pub test_rows: usize,
    /// SHA-256 of the transactions file the encoder was fit on.
    #[serde(default)]
    pub reference_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<UploadedInputs>,
    pub prepared_at: DateTime<Utc>,
}

/// Where the exported matrices were put for the training service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedInputs {
    pub train_object_uri: String,
    pub test_object_uri: String,
    pub train_digest: String,
    pub test_digest: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub job_name: String,
    pub job_arn: String,
    pub image: String,
    pub model_artifact_uri: String,
    pub signature: ModelSignature,
    pub final_metrics: BTreeMap<String, f64>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageState {
    /// Artifact ARNs keyed by role (`train_data`, `test_data`, `image`, `model`).
    pub artifacts: BTreeMap<String, String>,
    pub associations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryState {
    pub group_name: String,
    pub package_arn: String,
    pub approval_status: String,
    pub metrics_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointState {
    pub name: String,
    pub package_arn: String,
    pub signature: ModelSignature,
    pub status: String,
    pub deployed_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Load the state file, or start empty when it does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, DataError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read(path)
            .map_err(|source| DataError::ReadFile { path: path.to_path_buf(), source })?;
        serde_json::from_slice(&raw)
            .map_err(|source| DataError::Json { path: path.to_path_buf(), source })
    }

    /// Write through a temporary file so an interrupted step never leaves a
    /// truncated state behind.
    pub fn save(&self, path: &Path) -> Result<(), DataError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| DataError::WriteFile { path: parent.to_path_buf(), source })?;
        }

        let payload = serde_json::to_vec_pretty(self)
            .map_err(|source| DataError::Json { path: path.to_path_buf(), source })?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, payload)
            .map_err(|source| DataError::WriteFile { path: staging.clone(), source })?;
        fs::rename(&staging, path)
            .map_err(|source| DataError::WriteFile { path: path.to_path_buf(), source })
    }

    pub fn require_dataset(&self) -> Result<&DatasetState, DataError> {
        self.dataset
            .as_ref()
            .ok_or(DataError::MissingState { step: "prepare", hint: "run `recfm prepare` first" })
    }

    pub fn require_training(&self) -> Result<&TrainingState, DataError> {
        self.training
            .as_ref()
            .ok_or(DataError::MissingState { step: "train", hint: "run `recfm train` first" })
    }

    pub fn require_registry(&self) -> Result<&RegistryState, DataError> {
        self.registry
            .as_ref()
            .ok_or(DataError::MissingState { step: "register", hint: "run `recfm register` first" })
    }

    pub fn require_endpoint(&self) -> Result<&EndpointState, DataError> {
        self.endpoint
            .as_ref()
            .ok_or(DataError::MissingState { step: "deploy", hint: "run `recfm deploy` first" })
    }
}
