//! Request and response documents exchanged with the managed platform.

use std::collections::BTreeMap;
use std::fmt;

use recfm_core::matrix::SparseRow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputChannel {
    pub name: String,
    pub uri: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJobRequest {
    pub job_name: String,
    pub image: String,
    pub role: String,
    pub instance_type: String,
    pub instance_count: u32,
    pub hyperparameters: BTreeMap<String, String>,
    pub channels: Vec<InputChannel>,
    pub output_uri: String,
    pub tags: BTreeMap<String, String>,
    pub client_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingJobStatus {
    InProgress,
    Completed,
    Failed,
    Stopping,
    Stopped,
}

impl TrainingJobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl fmt::Display for TrainingJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDatum {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJobDescription {
    pub job_name: String,
    pub job_arn: String,
    pub status: TrainingJobStatus,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub model_artifact_uri: Option<String>,
    #[serde(default)]
    pub final_metrics: Vec<MetricDatum>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactType {
    DataSet,
    Image,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRequest {
    pub name: String,
    pub source_uri: String,
    pub artifact_type: ArtifactType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub arn: String,
    pub source_uri: String,
    pub artifact_type: ArtifactType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationType {
    ContributedTo,
    Produced,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociationRequest {
    pub source_arn: String,
    pub destination_arn: String,
    pub association_type: AssociationType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageGroupRequest {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageGroup {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    PendingManualApproval,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPackageRequest {
    pub group_name: String,
    pub description: String,
    pub image: String,
    pub model_data_uri: String,
    pub content_types: Vec<String>,
    pub response_types: Vec<String>,
    pub model_metrics: serde_json::Value,
    pub metadata: BTreeMap<String, String>,
    pub approval_status: ApprovalStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPackage {
    pub arn: String,
    pub group_name: String,
    pub version: u32,
    pub approval_status: ApprovalStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalUpdate {
    pub approval_status: ApprovalStatus,
    pub approval_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub endpoint_name: String,
    pub package_arn: String,
    pub instance_type: String,
    pub instance_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointStatus {
    Creating,
    Updating,
    InService,
    Deleting,
    OutOfService,
    Failed,
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescription {
    pub endpoint_name: String,
    pub status: EndpointStatus,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// Sparse feature vector in the endpoint's JSON layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseFeatures {
    pub keys: Vec<usize>,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceData {
    pub features: SparseFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringInstance {
    pub data: InstanceData,
}

/// `{"instances":[{"data":{"features":{"keys":[..],"shape":[D],"values":[..]}}}]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub instances: Vec<ScoringInstance>,
}

impl ScoreRequest {
    pub fn from_rows(rows: &[SparseRow], feature_dim: usize) -> Self {
        Self {
            instances: rows
                .iter()
                .map(|row| ScoringInstance {
                    data: InstanceData {
                        features: SparseFeatures {
                            keys: row.keys.clone(),
                            shape: vec![feature_dim],
                            values: row.values.clone(),
                        },
                    },
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub predictions: Vec<Prediction>,
}
