//! Seams for the managed services the workflow drives.

use async_trait::async_trait;

use crate::errors::PlatformError;
use crate::types::{
    ApprovalUpdate, ArtifactRequest, ArtifactSummary, AssociationRequest, DeployRequest,
    EndpointDescription, ModelPackage, ModelPackageRequest, PackageGroup, PackageGroupRequest,
    ScoreRequest, ScoreResponse, TrainingJobDescription, TrainingJobRequest,
};

#[async_trait]
pub trait TrainingService: Send + Sync {
    /// Submit a job and return its ARN.
    async fn create_training_job(&self, request: &TrainingJobRequest)
        -> Result<String, PlatformError>;
    async fn describe_training_job(
        &self,
        job_name: &str,
    ) -> Result<TrainingJobDescription, PlatformError>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` at `uri`, replacing any object already there.
    async fn put_object(
        &self,
        uri: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), PlatformError>;
}

#[async_trait]
pub trait LineageStore: Send + Sync {
    async fn create_artifact(
        &self,
        request: &ArtifactRequest,
    ) -> Result<ArtifactSummary, PlatformError>;
    async fn find_artifact(&self, source_uri: &str)
        -> Result<Option<ArtifactSummary>, PlatformError>;
    async fn add_association(&self, request: &AssociationRequest) -> Result<(), PlatformError>;
}

#[async_trait]
pub trait ModelRegistry: Send + Sync {
    async fn create_package_group(
        &self,
        request: &PackageGroupRequest,
    ) -> Result<PackageGroup, PlatformError>;
    async fn describe_package_group(&self, name: &str)
        -> Result<Option<PackageGroup>, PlatformError>;
    async fn create_model_package(
        &self,
        request: &ModelPackageRequest,
    ) -> Result<ModelPackage, PlatformError>;
    async fn update_approval(
        &self,
        package_arn: &str,
        update: &ApprovalUpdate,
    ) -> Result<ModelPackage, PlatformError>;
}

#[async_trait]
pub trait EndpointHosting: Send + Sync {
    async fn deploy(&self, request: &DeployRequest) -> Result<EndpointDescription, PlatformError>;
    async fn describe_endpoint(&self, name: &str) -> Result<EndpointDescription, PlatformError>;
    async fn delete_endpoint(&self, name: &str) -> Result<(), PlatformError>;
}

#[async_trait]
pub trait ScoringEndpoint: Send + Sync {
    async fn invoke(
        &self,
        endpoint_name: &str,
        request: &ScoreRequest,
    ) -> Result<ScoreResponse, PlatformError>;
}

/// Everything the workflow needs from one platform.
pub trait Platform:
    ObjectStore + TrainingService + LineageStore + ModelRegistry + EndpointHosting + ScoringEndpoint
{
}

impl<T> Platform for T where
    T: ObjectStore
        + TrainingService
        + LineageStore
        + ModelRegistry
        + EndpointHosting
        + ScoringEndpoint
{
}
