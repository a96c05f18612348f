//! In-process platform used for dry runs and tests.
//!
//! Jobs and endpoints advance through their statuses as they are described, so
//! the polling paths run exactly as they do against the real service.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::client::{
    EndpointHosting, LineageStore, ModelRegistry, ObjectStore, ScoringEndpoint, TrainingService,
};
use crate::errors::PlatformError;
use crate::types::{
    ApprovalStatus, ApprovalUpdate, ArtifactRequest, ArtifactSummary, AssociationRequest,
    DeployRequest, EndpointDescription, EndpointStatus, MetricDatum, ModelPackage,
    ModelPackageRequest, PackageGroup, PackageGroupRequest, Prediction, ScoreRequest,
    ScoreResponse, SparseFeatures, TrainingJobDescription, TrainingJobRequest, TrainingJobStatus,
};

const ARN_PREFIX: &str = "arn:recfm:local";

/// How simulated jobs and endpoints behave.
#[derive(Debug, Clone)]
pub struct MemoryBehaviour {
    /// Describe calls that report `InProgress` before the outcome is visible.
    pub training_polls_before_done: u32,
    pub training_outcome: TrainingJobStatus,
    pub training_failure_reason: Option<String>,
    pub final_metrics: Vec<MetricDatum>,
    pub endpoint_polls_before_done: u32,
    pub endpoint_outcome: EndpointStatus,
}

impl Default for MemoryBehaviour {
    fn default() -> Self {
        Self {
            training_polls_before_done: 1,
            training_outcome: TrainingJobStatus::Completed,
            training_failure_reason: None,
            final_metrics: vec![
                MetricDatum { name: "test:rmse".to_owned(), value: 1.118 },
                MetricDatum { name: "test:mse".to_owned(), value: 1.25 },
                MetricDatum { name: "test:absolute_loss".to_owned(), value: 0.834 },
                MetricDatum { name: "train:progress".to_owned(), value: 100.0 },
            ],
            endpoint_polls_before_done: 1,
            endpoint_outcome: EndpointStatus::InService,
        }
    }
}

#[derive(Debug)]
struct JobRecord {
    request: TrainingJobRequest,
    arn: String,
    describes: u32,
}

#[derive(Debug)]
struct EndpointRecord {
    describes: u32,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<String, Vec<u8>>,
    jobs: BTreeMap<String, JobRecord>,
    artifacts: Vec<ArtifactSummary>,
    associations: HashSet<AssociationRequest>,
    groups: BTreeMap<String, PackageGroup>,
    packages: Vec<ModelPackage>,
    endpoints: BTreeMap<String, EndpointRecord>,
    invocations: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    behaviour: MemoryBehaviour,
    state: Mutex<MemoryState>,
}

impl InMemoryPlatform {
    pub fn new(behaviour: MemoryBehaviour) -> Self {
        Self { behaviour, state: Mutex::new(MemoryState::default()) }
    }

    pub async fn object(&self, uri: &str) -> Option<Vec<u8>> {
        self.state.lock().await.objects.get(uri).cloned()
    }

    pub async fn artifacts(&self) -> Vec<ArtifactSummary> {
        self.state.lock().await.artifacts.clone()
    }

    pub async fn association_count(&self) -> usize {
        self.state.lock().await.associations.len()
    }

    pub async fn packages(&self) -> Vec<ModelPackage> {
        self.state.lock().await.packages.clone()
    }

    pub async fn submitted_jobs(&self) -> Vec<TrainingJobRequest> {
        self.state.lock().await.jobs.values().map(|job| job.request.clone()).collect()
    }

    pub async fn endpoint_names(&self) -> Vec<String> {
        self.state.lock().await.endpoints.keys().cloned().collect()
    }

    /// Instance counts of each scoring call, in call order.
    pub async fn invocation_batches(&self) -> Vec<usize> {
        self.state.lock().await.invocations.clone()
    }
}

/// Deterministic stand-in for a trained model: a fixed pseudo-random weight
/// per feature column.
pub fn synthetic_score(features: &SparseFeatures) -> f32 {
    features
        .keys
        .iter()
        .zip(&features.values)
        .map(|(key, value)| {
            let weight = ((*key as u64).wrapping_mul(2_654_435_761) % 1_000) as f32 / 1_000.0;
            weight * value
        })
        .sum()
}

/// Rebuild a package minted by another in-process platform from its ARN
/// (`<prefix>:model-package/<group>/<version>`).
fn adopt_package(package_arn: &str) -> Option<ModelPackage> {
    let path = package_arn.strip_prefix(ARN_PREFIX)?.strip_prefix(":model-package/")?;
    let (group_name, version) = path.rsplit_once('/')?;
    Some(ModelPackage {
        arn: package_arn.to_owned(),
        group_name: group_name.to_owned(),
        version: version.parse().ok()?,
        approval_status: ApprovalStatus::PendingManualApproval,
    })
}

#[async_trait]
impl ObjectStore for InMemoryPlatform {
    async fn put_object(
        &self,
        uri: &str,
        _content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), PlatformError> {
        self.state.lock().await.objects.insert(uri.to_owned(), body);
        Ok(())
    }
}

#[async_trait]
impl TrainingService for InMemoryPlatform {
    async fn create_training_job(
        &self,
        request: &TrainingJobRequest,
    ) -> Result<String, PlatformError> {
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&request.job_name) {
            return Err(PlatformError::AlreadyExists {
                resource: "training job",
                name: request.job_name.clone(),
            });
        }

        for channel in &request.channels {
            let prefix = format!("{}/", channel.uri.trim_end_matches('/'));
            if !state.objects.keys().any(|uri| uri.starts_with(&prefix)) {
                return Err(PlatformError::Status {
                    status: 400,
                    body: format!("channel `{}` has no objects under {}", channel.name, prefix),
                });
            }
        }

        let arn = format!("{ARN_PREFIX}:training-job/{}", request.job_name);
        state.jobs.insert(
            request.job_name.clone(),
            JobRecord { request: request.clone(), arn: arn.clone(), describes: 0 },
        );
        Ok(arn)
    }

    async fn describe_training_job(
        &self,
        job_name: &str,
    ) -> Result<TrainingJobDescription, PlatformError> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(job_name).ok_or_else(|| PlatformError::NotFound {
            resource: "training job",
            name: job_name.to_owned(),
        })?;
        job.describes += 1;

        let status = if job.describes > self.behaviour.training_polls_before_done {
            self.behaviour.training_outcome
        } else {
            TrainingJobStatus::InProgress
        };
        let completed = status == TrainingJobStatus::Completed;

        Ok(TrainingJobDescription {
            job_name: job_name.to_owned(),
            job_arn: job.arn.clone(),
            status,
            failure_reason: if status == TrainingJobStatus::Failed {
                self.behaviour.training_failure_reason.clone()
            } else {
                None
            },
            model_artifact_uri: completed.then(|| {
                format!(
                    "{}/{}/output/model.tar.gz",
                    job.request.output_uri.trim_end_matches('/'),
                    job_name
                )
            }),
            final_metrics: if completed {
                self.behaviour.final_metrics.clone()
            } else {
                Vec::new()
            },
        })
    }
}

#[async_trait]
impl LineageStore for InMemoryPlatform {
    async fn create_artifact(
        &self,
        request: &ArtifactRequest,
    ) -> Result<ArtifactSummary, PlatformError> {
        let mut state = self.state.lock().await;
        if state.artifacts.iter().any(|artifact| artifact.source_uri == request.source_uri) {
            return Err(PlatformError::AlreadyExists {
                resource: "artifact",
                name: request.source_uri.clone(),
            });
        }

        let artifact = ArtifactSummary {
            arn: format!("{ARN_PREFIX}:artifact/{}", Uuid::new_v4()),
            source_uri: request.source_uri.clone(),
            artifact_type: request.artifact_type,
        };
        state.artifacts.push(artifact.clone());
        Ok(artifact)
    }

    async fn find_artifact(
        &self,
        source_uri: &str,
    ) -> Result<Option<ArtifactSummary>, PlatformError> {
        let state = self.state.lock().await;
        Ok(state.artifacts.iter().find(|artifact| artifact.source_uri == source_uri).cloned())
    }

    async fn add_association(&self, request: &AssociationRequest) -> Result<(), PlatformError> {
        let mut state = self.state.lock().await;
        if !state.associations.insert(request.clone()) {
            return Err(PlatformError::AlreadyExists {
                resource: "association",
                name: format!("{} -> {}", request.source_arn, request.destination_arn),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ModelRegistry for InMemoryPlatform {
    async fn create_package_group(
        &self,
        request: &PackageGroupRequest,
    ) -> Result<PackageGroup, PlatformError> {
        let mut state = self.state.lock().await;
        if state.groups.contains_key(&request.name) {
            return Err(PlatformError::AlreadyExists {
                resource: "model package group",
                name: request.name.clone(),
            });
        }

        let group = PackageGroup {
            name: request.name.clone(),
            arn: format!("{ARN_PREFIX}:model-package-group/{}", request.name),
        };
        state.groups.insert(request.name.clone(), group.clone());
        Ok(group)
    }

    async fn describe_package_group(
        &self,
        name: &str,
    ) -> Result<Option<PackageGroup>, PlatformError> {
        Ok(self.state.lock().await.groups.get(name).cloned())
    }

    async fn create_model_package(
        &self,
        request: &ModelPackageRequest,
    ) -> Result<ModelPackage, PlatformError> {
        let mut state = self.state.lock().await;
        if !state.groups.contains_key(&request.group_name) {
            return Err(PlatformError::NotFound {
                resource: "model package group",
                name: request.group_name.clone(),
            });
        }

        let version = state
            .packages
            .iter()
            .filter(|package| package.group_name == request.group_name)
            .count() as u32
            + 1;
        let package = ModelPackage {
            arn: format!("{ARN_PREFIX}:model-package/{}/{version}", request.group_name),
            group_name: request.group_name.clone(),
            version,
            approval_status: request.approval_status,
        };
        state.packages.push(package.clone());
        Ok(package)
    }

    async fn update_approval(
        &self,
        package_arn: &str,
        update: &ApprovalUpdate,
    ) -> Result<ModelPackage, PlatformError> {
        let mut state = self.state.lock().await;
        // Dry-run commands each start a fresh platform, so a package registered
        // by an earlier command is adopted here.
        let index = match state.packages.iter().position(|package| package.arn == package_arn) {
            Some(index) => index,
            None => {
                let adopted = adopt_package(package_arn).ok_or_else(|| PlatformError::NotFound {
                    resource: "model package",
                    name: package_arn.to_owned(),
                })?;
                state.packages.push(adopted);
                state.packages.len() - 1
            }
        };

        let package = &mut state.packages[index];
        package.approval_status = update.approval_status;
        Ok(package.clone())
    }
}

#[async_trait]
impl EndpointHosting for InMemoryPlatform {
    async fn deploy(&self, request: &DeployRequest) -> Result<EndpointDescription, PlatformError> {
        let mut state = self.state.lock().await;
        if state.endpoints.contains_key(&request.endpoint_name) {
            return Err(PlatformError::AlreadyExists {
                resource: "endpoint",
                name: request.endpoint_name.clone(),
            });
        }

        state.endpoints.insert(request.endpoint_name.clone(), EndpointRecord { describes: 0 });
        Ok(EndpointDescription {
            endpoint_name: request.endpoint_name.clone(),
            status: EndpointStatus::Creating,
            failure_reason: None,
        })
    }

    async fn describe_endpoint(&self, name: &str) -> Result<EndpointDescription, PlatformError> {
        let mut state = self.state.lock().await;
        let endpoint = state.endpoints.get_mut(name).ok_or_else(|| PlatformError::NotFound {
            resource: "endpoint",
            name: name.to_owned(),
        })?;
        endpoint.describes += 1;

        let status = if endpoint.describes > self.behaviour.endpoint_polls_before_done {
            self.behaviour.endpoint_outcome
        } else {
            EndpointStatus::Creating
        };
        Ok(EndpointDescription {
            endpoint_name: name.to_owned(),
            status,
            failure_reason: matches!(status, EndpointStatus::Failed)
                .then(|| "simulated capacity error".to_owned()),
        })
    }

    async fn delete_endpoint(&self, name: &str) -> Result<(), PlatformError> {
        let mut state = self.state.lock().await;
        state
            .endpoints
            .remove(name)
            .map(drop)
            .ok_or_else(|| PlatformError::NotFound { resource: "endpoint", name: name.to_owned() })
    }
}

#[async_trait]
impl ScoringEndpoint for InMemoryPlatform {
    // Endpoints are not checked for existence so a dry-run `recommend` works
    // in a process that did not deploy.
    async fn invoke(
        &self,
        _endpoint_name: &str,
        request: &ScoreRequest,
    ) -> Result<ScoreResponse, PlatformError> {
        let malformed = request.instances.iter().any(|instance| {
            instance.data.features.keys.len() != instance.data.features.values.len()
        });
        if malformed {
            return Err(PlatformError::Status {
                status: 400,
                body: "keys and values must have the same length".to_owned(),
            });
        }

        self.state.lock().await.invocations.push(request.len());
        Ok(ScoreResponse {
            predictions: request
                .instances
                .iter()
                .map(|instance| Prediction { score: synthetic_score(&instance.data.features) })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{synthetic_score, InMemoryPlatform, MemoryBehaviour};
    use std::collections::BTreeMap;

    use crate::client::{
        EndpointHosting, LineageStore, ModelRegistry, ObjectStore, TrainingService,
    };
    use crate::errors::PlatformError;
    use crate::types::{
        ApprovalStatus, ApprovalUpdate, ArtifactRequest, ArtifactType, DeployRequest,
        EndpointStatus, InputChannel, ModelPackageRequest, PackageGroupRequest, SparseFeatures,
        TrainingJobRequest,
    };

    fn job_request() -> TrainingJobRequest {
        TrainingJobRequest {
            job_name: "recfm-fm-1".to_owned(),
            image: "fm:1".to_owned(),
            role: "arn:role/training".to_owned(),
            instance_type: "ml.m5.large".to_owned(),
            instance_count: 1,
            hyperparameters: BTreeMap::new(),
            channels: vec![InputChannel {
                name: "train".to_owned(),
                uri: "s3://bucket/data/train".to_owned(),
                content_type: "text/x-libsvm".to_owned(),
            }],
            output_uri: "s3://bucket/output".to_owned(),
            tags: BTreeMap::new(),
            client_token: "token".to_owned(),
        }
    }

    #[tokio::test]
    async fn training_jobs_need_data_in_every_channel() {
        let platform = InMemoryPlatform::default();

        let error = platform.create_training_job(&job_request()).await.expect_err("empty channel");
        assert!(matches!(error, PlatformError::Status { status: 400, .. }));

        platform
            .put_object(
                "s3://bucket/data/train/train.libsvm",
                "text/x-libsvm",
                b"1 0:1\n".to_vec(),
            )
            .await
            .expect("put");
        platform.create_training_job(&job_request()).await.expect("submit");

        assert_eq!(
            platform.object("s3://bucket/data/train/train.libsvm").await,
            Some(b"1 0:1\n".to_vec())
        );
    }

    #[tokio::test]
    async fn approval_adopts_packages_from_an_earlier_process() {
        let platform = InMemoryPlatform::default();
        let update = ApprovalUpdate {
            approval_status: ApprovalStatus::Approved,
            approval_description: "ok".to_owned(),
        };

        let adopted = platform
            .update_approval("arn:recfm:local:model-package/recommender/3", &update)
            .await
            .expect("adopted");
        assert_eq!(adopted.group_name, "recommender");
        assert_eq!(adopted.version, 3);
        assert_eq!(adopted.approval_status, ApprovalStatus::Approved);

        let foreign = platform
            .update_approval("arn:aws:sagemaker:model-package/recommender/3", &update)
            .await
            .expect_err("foreign");
        assert!(matches!(foreign, PlatformError::NotFound { .. }));
    }

    #[tokio::test]
    async fn duplicate_artifacts_are_rejected_but_findable() {
        let platform = InMemoryPlatform::default();
        let request = ArtifactRequest {
            name: "train_data".to_owned(),
            source_uri: "s3://bucket/train".to_owned(),
            artifact_type: ArtifactType::DataSet,
        };

        let created = platform.create_artifact(&request).await.expect("create");
        let duplicate = platform.create_artifact(&request).await.expect_err("duplicate");
        let found = platform.find_artifact(&request.source_uri).await.expect("find");

        assert!(matches!(duplicate, PlatformError::AlreadyExists { .. }));
        assert_eq!(found, Some(created));
    }

    #[tokio::test]
    async fn packages_need_a_group_and_get_versions() {
        let platform = InMemoryPlatform::default();
        let request = ModelPackageRequest {
            group_name: "recommender".to_owned(),
            description: String::new(),
            image: "fm:1".to_owned(),
            model_data_uri: "s3://bucket/model.tar.gz".to_owned(),
            content_types: vec!["application/json".to_owned()],
            response_types: vec!["application/json".to_owned()],
            model_metrics: serde_json::json!({}),
            metadata: Default::default(),
            approval_status: crate::types::ApprovalStatus::PendingManualApproval,
        };

        let missing = platform.create_model_package(&request).await.expect_err("no group");
        assert!(matches!(missing, PlatformError::NotFound { .. }));

        platform
            .create_package_group(&PackageGroupRequest {
                name: "recommender".to_owned(),
                description: "retail".to_owned(),
            })
            .await
            .expect("group");
        let first = platform.create_model_package(&request).await.expect("first");
        let second = platform.create_model_package(&request).await.expect("second");

        assert_eq!((first.version, second.version), (1, 2));
    }

    #[tokio::test]
    async fn endpoints_report_configured_outcome_after_creating() {
        let platform = InMemoryPlatform::new(MemoryBehaviour {
            endpoint_polls_before_done: 1,
            endpoint_outcome: EndpointStatus::Failed,
            ..MemoryBehaviour::default()
        });
        platform
            .deploy(&DeployRequest {
                endpoint_name: "ep".to_owned(),
                package_arn: "arn".to_owned(),
                instance_type: "ml.m5.large".to_owned(),
                instance_count: 1,
            })
            .await
            .expect("deploy");

        let first = platform.describe_endpoint("ep").await.expect("describe");
        let second = platform.describe_endpoint("ep").await.expect("describe");

        assert_eq!(first.status, EndpointStatus::Creating);
        assert_eq!(second.status, EndpointStatus::Failed);
        assert!(second.failure_reason.is_some());
    }

    #[test]
    fn synthetic_scores_are_deterministic_and_feature_sensitive() {
        let a = SparseFeatures { keys: vec![1, 5], shape: vec![10], values: vec![1.0, 1.0] };
        let b = SparseFeatures { keys: vec![2, 5], shape: vec![10], values: vec![1.0, 1.0] };

        assert_eq!(synthetic_score(&a), synthetic_score(&a.clone()));
        assert_ne!(synthetic_score(&a), synthetic_score(&b));
    }
}
