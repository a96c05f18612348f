//! Registering the trained model as a versioned package.

use std::collections::BTreeMap;
use std::path::Path;

use recfm_core::config::RegistryConfig;
use recfm_core::metrics::ModelQualityReport;
use recfm_core::state::{RegistryState, TrainingState};

use crate::client::ModelRegistry;
use crate::errors::WorkflowError;
use crate::training::{FEATURE_DIM_TAG, FINGERPRINT_TAG};
use crate::types::{
    ApprovalStatus, ApprovalUpdate, ModelPackage, ModelPackageRequest, PackageGroup,
    PackageGroupRequest,
};

pub const METRICS_FILE: &str = "evaluation.json";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Create the package group, or reuse it when it already exists.
pub async fn ensure_package_group<R>(
    registry: &R,
    name: &str,
    description: &str,
) -> Result<PackageGroup, WorkflowError>
where
    R: ModelRegistry + ?Sized,
{
    let request =
        PackageGroupRequest { name: name.to_owned(), description: description.to_owned() };
    match registry.create_package_group(&request).await {
        Ok(group) => Ok(group),
        Err(create_error) => match registry.describe_package_group(name).await? {
            Some(existing) => {
                tracing::debug!(
                    event_name = "registry.group.reused",
                    group = %name,
                    "model package group already exists"
                );
                Ok(existing)
            }
            None => Err(create_error.into()),
        },
    }
}

pub fn package_request(
    config: &RegistryConfig,
    training: &TrainingState,
    report: &ModelQualityReport,
    metrics_path: &Path,
) -> ModelPackageRequest {
    let metadata = BTreeMap::from([
        (FINGERPRINT_TAG.to_owned(), training.signature.fingerprint.clone()),
        (FEATURE_DIM_TAG.to_owned(), training.signature.feature_dim.to_string()),
        ("recfm:training-job".to_owned(), training.job_name.clone()),
    ]);

    ModelPackageRequest {
        group_name: config.model_package_group.clone(),
        description: format!("Factorization machine trained by {}", training.job_name),
        image: training.image.clone(),
        model_data_uri: training.model_artifact_uri.clone(),
        content_types: vec![JSON_CONTENT_TYPE.to_owned()],
        response_types: vec![JSON_CONTENT_TYPE.to_owned()],
        model_metrics: serde_json::json!({
            "model_quality": {
                "content_type": JSON_CONTENT_TYPE,
                "source": metrics_path.display().to_string(),
                "statistics": report.to_json(),
            }
        }),
        metadata,
        approval_status: ApprovalStatus::PendingManualApproval,
    }
}

pub async fn approve<R>(
    registry: &R,
    package_arn: &str,
    description: &str,
) -> Result<ModelPackage, WorkflowError>
where
    R: ModelRegistry + ?Sized,
{
    let update = ApprovalUpdate {
        approval_status: ApprovalStatus::Approved,
        approval_description: description.to_owned(),
    };
    let package = registry.update_approval(package_arn, &update).await?;
    tracing::info!(
        event_name = "registry.package.approved",
        package_arn = %package.arn,
        "model package approved"
    );
    Ok(package)
}

/// Write the evaluation report, register a package in the group and approve
/// it when configured to.
pub async fn register_model<R>(
    registry: &R,
    config: &RegistryConfig,
    training: &TrainingState,
    work_dir: &Path,
) -> Result<RegistryState, WorkflowError>
where
    R: ModelRegistry + ?Sized,
{
    let report = ModelQualityReport::from_final_metrics(
        training.final_metrics.iter().map(|(name, value)| (name.as_str(), *value)),
    );
    let metrics_path = work_dir.join(METRICS_FILE);
    report.write_to(&metrics_path)?;

    let group =
        ensure_package_group(registry, &config.model_package_group, &config.group_description)
            .await?;
    let mut package = registry
        .create_model_package(&package_request(config, training, &report, &metrics_path))
        .await?;
    tracing::info!(
        event_name = "registry.package.created",
        group = %group.name,
        package_arn = %package.arn,
        version = package.version,
        "model package registered"
    );

    if config.auto_approve {
        package = approve(registry, &package.arn, &config.approval_description).await?;
    }

    Ok(RegistryState {
        group_name: group.name,
        package_arn: package.arn,
        approval_status: package.approval_status.to_string(),
        metrics_path,
    })
}
