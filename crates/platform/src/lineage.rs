//! Lineage artifacts and associations for a training run.

use recfm_core::state::{DatasetState, LineageState, TrainingState};

use crate::client::LineageStore;
use crate::errors::WorkflowError;
use crate::types::{
    ArtifactRequest, ArtifactSummary, ArtifactType, AssociationRequest, AssociationType,
};

/// Create an artifact, reusing the existing one for the same source URI.
pub async fn ensure_artifact<S>(
    store: &S,
    request: &ArtifactRequest,
) -> Result<ArtifactSummary, WorkflowError>
where
    S: LineageStore + ?Sized,
{
    match store.create_artifact(request).await {
        Ok(artifact) => Ok(artifact),
        Err(create_error) => match store.find_artifact(&request.source_uri).await? {
            Some(existing) => {
                tracing::debug!(
                    event_name = "lineage.artifact.reused",
                    name = %request.name,
                    source_uri = %request.source_uri,
                    arn = %existing.arn,
                    "artifact already recorded"
                );
                Ok(existing)
            }
            None => Err(create_error.into()),
        },
    }
}

/// Add an association. A rejected add is assumed to be a duplicate, so this
/// reports whether a new association was recorded.
pub async fn ensure_association<S>(store: &S, request: &AssociationRequest) -> bool
where
    S: LineageStore + ?Sized,
{
    match store.add_association(request).await {
        Ok(()) => true,
        Err(error) => {
            tracing::debug!(
                event_name = "lineage.association.skipped",
                source_arn = %request.source_arn,
                destination_arn = %request.destination_arn,
                error = %error,
                "association assumed to exist"
            );
            false
        }
    }
}

/// Link the training inputs, container image and produced model to the job.
pub async fn record_training_lineage<S>(
    store: &S,
    dataset: &DatasetState,
    training: &TrainingState,
) -> Result<LineageState, WorkflowError>
where
    S: LineageStore + ?Sized,
{
    let inputs = [
        ("train_data", dataset.train_uri.as_str(), ArtifactType::DataSet),
        ("test_data", dataset.test_uri.as_str(), ArtifactType::DataSet),
        ("image", training.image.as_str(), ArtifactType::Image),
    ];

    let mut state = LineageState::default();
    for (name, source_uri, artifact_type) in inputs {
        let artifact = ensure_artifact(
            store,
            &ArtifactRequest {
                name: name.to_owned(),
                source_uri: source_uri.to_owned(),
                artifact_type,
            },
        )
        .await?;
        let association = AssociationRequest {
            source_arn: artifact.arn.clone(),
            destination_arn: training.job_arn.clone(),
            association_type: AssociationType::ContributedTo,
        };
        if ensure_association(store, &association).await {
            state.associations += 1;
        }
        state.artifacts.insert(name.to_owned(), artifact.arn);
    }

    let model = ensure_artifact(
        store,
        &ArtifactRequest {
            name: "model".to_owned(),
            source_uri: training.model_artifact_uri.clone(),
            artifact_type: ArtifactType::Model,
        },
    )
    .await?;
    let produced = AssociationRequest {
        source_arn: training.job_arn.clone(),
        destination_arn: model.arn.clone(),
        association_type: AssociationType::Produced,
    };
    if ensure_association(store, &produced).await {
        state.associations += 1;
    }
    state.artifacts.insert("model".to_owned(), model.arn);

    tracing::info!(
        event_name = "lineage.recorded",
        job_name = %training.job_name,
        artifacts = state.artifacts.len(),
        new_associations = state.associations,
        "training lineage recorded"
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use recfm_core::state::TrainingState;

    use super::{ensure_artifact, record_training_lineage};
    use crate::client::LineageStore;
    use crate::memory::InMemoryPlatform;
    use crate::training::fixtures::dataset_state;
    use crate::types::{ArtifactRequest, ArtifactType};

    fn training_state() -> TrainingState {
        TrainingState {
            job_name: "recfm-fm-20240101-000000".to_owned(),
            job_arn: "arn:recfm:local:training-job/recfm-fm-20240101-000000".to_owned(),
            image: "factorization-machines:1".to_owned(),
            model_artifact_uri: "s3://bucket/output/model.tar.gz".to_owned(),
            signature: dataset_state().signature,
            final_metrics: BTreeMap::new(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_four_artifacts_and_four_associations() {
        let platform = InMemoryPlatform::default();

        let state = record_training_lineage(&platform, &dataset_state(), &training_state())
            .await
            .expect("lineage");

        let roles: Vec<&str> = state.artifacts.keys().map(String::as_str).collect();
        assert_eq!(roles, vec!["image", "model", "test_data", "train_data"]);
        assert_eq!(state.associations, 4);
        assert_eq!(platform.association_count().await, 4);
    }

    #[tokio::test]
    async fn rerunning_reuses_artifacts_and_skips_associations() {
        let platform = InMemoryPlatform::default();
        let first = record_training_lineage(&platform, &dataset_state(), &training_state())
            .await
            .expect("first");
        let second = record_training_lineage(&platform, &dataset_state(), &training_state())
            .await
            .expect("second");

        assert_eq!(first.artifacts, second.artifacts);
        assert_eq!(second.associations, 0);
        assert_eq!(platform.artifacts().await.len(), 4);
    }

    #[tokio::test]
    async fn existing_artifact_is_returned_instead_of_failing() {
        let platform = InMemoryPlatform::default();
        let request = ArtifactRequest {
            name: "train_data".to_owned(),
            source_uri: "s3://bucket/train".to_owned(),
            artifact_type: ArtifactType::DataSet,
        };
        let created = platform.create_artifact(&request).await.expect("create");

        let ensured = ensure_artifact(&platform, &request).await.expect("ensure");
        assert_eq!(ensured.arn, created.arn);
    }
}
