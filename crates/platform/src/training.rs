//! Submitting the factorization-machine job and waiting for it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use recfm_core::config::TrainingConfig;
use recfm_core::state::{DatasetState, TrainingState};
use uuid::Uuid;

use crate::client::TrainingService;
use crate::errors::WorkflowError;
use crate::poll::{poll_until, PollPolicy, PollStep};
use crate::types::{InputChannel, TrainingJobDescription, TrainingJobRequest, TrainingJobStatus};

pub const LIBSVM_CONTENT_TYPE: &str = "text/x-libsvm";
pub const FINGERPRINT_TAG: &str = "recfm:encoder-fingerprint";
pub const FEATURE_DIM_TAG: &str = "recfm:feature-dim";

pub fn job_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}-{}", now.format("%Y%m%d-%H%M%S"))
}

pub fn build_request(
    config: &TrainingConfig,
    dataset: &DatasetState,
    job_name: String,
) -> TrainingJobRequest {
    let hyperparameters = BTreeMap::from([
        ("feature_dim".to_owned(), dataset.signature.feature_dim.to_string()),
        ("predictor_type".to_owned(), "regressor".to_owned()),
        ("num_factors".to_owned(), config.num_factors.to_string()),
        ("mini_batch_size".to_owned(), config.mini_batch_size.to_string()),
        ("epochs".to_owned(), config.epochs.to_string()),
    ]);
    let tags = BTreeMap::from([
        (FINGERPRINT_TAG.to_owned(), dataset.signature.fingerprint.clone()),
        (FEATURE_DIM_TAG.to_owned(), dataset.signature.feature_dim.to_string()),
    ]);

    TrainingJobRequest {
        image: config.image.clone(),
        role: config.role.clone(),
        instance_type: config.instance_type.clone(),
        instance_count: config.instance_count,
        hyperparameters,
        channels: vec![
            InputChannel {
                name: "train".to_owned(),
                uri: dataset.train_uri.clone(),
                content_type: LIBSVM_CONTENT_TYPE.to_owned(),
            },
            InputChannel {
                name: "test".to_owned(),
                uri: dataset.test_uri.clone(),
                content_type: LIBSVM_CONTENT_TYPE.to_owned(),
            },
        ],
        output_uri: config.output_uri.clone(),
        tags,
        client_token: Uuid::new_v4().to_string(),
        job_name,
    }
}

/// Submit the job, poll to a terminal status and record the trained model.
pub async fn train_model<S>(
    service: &S,
    config: &TrainingConfig,
    dataset: &DatasetState,
) -> Result<TrainingState, WorkflowError>
where
    S: TrainingService + ?Sized,
{
    let request = build_request(config, dataset, job_name(&config.job_prefix, Utc::now()));
    let job_arn = service.create_training_job(&request).await?;
    tracing::info!(
        event_name = "training.job.submitted",
        job_name = %request.job_name,
        job_arn = %job_arn,
        feature_dim = dataset.signature.feature_dim,
        "training job submitted"
    );

    let policy = PollPolicy::new(config.poll_interval_secs, config.max_polls);
    let what = format!("training job `{}`", request.job_name);
    let name = request.job_name.as_str();
    let description = poll_until(policy, &what, move || async move {
        let description = service.describe_training_job(name).await?;
        Ok::<_, WorkflowError>(if description.status.is_terminal() {
            PollStep::Done(description)
        } else {
            PollStep::Pending(description.status.to_string())
        })
    })
    .await?;

    let state = completed_state(description, &request, dataset)?;
    tracing::info!(
        event_name = "training.job.completed",
        job_name = %state.job_name,
        model_artifact_uri = %state.model_artifact_uri,
        "training job completed"
    );
    Ok(state)
}

fn completed_state(
    description: TrainingJobDescription,
    request: &TrainingJobRequest,
    dataset: &DatasetState,
) -> Result<TrainingState, WorkflowError> {
    if description.status != TrainingJobStatus::Completed {
        tracing::warn!(
            event_name = "training.job.failed",
            job_name = %request.job_name,
            status = %description.status,
            "training job did not complete"
        );
        return Err(WorkflowError::TrainingFailed {
            job: request.job_name.clone(),
            status: description.status.to_string(),
            reason: description.failure_reason.unwrap_or_else(|| "no reason reported".to_owned()),
        });
    }

    let model_artifact_uri = description
        .model_artifact_uri
        .ok_or_else(|| WorkflowError::MissingArtifact(request.job_name.clone()))?;

    Ok(TrainingState {
        job_name: request.job_name.clone(),
        job_arn: description.job_arn,
        image: request.image.clone(),
        model_artifact_uri,
        signature: dataset.signature.clone(),
        final_metrics: description
            .final_metrics
            .into_iter()
            .map(|metric| (metric.name, metric.value))
            .collect(),
        completed_at: Utc::now(),
    })
}


#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use recfm_core::config::AppConfig;

    use super::fixtures::{dataset_state, seed_inputs};
    use super::{build_request, job_name, train_model, FINGERPRINT_TAG};
    use crate::errors::WorkflowError;
    use crate::memory::{InMemoryPlatform, MemoryBehaviour};
    use crate::types::TrainingJobStatus;

    fn training_config() -> recfm_core::config::TrainingConfig {
        let mut config = AppConfig::default().training;
        config.role = "arn:role/training".to_owned();
        config.poll_interval_secs = 0;
        config.max_polls = 5;
        config
    }

    #[test]
    fn job_names_carry_a_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).single().expect("timestamp");
        assert_eq!(job_name("recfm-fm", now), "recfm-fm-20240309-140507");
    }

    #[test]
    fn request_declares_feature_dim_and_fingerprint() {
        let request = build_request(&training_config(), &dataset_state(), "job".to_owned());

        assert_eq!(request.hyperparameters["feature_dim"], "42");
        assert_eq!(request.hyperparameters["predictor_type"], "regressor");
        assert_eq!(request.tags[FINGERPRINT_TAG], "f00d");
        assert_eq!(request.channels.len(), 2);
        assert_eq!(request.channels[0].uri, "s3://bucket/data/train");
    }

    #[tokio::test]
    async fn completed_job_records_artifact_and_metrics() {
        let platform = InMemoryPlatform::default();
        seed_inputs(&platform, &dataset_state()).await;

        let state =
            train_model(&platform, &training_config(), &dataset_state()).await.expect("train");

        assert!(state.model_artifact_uri.ends_with("/output/model.tar.gz"));
        assert_eq!(state.signature.feature_dim, 42);
        assert!(state.final_metrics.contains_key("test:rmse"));
        assert_eq!(platform.submitted_jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_job_surfaces_reason() {
        let platform = InMemoryPlatform::new(MemoryBehaviour {
            training_outcome: TrainingJobStatus::Failed,
            training_failure_reason: Some("ClientError: bad channel".to_owned()),
            ..MemoryBehaviour::default()
        });
        seed_inputs(&platform, &dataset_state()).await;

        let error = train_model(&platform, &training_config(), &dataset_state())
            .await
            .expect_err("failed");

        match error {
            WorkflowError::TrainingFailed { status, reason, .. } => {
                assert_eq!(status, "Failed");
                assert!(reason.contains("bad channel"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn slow_job_times_out() {
        let platform = InMemoryPlatform::new(MemoryBehaviour {
            training_polls_before_done: 10,
            ..MemoryBehaviour::default()
        });
        seed_inputs(&platform, &dataset_state()).await;
        let mut config = training_config();
        config.max_polls = 3;

        let error = train_model(&platform, &config, &dataset_state()).await.expect_err("timeout");
        assert!(matches!(error, WorkflowError::Timeout { attempts: 3, .. }));
    }
}
