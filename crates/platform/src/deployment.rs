//! Hosting an approved package behind a scoring endpoint.

use chrono::Utc;
use recfm_core::config::EndpointConfig;
use recfm_core::encoding::ModelSignature;
use recfm_core::state::{EndpointState, RegistryState};

use crate::client::EndpointHosting;
use crate::errors::{PlatformError, WorkflowError};
use crate::poll::{poll_until, PollPolicy, PollStep};
use crate::types::{ApprovalStatus, DeployRequest, EndpointDescription, EndpointStatus};

/// Deploy the registered package and wait until the endpoint is in service.
pub async fn deploy_model<H>(
    hosting: &H,
    config: &EndpointConfig,
    registry: &RegistryState,
    signature: &ModelSignature,
) -> Result<EndpointState, WorkflowError>
where
    H: EndpointHosting + ?Sized,
{
    if registry.approval_status != ApprovalStatus::Approved.to_string() {
        return Err(WorkflowError::NotApproved(registry.package_arn.clone()));
    }

    let request = DeployRequest {
        endpoint_name: config.name.clone(),
        package_arn: registry.package_arn.clone(),
        instance_type: config.instance_type.clone(),
        instance_count: config.instance_count,
    };
    let created = hosting.deploy(&request).await?;
    tracing::info!(
        event_name = "endpoint.deploy.started",
        endpoint = %created.endpoint_name,
        package_arn = %request.package_arn,
        status = %created.status,
        "endpoint deployment started"
    );

    let policy = PollPolicy::new(config.poll_interval_secs, config.max_polls);
    let what = format!("endpoint `{}`", config.name);
    let name = config.name.as_str();
    let ready = poll_until(policy, &what, move || async move {
        let description = hosting.describe_endpoint(name).await?;
        endpoint_step(description)
    })
    .await?;

    tracing::info!(
        event_name = "endpoint.deploy.in_service",
        endpoint = %ready.endpoint_name,
        "endpoint in service"
    );
    Ok(EndpointState {
        name: ready.endpoint_name,
        package_arn: registry.package_arn.clone(),
        signature: signature.clone(),
        status: ready.status.to_string(),
        deployed_at: Utc::now(),
    })
}

fn endpoint_step(
    description: EndpointDescription,
) -> Result<PollStep<EndpointDescription>, WorkflowError> {
    match description.status {
        EndpointStatus::InService => Ok(PollStep::Done(description)),
        EndpointStatus::Failed | EndpointStatus::OutOfService => {
            Err(WorkflowError::EndpointFailed {
                endpoint: description.endpoint_name,
                status: description.status.to_string(),
                reason: description
                    .failure_reason
                    .unwrap_or_else(|| "no reason reported".to_owned()),
            })
        }
        other => Ok(PollStep::Pending(other.to_string())),
    }
}

/// Delete the endpoint. An endpoint that is already gone counts as deleted.
pub async fn teardown<H>(hosting: &H, name: &str) -> Result<(), WorkflowError>
where
    H: EndpointHosting + ?Sized,
{
    match hosting.delete_endpoint(name).await {
        Ok(()) => {
            tracing::info!(event_name = "endpoint.deleted", endpoint = %name, "endpoint deleted");
            Ok(())
        }
        Err(PlatformError::NotFound { .. }) => {
            tracing::warn!(
                event_name = "endpoint.delete.missing",
                endpoint = %name,
                "endpoint was already deleted"
            );
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}
