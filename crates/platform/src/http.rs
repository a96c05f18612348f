//! REST client for the managed platform.

use std::time::Duration;

use async_trait::async_trait;
use recfm_core::config::PlatformConfig;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::{
    EndpointHosting, LineageStore, ModelRegistry, ObjectStore, ScoringEndpoint, TrainingService,
};
use crate::errors::PlatformError;
use crate::types::{
    ApprovalUpdate, ArtifactRequest, ArtifactSummary, AssociationRequest, DeployRequest,
    EndpointDescription, ModelPackage, ModelPackageRequest, PackageGroup, PackageGroupRequest,
    ScoreRequest, ScoreResponse, TrainingJobDescription, TrainingJobRequest,
};

const REGION_HEADER: &str = "x-recfm-region";

#[derive(Debug, Deserialize)]
struct CreatedJob {
    job_arn: String,
}

#[derive(Debug, Deserialize)]
struct ArtifactList {
    artifacts: Vec<ArtifactSummary>,
}

#[derive(Debug, Serialize)]
struct ApprovalPayload<'a> {
    package_arn: &'a str,
    #[serde(flatten)]
    update: &'a ApprovalUpdate,
}

#[derive(Clone)]
pub struct HttpPlatform {
    client: Client,
    base_url: String,
    region: String,
    api_token: Option<SecretString>,
}

impl HttpPlatform {
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| PlatformError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            region: config.region.clone(),
            api_token: config.api_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.client.request(method, url).header(REGION_HEADER, &self.region);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        resource: &'static str,
        name: &str,
    ) -> Result<Response, PlatformError> {
        let response =
            builder.send().await.map_err(|error| PlatformError::Transport(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        tracing::debug!(
            event_name = "platform.http.rejected",
            resource,
            name,
            status = %status,
            "platform rejected request"
        );
        match status {
            StatusCode::NOT_FOUND => {
                Err(PlatformError::NotFound { resource, name: name.to_owned() })
            }
            StatusCode::CONFLICT => {
                Err(PlatformError::AlreadyExists { resource, name: name.to_owned() })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(PlatformError::Status { status: status.as_u16(), body })
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        resource: &'static str,
        name: &str,
    ) -> Result<T, PlatformError> {
        self.send(builder, resource, name)
            .await?
            .json()
            .await
            .map_err(|error| PlatformError::Decode(error.to_string()))
    }

    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: &'static str,
        name: &str,
    ) -> Result<Option<T>, PlatformError> {
        match self.send_json(self.request(Method::GET, path), resource, name).await {
            Ok(value) => Ok(Some(value)),
            Err(PlatformError::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

impl std::fmt::Debug for HttpPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPlatform")
            .field("base_url", &self.base_url)
            .field("region", &self.region)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl ObjectStore for HttpPlatform {
    async fn put_object(
        &self,
        uri: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), PlatformError> {
        self.send(
            self.request(Method::PUT, "objects")
                .query(&[("uri", uri)])
                .header(CONTENT_TYPE, content_type)
                .body(body),
            "object",
            uri,
        )
        .await
        .map(drop)
    }
}

#[async_trait]
impl TrainingService for HttpPlatform {
    async fn create_training_job(
        &self,
        request: &TrainingJobRequest,
    ) -> Result<String, PlatformError> {
        let created: CreatedJob = self
            .send_json(
                self.request(Method::POST, "training-jobs").json(request),
                "training job",
                &request.job_name,
            )
            .await?;
        Ok(created.job_arn)
    }

    async fn describe_training_job(
        &self,
        job_name: &str,
    ) -> Result<TrainingJobDescription, PlatformError> {
        self.send_json(
            self.request(Method::GET, &format!("training-jobs/{job_name}")),
            "training job",
            job_name,
        )
        .await
    }
}

#[async_trait]
impl LineageStore for HttpPlatform {
    async fn create_artifact(
        &self,
        request: &ArtifactRequest,
    ) -> Result<ArtifactSummary, PlatformError> {
        self.send_json(
            self.request(Method::POST, "lineage/artifacts").json(request),
            "artifact",
            &request.source_uri,
        )
        .await
    }

    async fn find_artifact(
        &self,
        source_uri: &str,
    ) -> Result<Option<ArtifactSummary>, PlatformError> {
        let listed: ArtifactList = self
            .send_json(
                self.request(Method::GET, "lineage/artifacts").query(&[("source_uri", source_uri)]),
                "artifact",
                source_uri,
            )
            .await?;
        Ok(listed.artifacts.into_iter().next())
    }

    async fn add_association(&self, request: &AssociationRequest) -> Result<(), PlatformError> {
        self.send(
            self.request(Method::POST, "lineage/associations").json(request),
            "association",
            &request.source_arn,
        )
        .await
        .map(drop)
    }
}

#[async_trait]
impl ModelRegistry for HttpPlatform {
    async fn create_package_group(
        &self,
        request: &PackageGroupRequest,
    ) -> Result<PackageGroup, PlatformError> {
        self.send_json(
            self.request(Method::POST, "model-package-groups").json(request),
            "model package group",
            &request.name,
        )
        .await
    }

    async fn describe_package_group(
        &self,
        name: &str,
    ) -> Result<Option<PackageGroup>, PlatformError> {
        self.get_optional(&format!("model-package-groups/{name}"), "model package group", name)
            .await
    }

    async fn create_model_package(
        &self,
        request: &ModelPackageRequest,
    ) -> Result<ModelPackage, PlatformError> {
        self.send_json(
            self.request(Method::POST, "model-packages").json(request),
            "model package",
            &request.group_name,
        )
        .await
    }

    async fn update_approval(
        &self,
        package_arn: &str,
        update: &ApprovalUpdate,
    ) -> Result<ModelPackage, PlatformError> {
        self.send_json(
            self.request(Method::PUT, "model-packages/approval")
                .json(&ApprovalPayload { package_arn, update }),
            "model package",
            package_arn,
        )
        .await
    }
}

#[async_trait]
impl EndpointHosting for HttpPlatform {
    async fn deploy(&self, request: &DeployRequest) -> Result<EndpointDescription, PlatformError> {
        self.send_json(
            self.request(Method::POST, "endpoints").json(request),
            "endpoint",
            &request.endpoint_name,
        )
        .await
    }

    async fn describe_endpoint(&self, name: &str) -> Result<EndpointDescription, PlatformError> {
        self.send_json(self.request(Method::GET, &format!("endpoints/{name}")), "endpoint", name)
            .await
    }

    async fn delete_endpoint(&self, name: &str) -> Result<(), PlatformError> {
        self.send(self.request(Method::DELETE, &format!("endpoints/{name}")), "endpoint", name)
            .await
            .map(drop)
    }
}

#[async_trait]
impl ScoringEndpoint for HttpPlatform {
    async fn invoke(
        &self,
        endpoint_name: &str,
        request: &ScoreRequest,
    ) -> Result<ScoreResponse, PlatformError> {
        self.send_json(
            self.request(Method::POST, &format!("endpoints/{endpoint_name}/invocations"))
                .json(request),
            "endpoint",
            endpoint_name,
        )
        .await
    }
}
