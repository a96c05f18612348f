//! Workflow steps over the persisted state.
//!
//! Each step checks that its prerequisites are recorded, talks to the platform
//! and writes its own section of [`WorkflowState`]. Saving is left to the
//! caller so a pipeline can persist after every step.

use recfm_core::candidates::CatalogStats;
use recfm_core::config::AppConfig;
use recfm_core::dataset::{file_digest, TransactionSet};
use recfm_core::encoding::FeatureEncoder;
use recfm_core::errors::DataError;
use recfm_core::prepare::{prepare_dataset, PrepareSummary};
use recfm_core::ranking::Recommendation;
use recfm_core::state::{
    EndpointState, LineageState, RegistryState, TrainingState, WorkflowState,
};

use crate::client::Platform;
use crate::deployment::{deploy_model, teardown};
use crate::errors::WorkflowError;
use crate::lineage::record_training_lineage;
use crate::registry::{approve as approve_package, register_model};
use crate::scorer::{RecommendRequest, RecommendationScorer};
use crate::training::train_model;
use crate::upload::upload_training_inputs;

pub struct Workflow<'a, P: ?Sized> {
    platform: &'a P,
    config: &'a AppConfig,
}

impl<'a, P> Workflow<'a, P>
where
    P: Platform + ?Sized,
{
    pub fn new(platform: &'a P, config: &'a AppConfig) -> Self {
        Self { platform, config }
    }

    pub fn prepare(&self, state: &mut WorkflowState) -> Result<PrepareSummary, WorkflowError> {
        let (dataset, summary) = prepare_dataset(&self.config.data)?;
        state.dataset = Some(dataset);
        Ok(summary)
    }

    /// Upload the prepared exports and train on them. A new model
    /// invalidates lineage and registration recorded for the previous one.
    pub async fn train(&self, state: &mut WorkflowState) -> Result<TrainingState, WorkflowError> {
        let mut dataset = state.require_dataset()?.clone();
        dataset.uploaded = Some(upload_training_inputs(self.platform, &dataset).await?);
        let training = train_model(self.platform, &self.config.training, &dataset).await?;

        state.dataset = Some(dataset);
        state.training = Some(training.clone());
        state.lineage = None;
        state.registry = None;
        Ok(training)
    }

    pub async fn register(
        &self,
        state: &mut WorkflowState,
    ) -> Result<(LineageState, RegistryState), WorkflowError> {
        let dataset = state.require_dataset()?;
        let training = state.require_training()?;

        let lineage = record_training_lineage(self.platform, dataset, training).await?;
        let registry = register_model(
            self.platform,
            &self.config.registry,
            training,
            &self.config.data.work_dir,
        )
        .await?;

        state.lineage = Some(lineage.clone());
        state.registry = Some(registry.clone());
        Ok((lineage, registry))
    }

    /// Approve the registered package so `deploy` accepts it.
    pub async fn approve(
        &self,
        state: &mut WorkflowState,
    ) -> Result<RegistryState, WorkflowError> {
        let mut registry = state.require_registry()?.clone();
        let package = approve_package(
            self.platform,
            &registry.package_arn,
            &self.config.registry.approval_description,
        )
        .await?;

        registry.approval_status = package.approval_status.to_string();
        state.registry = Some(registry.clone());
        Ok(registry)
    }

    pub async fn deploy(&self, state: &mut WorkflowState) -> Result<EndpointState, WorkflowError> {
        let training = state.require_training()?;
        let registry = state.require_registry()?;

        let endpoint =
            deploy_model(self.platform, &self.config.endpoint, registry, &training.signature)
                .await?;
        state.endpoint = Some(endpoint.clone());
        Ok(endpoint)
    }

    /// Score the most popular items for one customer against the deployed
    /// endpoint, using the encoder and reference data from `prepare`. The
    /// transactions file must be byte-identical to the one `prepare` read.
    pub async fn recommend(
        &self,
        state: &WorkflowState,
        request: &RecommendRequest,
    ) -> Result<Vec<Recommendation>, WorkflowError> {
        let dataset = state.require_dataset()?;
        let endpoint = state.require_endpoint()?;

        let reference_path = &self.config.data.transactions_path;
        let digest = file_digest(reference_path)?;
        if !dataset.reference_digest.is_empty() && digest != dataset.reference_digest {
            return Err(DataError::ReferenceChanged {
                path: reference_path.clone(),
                expected: dataset.reference_digest.clone(),
                actual: digest,
            }
            .into());
        }

        let encoder = FeatureEncoder::load(&dataset.encoder_path)?;
        let (reference, _) = TransactionSet::load(reference_path)?;
        let catalog = CatalogStats::from_transactions(reference.rows());

        RecommendationScorer::new(
            self.platform,
            &endpoint.name,
            &encoder,
            &catalog,
            &endpoint.signature,
        )
        .with_batch_size(self.config.endpoint.batch_size)
        .recommend(request)
        .await
    }

    /// Delete the recorded endpoint, or the configured one when none is
    /// recorded. Returns the deleted endpoint name.
    pub async fn teardown(&self, state: &mut WorkflowState) -> Result<String, WorkflowError> {
        let name = state
            .endpoint
            .as_ref()
            .map(|endpoint| endpoint.name.clone())
            .unwrap_or_else(|| self.config.endpoint.name.clone());

        teardown(self.platform, &name).await?;
        state.endpoint = None;
        Ok(name)
    }
}
