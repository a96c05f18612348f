pub mod client;
pub mod deployment;
pub mod errors;
pub mod http;
pub mod lineage;
pub mod memory;
pub mod poll;
pub mod registry;
pub mod scorer;
pub mod training;
pub mod types;
pub mod upload;
pub mod workflow;

pub use client::{
    EndpointHosting, LineageStore, ModelRegistry, ObjectStore, Platform, ScoringEndpoint,
    TrainingService,
};
pub use errors::{PlatformError, WorkflowError};
pub use http::HttpPlatform;
pub use memory::{InMemoryPlatform, MemoryBehaviour};
pub use scorer::{RecommendRequest, RecommendationScorer};
pub use workflow::Workflow;
