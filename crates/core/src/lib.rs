pub mod candidates;
pub mod config;
pub mod dataset;
pub mod encoding;
pub mod errors;
pub mod matrix;
pub mod metrics;
pub mod prepare;
pub mod ranking;
pub mod state;

pub use candidates::{CandidateRow, CatalogStats, PopularItem};
pub use dataset::{Transaction, TransactionSet};
pub use encoding::{FeatureEncoder, FeatureRow, ModelSignature};
pub use errors::DataError;
pub use metrics::ModelQualityReport;
pub use ranking::{rank, Recommendation};
pub use state::WorkflowState;
