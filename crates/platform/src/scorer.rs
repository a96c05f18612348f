//! Scoring candidate items for one customer against the live endpoint.

use recfm_core::candidates::{CandidateRow, CatalogStats};
use recfm_core::encoding::{FeatureEncoder, ModelSignature};
use recfm_core::errors::DataError;
use recfm_core::matrix::sparse_rows;
use recfm_core::ranking::{rank, Recommendation};
use serde::{Deserialize, Serialize};

use crate::client::ScoringEndpoint;
use crate::errors::WorkflowError;
use crate::types::ScoreRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendRequest {
    pub customer_id: String,
    /// How many of the most popular items are scored.
    pub pool_size: usize,
    /// How many ranked items are returned.
    pub count: usize,
}

pub struct RecommendationScorer<'a, E: ?Sized> {
    endpoint: &'a E,
    endpoint_name: &'a str,
    encoder: &'a FeatureEncoder,
    catalog: &'a CatalogStats,
    signature: &'a ModelSignature,
    batch_size: usize,
}

impl<'a, E> RecommendationScorer<'a, E>
where
    E: ScoringEndpoint + ?Sized,
{
    pub fn new(
        endpoint: &'a E,
        endpoint_name: &'a str,
        encoder: &'a FeatureEncoder,
        catalog: &'a CatalogStats,
        signature: &'a ModelSignature,
    ) -> Self {
        Self { endpoint, endpoint_name, encoder, catalog, signature, batch_size: 500 }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Rank the candidate pool for `request.customer_id` by model score.
    ///
    /// Fails before any endpoint call when the local encoder is not the one
    /// the deployed model was trained with.
    pub async fn recommend(
        &self,
        request: &RecommendRequest,
    ) -> Result<Vec<Recommendation>, WorkflowError> {
        self.encoder.ensure_compatible(self.signature)?;

        let candidates = self.catalog.candidate_rows(&request.customer_id, request.pool_size);
        if candidates.is_empty() || request.count == 0 {
            return Ok(Vec::new());
        }

        let scores = self.score(&candidates).await?;
        let ranked = rank(candidates, &scores, request.count)?;
        tracing::info!(
            event_name = "recommend.ranked",
            customer_id = %request.customer_id,
            pool_size = request.pool_size,
            returned = ranked.len(),
            "recommendations ranked"
        );
        Ok(ranked)
    }

    async fn score(&self, candidates: &[CandidateRow]) -> Result<Vec<f32>, WorkflowError> {
        let matrix = self.encoder.encode_rows(candidates.iter().map(CandidateRow::as_feature_row));
        let rows = sparse_rows(&matrix);
        let feature_dim = self.encoder.feature_dim();

        let mut scores = Vec::with_capacity(rows.len());
        for batch in rows.chunks(self.batch_size) {
            let request = ScoreRequest::from_rows(batch, feature_dim);
            let response = self.endpoint.invoke(self.endpoint_name, &request).await?;
            if response.predictions.len() != batch.len() {
                return Err(DataError::ScoreCountMismatch {
                    expected: batch.len(),
                    actual: response.predictions.len(),
                }
                .into());
            }
            tracing::debug!(
                event_name = "recommend.batch.scored",
                endpoint = %self.endpoint_name,
                instances = batch.len(),
                "scored batch"
            );
            scores.extend(response.predictions.iter().map(|prediction| prediction.score));
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;
    use recfm_core::candidates::CatalogStats;
    use recfm_core::dataset::{Transaction, TransactionSet};
    use recfm_core::encoding::{FeatureEncoder, ModelSignature};

    use super::{RecommendRequest, RecommendationScorer};
    use crate::client::ScoringEndpoint;
    use crate::errors::{PlatformError, WorkflowError};
    use crate::memory::InMemoryPlatform;
    use crate::types::{Prediction, ScoreRequest, ScoreResponse};

    fn transaction(stock_code: &str, description: &str, customer_id: &str) -> Transaction {
        Transaction {
            invoice_no: "536365".to_owned(),
            stock_code: stock_code.to_owned(),
            description: description.to_owned(),
            quantity: 6,
            invoice_date: "2010-12-01 08:26:00".to_owned(),
            unit_price: 2.55,
            customer_id: customer_id.to_owned(),
            country: "United Kingdom".to_owned(),
        }
    }

    fn reference() -> Vec<Transaction> {
        vec![
            transaction("85123A", "WHITE HANGING HEART T-LIGHT HOLDER", "17850"),
            transaction("85123A", "WHITE HANGING HEART T-LIGHT HOLDER", "13047"),
            transaction("85123A", "WHITE HANGING HEART T-LIGHT HOLDER", "12583"),
            transaction("71053", "WHITE METAL LANTERN", "17850"),
            transaction("71053", "WHITE METAL LANTERN", "13047"),
            transaction("84406B", "CREAM CUPID HEARTS COAT HANGER", "17850"),
            transaction("22633", "HAND WARMER UNION JACK", "12583"),
        ]
    }

    /// Scores each instance by its position in the batch.
    struct PositionEndpoint;

    #[async_trait]
    impl ScoringEndpoint for PositionEndpoint {
        async fn invoke(
            &self,
            _endpoint_name: &str,
            request: &ScoreRequest,
        ) -> Result<ScoreResponse, PlatformError> {
            Ok(ScoreResponse {
                predictions: (0..request.len())
                    .map(|index| Prediction { score: index as f32 })
                    .collect(),
            })
        }
    }

    struct ShortEndpoint;

    #[async_trait]
    impl ScoringEndpoint for ShortEndpoint {
        async fn invoke(
            &self,
            _endpoint_name: &str,
            _request: &ScoreRequest,
        ) -> Result<ScoreResponse, PlatformError> {
            Ok(ScoreResponse { predictions: vec![Prediction { score: 1.0 }] })
        }
    }

    fn request(pool_size: usize, count: usize) -> RecommendRequest {
        RecommendRequest { customer_id: "17850".to_owned(), pool_size, count }
    }

    /// Equal popularity, equal description and price counts, and customers
    /// split evenly between two countries.
    const TIED_CSV: &str = "\
InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country
1,A1,RED MUG,2,2010-12-01 08:26:00,1.25,100,France
2,A1,RED MUG LARGE,2,2010-12-01 08:26:00,2.50,200,Germany
3,B2,BLUE BOWL,1,2010-12-01 08:26:00,3.00,100,Germany
4,B2,BLUE BOWL,1,2010-12-01 08:26:00,3.00,200,France
5,C3,GREEN JUG,4,2010-12-01 08:26:00,0.85,300,Spain
6,D4,YELLOW CUP,4,2010-12-01 08:26:00,0.85,300,Portugal
7,E5,PINK PLATE,1,2010-12-01 08:26:00,1.10,400,Spain
8,F6,GREY TRAY,1,2010-12-01 08:26:00,1.10,400,Portugal
";

    fn fit_from_csv() -> (FeatureEncoder, CatalogStats) {
        let (set, _) =
            TransactionSet::from_reader(TIED_CSV.as_bytes(), Path::new("tied.csv")).expect("load");
        let encoder = FeatureEncoder::fit(set.rows(), 3).expect("fit");
        (encoder, CatalogStats::from_transactions(set.rows()))
    }

    #[tokio::test]
    async fn identical_data_and_model_give_identical_rankings() {
        let (first_encoder, first_catalog) = fit_from_csv();
        let (second_encoder, second_catalog) = fit_from_csv();
        assert_eq!(first_encoder.signature(), second_encoder.signature());
        let signature = first_encoder.signature();
        let platform = InMemoryPlatform::default();

        for customer in ["100", "300", "999"] {
            let request =
                RecommendRequest { customer_id: customer.to_owned(), pool_size: 10, count: 10 };
            let first = RecommendationScorer::new(
                &platform,
                "ep",
                &first_encoder,
                &first_catalog,
                &signature,
            )
            .recommend(&request)
            .await
            .expect("first");
            let second = RecommendationScorer::new(
                &platform,
                "ep",
                &second_encoder,
                &second_catalog,
                &signature,
            )
            .recommend(&request)
            .await
            .expect("second");

            assert_eq!(first.len(), 6);
            assert_eq!(first, second, "customer {customer}");
        }
    }

    #[tokio::test]
    async fn ranks_pool_by_score_and_truncates() {
        let rows = reference();
        let encoder = FeatureEncoder::fit(&rows, 4).expect("fit");
        let catalog = CatalogStats::from_transactions(&rows);
        let signature = encoder.signature();

        let scorer =
            RecommendationScorer::new(&PositionEndpoint, "ep", &encoder, &catalog, &signature);
        let ranked = scorer.recommend(&request(3, 2)).await.expect("recommend");

        // Pool order is 85123A, 71053, then 22633 and 84406B tie on one customer.
        let codes: Vec<&str> = ranked.iter().map(|item| item.stock_code.as_str()).collect();
        assert_eq!(codes, vec!["22633", "71053"]);
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[tokio::test]
    async fn pool_is_sent_in_batches() {
        let rows = reference();
        let encoder = FeatureEncoder::fit(&rows, 4).expect("fit");
        let catalog = CatalogStats::from_transactions(&rows);
        let signature = encoder.signature();
        let platform = InMemoryPlatform::default();

        let ranked = RecommendationScorer::new(&platform, "ep", &encoder, &catalog, &signature)
            .with_batch_size(3)
            .recommend(&request(4, 4))
            .await
            .expect("recommend");

        assert_eq!(ranked.len(), 4);
        assert_eq!(platform.invocation_batches().await, vec![3, 1]);
    }

    #[tokio::test]
    async fn mismatched_signature_blocks_scoring() {
        let rows = reference();
        let encoder = FeatureEncoder::fit(&rows, 4).expect("fit");
        let catalog = CatalogStats::from_transactions(&rows);
        let stale = ModelSignature { fingerprint: "stale".to_owned(), ..encoder.signature() };
        let platform = InMemoryPlatform::default();

        let error = RecommendationScorer::new(&platform, "ep", &encoder, &catalog, &stale)
            .recommend(&request(4, 4))
            .await
            .expect_err("mismatch");

        assert_eq!(error.error_class(), "model_contract");
        assert!(platform.invocation_batches().await.is_empty());
    }

    #[tokio::test]
    async fn empty_pool_makes_no_calls() {
        let rows = reference();
        let encoder = FeatureEncoder::fit(&rows, 4).expect("fit");
        let catalog = CatalogStats::from_transactions(&rows);
        let signature = encoder.signature();
        let platform = InMemoryPlatform::default();

        let ranked = RecommendationScorer::new(&platform, "ep", &encoder, &catalog, &signature)
            .recommend(&request(0, 5))
            .await
            .expect("recommend");

        assert!(ranked.is_empty());
        assert!(platform.invocation_batches().await.is_empty());
    }

    #[tokio::test]
    async fn short_responses_are_rejected() {
        let rows = reference();
        let encoder = FeatureEncoder::fit(&rows, 4).expect("fit");
        let catalog = CatalogStats::from_transactions(&rows);
        let signature = encoder.signature();

        let error = RecommendationScorer::new(&ShortEndpoint, "ep", &encoder, &catalog, &signature)
            .recommend(&request(3, 3))
            .await
            .expect_err("short");

        assert!(matches!(error, WorkflowError::Data(_)));
    }
}
