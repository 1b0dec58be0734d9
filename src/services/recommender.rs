use std::sync::Arc;
use std::time::Instant;

use crate::{
    error::{AppError, AppResult},
    models::{InvocationResponse, ItemSequence, NewUserAttributes},
    services::inference::InferenceEndpoint,
    services::model::ModelHolder,
    services::retriever::retrieve,
    services::synthesizer::synthesize,
};

/// Serves new-user recommendations from the loaded reference data
///
/// Backs `/invocations` on an inference host and doubles as the in-process
/// inference endpoint when the query router runs in the same process.
pub struct RecommendationService {
    holder: Arc<ModelHolder>,
    count: usize,
}

impl RecommendationService {
    pub fn new(holder: Arc<ModelHolder>, count: usize) -> Self {
        Self { holder, count }
    }

    pub fn holder(&self) -> &Arc<ModelHolder> {
        &self.holder
    }

    pub async fn recommend(&self, attributes: &NewUserAttributes) -> AppResult<InvocationResponse> {
        let start = Instant::now();
        let reference = self.holder.get().await?;

        let user = attributes.clone();
        let count = self.count;
        let ranked = tokio::task::spawn_blocking(move || {
            let vectors = synthesize(&user, &reference);
            retrieve(&user.user_id, &vectors, &reference, count)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Recommendation task failed: {}", e)))??;

        tracing::info!(
            user_id = %attributes.user_id,
            items = ranked.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Recommendations generated"
        );

        Ok(InvocationResponse {
            user_id: attributes.user_id.clone(),
            recommendation_id: ItemSequence::new(ranked.items),
            index: ranked.segments,
        })
    }
}

#[async_trait::async_trait]
impl InferenceEndpoint for RecommendationService {
    async fn invoke(&self, attributes: &NewUserAttributes) -> AppResult<InvocationResponse> {
        self.recommend(attributes).await
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUserPayload;
    use crate::services::ann::IndexParams;
    use crate::services::model::{fixtures, StaticReferenceSource};
    use std::collections::HashSet;

    fn service(count: usize) -> RecommendationService {
        let source = Arc::new(StaticReferenceSource::new(fixtures::bundle()));
        let holder = Arc::new(ModelHolder::new(source, IndexParams::default()));
        RecommendationService::new(holder, count)
    }

    fn attributes() -> NewUserAttributes {
        NewUserPayload {
            user_id: Some("u1".to_string()),
            gender: Some("F".to_string()),
            location_id: Some("loc1".to_string()),
            birthdate: Some("1995-01-01".to_string()),
            following_categories: Some(vec!["sports".to_string(), "music".to_string()]),
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn test_recommend_returns_k_distinct_items() {
        let service = service(100);
        let response = service.recommend(&attributes()).await.unwrap();

        assert_eq!(response.user_id, "u1");
        assert_eq!(response.recommendation_id.len(), 100);
        assert_eq!(response.index.len(), 100);
        let unique: HashSet<&String> = response.recommendation_id.as_slice().iter().collect();
        assert_eq!(unique.len(), 100);
        assert!(!response.recommendation_id.as_slice().contains(&"a0".to_string()));
        assert!(service.holder().is_loaded());
    }

    #[tokio::test]
    async fn test_small_segment_user_still_gets_k_items() {
        let service = service(100);
        let mut user = attributes();
        user.followed_categories = ["music".to_string()].into_iter().collect();

        let response = service.recommend(&user).await.unwrap();
        assert_eq!(response.recommendation_id.len(), 100);
        assert_eq!(response.index.iter().filter(|s| *s == "arts").count(), 60);
    }

    #[tokio::test]
    async fn test_repeated_submission_is_identical() {
        let service = service(50);
        let first = service.invoke(&attributes()).await.unwrap();
        let second = service.invoke(&attributes()).await.unwrap();
        assert_eq!(first, second);
    }
}
