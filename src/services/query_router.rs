use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{
    db::{ParameterStore, RecommendationCache},
    error::{AppError, AppResult},
    models::{
        NewUserSubmission, PageSelector, QueryType, RawQueryParams, RecommendationRecord,
        RecommendationResponse,
    },
    services::inference::InferenceEndpoint,
    services::pagination,
};

const PAGINATED_MESSAGE: &str = "Paginated response for the requested page_id.";
const RANGE_MESSAGE: &str =
    "Range query response. Returning the set of recommendations for the requested range.";
const UNREGISTERED_PREFIX: &str = "[Unregistered user] ";

/// Source of the current time in epoch seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Result of a successfully handled query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Served(RecommendationResponse),
    /// No usable record; the caller should resubmit with user attributes
    PotentialNewUser,
}

/// Entry point for recommendation queries
///
/// Registered users are answered from the cache. New users go through the
/// inference endpoint, and the fresh result is written to the cache before it
/// is sliced and returned. Nothing is retried here and nothing is cached
/// unless the whole inference round-trip succeeded.
pub struct QueryRouter {
    cache: Arc<dyn RecommendationCache>,
    inference: Arc<dyn InferenceEndpoint>,
    parameters: Arc<dyn ParameterStore>,
    clock: Arc<dyn Clock>,
    inference_timeout: Duration,
}

impl QueryRouter {
    pub fn new(
        cache: Arc<dyn RecommendationCache>,
        inference: Arc<dyn InferenceEndpoint>,
        parameters: Arc<dyn ParameterStore>,
        inference_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            inference,
            parameters,
            clock: Arc::new(SystemClock),
            inference_timeout,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Lookup for a user with precomputed recommendations
    pub async fn registered(&self, params: &RawQueryParams) -> AppResult<QueryOutcome> {
        let query = params.validate()?;
        let q_type = query.selector.query_type();

        if let Some(model_id) = query.model_id {
            tracing::debug!(
                user_id = %query.user_id,
                requested_model_id = model_id,
                "Historical model ids are not addressable, serving latest"
            );
        }

        let record = self
            .cache
            .get_latest(&query.user_id)
            .await
            .map_err(|e| log_failure(e, &query.user_id, q_type))?;

        match record {
            None => {
                tracing::info!(user_id = %query.user_id, "No cached recommendations");
                Ok(QueryOutcome::PotentialNewUser)
            }
            Some(record) if record.is_expired_at(self.clock.now()) => {
                tracing::info!(
                    user_id = %query.user_id,
                    model_id = record.model_id,
                    expiry_time = record.expiry_time,
                    "Cached recommendations expired"
                );
                Ok(QueryOutcome::PotentialNewUser)
            }
            Some(record) => {
                tracing::debug!(user_id = %query.user_id, model_id = record.model_id, "Cache hit");
                Ok(QueryOutcome::Served(shape(&record, query.selector)))
            }
        }
    }

    /// Computes, caches and serves recommendations for a user with no history
    pub async fn new_user(&self, submission: &NewUserSubmission) -> AppResult<QueryOutcome> {
        // Everything is validated before any external call
        let attributes = submission.attributes.validate()?;
        let selector = PageSelector::from_parts(
            submission.q_type.as_deref(),
            submission.q_page_id.as_deref(),
        )?;
        let q_type = selector.query_type();
        let user_id = attributes.user_id.as_str();

        let start = Instant::now();
        let invocation = tokio::time::timeout(
            self.inference_timeout,
            self.inference.invoke(&attributes),
        )
        .await
        .map_err(|_| {
            AppError::BackendUnavailable(format!(
                "Inference timed out after {}ms",
                self.inference_timeout.as_millis()
            ))
        })
        .and_then(|result| result)
        .map_err(|e| log_failure(e, user_id, q_type))?;

        tracing::info!(
            user_id = %user_id,
            items = invocation.recommendation_id.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Inference completed"
        );

        if invocation.user_id != attributes.user_id {
            let err = AppError::BackendUnavailable(format!(
                "Inference answered for user {}",
                invocation.user_id
            ));
            return Err(log_failure(err, user_id, q_type));
        }

        let retrain_interval_days = self
            .parameters
            .retrain_interval_days()
            .await
            .map_err(|e| log_failure(e, user_id, q_type))?;

        let record = RecommendationRecord::fresh(
            attributes.user_id.clone(),
            invocation.recommendation_id,
            self.clock.now(),
            retrain_interval_days,
        );

        self.cache
            .put(&record)
            .await
            .map_err(|e| log_failure(e, user_id, q_type))?;

        tracing::info!(
            user_id = %user_id,
            model_id = record.model_id,
            expiry_time = record.expiry_time,
            "Recommendation record written"
        );

        let mut response = shape(&record, selector);
        response.message = format!("{}{}", UNREGISTERED_PREFIX, response.message);
        Ok(QueryOutcome::Served(response))
    }
}

fn log_failure(err: AppError, user_id: &str, q_type: QueryType) -> AppError {
    if !err.is_client_error() {
        tracing::error!(
            error = %err,
            user_id = %user_id,
            q_type = q_type.as_str(),
            "Backend call failed"
        );
    }
    err
}

/// Slices a record for transport; `expiry_time` never leaves the service
fn shape(record: &RecommendationRecord, selector: PageSelector) -> RecommendationResponse {
    let items = pagination::select(record.recommendation_id.as_slice(), selector).to_vec();
    let message = match selector {
        PageSelector::Page(_) => PAGINATED_MESSAGE,
        PageSelector::Range(_) => RANGE_MESSAGE,
    };
    RecommendationResponse {
        user_id: record.user_id.clone(),
        model_id: record.model_id.to_string(),
        recommendation_id: items,
        message: message.to_string(),
    }
}
