use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{
        InvocationResponse, NewUserPayload, NewUserSubmission, RawQueryParams,
        ALL_QUERY_PARAMETERS,
    },
    services::{QueryOutcome, QueryRouter, RecommendationService},
};

/// Body of the 202 reply to a registered-user query with no usable record
pub const POTENTIAL_NEW_USER_MESSAGE: &str =
    "Potential new user. Send user's features as a separate query.";

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Registered-user lookup
pub async fn get_recommendations(
    State(router): State<Arc<QueryRouter>>,
    params: Result<Query<RawQueryParams>, QueryRejection>,
) -> AppResult<Response> {
    let Query(params) = params.map_err(|e| {
        tracing::debug!(error = %e, "Unreadable query string");
        AppError::malformed_query(ALL_QUERY_PARAMETERS)
    })?;
    tracing::info!(
        user_id = ?params.q_user_id,
        q_type = ?params.q_type,
        "Registered user query"
    );
    let outcome = router.registered(&params).await?;
    Ok(outcome_response(outcome))
}

/// New-user submission
pub async fn post_recommendations(
    State(router): State<Arc<QueryRouter>>,
    body: Bytes,
) -> AppResult<Response> {
    let submission: NewUserSubmission = parse_body(&body)?;
    tracing::info!(
        user_id = ?submission.attributes.user_id,
        q_type = ?submission.q_type,
        "New user query"
    );
    let outcome = router.new_user(&submission).await?;
    Ok(outcome_response(outcome))
}

/// Loads the model on first call; 404 until it loads
pub async fn ping(State(service): State<Arc<RecommendationService>>) -> (StatusCode, Json<Value>) {
    match service.holder().get().await {
        Ok(_) => (StatusCode::OK, Json(json!({}))),
        Err(e) => {
            tracing::warn!(error = %e, "Model not available");
            (StatusCode::NOT_FOUND, Json(json!({})))
        }
    }
}

/// Inference for one new user
pub async fn invocations(
    State(service): State<Arc<RecommendationService>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<InvocationResponse>> {
    if !is_json(&headers) {
        return Err(AppError::UnsupportedContentType);
    }
    let payload: NewUserPayload = parse_body(&body)?;
    let attributes = payload.validate()?;
    let response = service.recommend(&attributes).await?;
    Ok(Json(response))
}

fn outcome_response(outcome: QueryOutcome) -> Response {
    match outcome {
        QueryOutcome::Served(response) => (StatusCode::OK, Json(response)).into_response(),
        QueryOutcome::PotentialNewUser => {
            (StatusCode::ACCEPTED, Json(POTENTIAL_NEW_USER_MESSAGE)).into_response()
        }
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Unreadable request body");
        AppError::validation(["body"])
    })
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}
