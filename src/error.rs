use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Missing or invalid field(s): {}.", .0.join(","))]
    Validation(Vec<String>),

    #[error("Malformed paginated query. Missing parameter(s):{}.", .0.join(","))]
    MalformedQuery(Vec<String>),

    #[error("This predictor only supports JSON data")]
    UnsupportedContentType,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AppError::Validation(fields.into_iter().map(Into::into).collect())
    }

    pub fn malformed_query<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AppError::MalformedQuery(params.into_iter().map(Into::into).collect())
    }

    /// Client-side errors are never worth retrying and are not logged as failures
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::MalformedQuery(_) | AppError::UnsupportedContentType
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(_) | AppError::MalformedQuery(_) => {
                let body = Json(json!({ "message": self.to_string() }));
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            AppError::UnsupportedContentType => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                [(header::CONTENT_TYPE, "text/plain")],
                self.to_string(),
            )
                .into_response(),
            AppError::Cache(_)
            | AppError::HttpClient(_)
            | AppError::BackendUnavailable(_)
            | AppError::ModelLoad(_) => {
                // Details stay in the logs; the caller only learns the kind of failure
                tracing::error!(error = %self, "Backend failure");
                let body = Json(json!({ "error": "Backend unavailable" }));
                (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
            }
            AppError::Internal(_) => {
                tracing::error!(error = %self, "Internal failure");
                let body = Json(json!({ "error": "Internal server error" }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
