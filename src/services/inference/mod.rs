//! Inference boundary
//!
//! The query router reaches preference synthesis and candidate retrieval only
//! through this trait: over HTTP when the inference host is a separate
//! process, or directly when both run in one process.

use crate::{
    error::AppResult,
    models::{InvocationResponse, NewUserAttributes},
};

pub mod http;

pub use http::HttpInferenceClient;

/// Trait for inference hosts
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InferenceEndpoint: Send + Sync {
    /// Computes a ranked item sequence for a user with no history
    async fn invoke(&self, attributes: &NewUserAttributes) -> AppResult<InvocationResponse>;

    /// Endpoint name for logging and debugging
    fn name(&self) -> &'static str;
}
