use reqwest::Client as HttpClient;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{InvocationResponse, NewUserAttributes},
    services::inference::InferenceEndpoint,
};

/// Calls `POST {base_url}/invocations` on a remote inference host
#[derive(Clone)]
pub struct HttpInferenceClient {
    http_client: HttpClient,
    invocations_url: String,
}

impl HttpInferenceClient {
    /// The timeout bounds the whole round-trip, connect included
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            invocations_url: format!("{}/invocations", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait::async_trait]
impl InferenceEndpoint for HttpInferenceClient {
    async fn invoke(&self, attributes: &NewUserAttributes) -> AppResult<InvocationResponse> {
        let response = self
            .http_client
            .post(&self.invocations_url)
            .json(&attributes.to_payload())
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timed out" } else { "failed" };
                AppError::BackendUnavailable(format!("Inference request {}: {}", kind, e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                user_id = %attributes.user_id,
                status = %status,
                body = %body,
                "Inference endpoint request failed"
            );
            return Err(AppError::BackendUnavailable(format!(
                "Inference endpoint returned status {}",
                status
            )));
        }

        let invocation: InvocationResponse = response.json().await.map_err(|e| {
            AppError::BackendUnavailable(format!("Failed to parse inference response: {}", e))
        })?;

        tracing::debug!(
            user_id = %attributes.user_id,
            items = invocation.recommendation_id.len(),
            "Inference response received"
        );

        Ok(invocation)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
