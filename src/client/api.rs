//! Transport to the analysis endpoint

use std::time::Duration;

use analyzer_core::{AnalysisResult, AnalyzePayload};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Shown when a failed response carries no usable message
pub const GENERIC_FAILURE_MESSAGE: &str = "An error occurred during analysis";

/// Shown when a 200 response is not an analysis result
pub const MALFORMED_RESPONSE_MESSAGE: &str = "Received a malformed analysis response";

/// Something that can run an analysis
#[async_trait]
pub trait AnalyzeApi: Send + Sync {
    /// Perform exactly one analysis request
    async fn analyze(&self, payload: &AnalyzePayload) -> Result<AnalysisResult>;
}

/// `POST`s the JSON payload to a fixed endpoint
pub struct HttpAnalyzeApi {
    client: Client,
    endpoint: String,
}

impl HttpAnalyzeApi {
    /// Create a client for `endpoint`, optionally bounded by `timeout`
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().redirect(reqwest::redirect::Policy::limited(5));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Endpoint requests are sent to
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnalyzeApi for HttpAnalyzeApi {
    async fn analyze(&self, payload: &AnalyzePayload) -> Result<AnalysisResult> {
        debug!(endpoint = %self.endpoint, bytes = payload.csv_base64.len(), "Submitting analysis");

        let response = self
            .client
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !status.is_success() {
            let message = failure_message(&body);
            warn!(status = status.as_u16(), message = %message, "Analysis request failed");
            return Err(Error::api(status.as_u16(), message));
        }

        serde_json::from_slice(&body).map_err(|e| {
            warn!(error = %e, "Analysis response did not parse");
            Error::api(status.as_u16(), MALFORMED_RESPONSE_MESSAGE)
        })
    }
}

/// Best message a failure body offers
///
/// `error.message` wins, then a top-level `message` string (the shape the
/// analysis server and the offline worker both use), then the generic text.
pub(crate) fn failure_message(body: &[u8]) -> String {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return GENERIC_FAILURE_MESSAGE.to_string();
    };

    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .or_else(|| value.get("message").and_then(Value::as_str))
        .filter(|m| !m.trim().is_empty())
        .map_or_else(|| GENERIC_FAILURE_MESSAGE.to_string(), str::to_string)
}
