//! Control channel of a running gateway's offline worker

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::debug;

use crate::{Error, Result};

/// Talks to `/__worker/*` on a gateway
pub struct WorkerControl {
    client: Client,
    base: String,
}

impl WorkerControl {
    /// Client for the gateway at `base` (e.g. `http://127.0.0.1:39500`)
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Post `SKIP_WAITING` so a waiting worker takes over
    pub async fn skip_waiting(&self) -> Result<()> {
        let url = format!("{}/__worker/message", self.base);
        debug!(url = %url, "Posting SKIP_WAITING");
        let response = self
            .client
            .post(&url)
            .json(&json!({ "type": "SKIP_WAITING" }))
            .send()
            .await?;
        match response.status() {
            StatusCode::ACCEPTED | StatusCode::OK => Ok(()),
            status => Err(Self::failure(status, response).await),
        }
    }

    /// Active and waiting workers, buckets and cache statistics
    pub async fn status(&self) -> Result<Value> {
        let url = format!("{}/__worker/status", self.base);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::failure(response.status(), response).await);
        }
        Ok(response.json().await?)
    }

    async fn failure(status: StatusCode, response: reqwest::Response) -> Error {
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| status.to_string());
        Error::api(status.as_u16(), message)
    }
}
