//! Compute function contract and HTTP client.
//!
//! The function receives the inbound envelope encoded as JSON and answers
//! with raw text: nothing, one envelope, or an array of envelopes. Decoding
//! that text is the result parser's job, not the client's.

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{Error, FunctionConfig, Result};

/// Content type used when posting envelopes to the function.
pub const CLOUDEVENTS_JSON: &str = "application/cloudevents+json";

/// A compute function the dispatcher can invoke.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComputeFunction: Send + Sync {
    /// Invoke with encoded input. `Ok(None)` means the function produced no output.
    async fn invoke(&self, input: String) -> Result<Option<String>>;
}

/// Compute function reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFunction {
    client: reqwest::Client,
    url: String,
}

impl HttpFunction {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Build from config; fails if no URL is configured.
    pub fn from_config(config: &FunctionConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| Error::config("function.url is required"))?;
        Self::new(url, config.timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ComputeFunction for HttpFunction {
    async fn invoke(&self, input: String) -> Result<Option<String>> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, CLOUDEVENTS_JSON)
            .body(input)
            .send()
            .await
            .map_err(|e| Error::invocation(format!("request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::invocation(format!("reading response from {} failed: {}", self.url, e)))?;

        if !status.is_success() {
            return Err(Error::invocation(format!(
                "{} returned {}: {}",
                self.url,
                status,
                truncate(&body, 512)
            )));
        }

        tracing::debug!(url = %self.url, status = %status, bytes = body.len(), "function invoked");

        Ok(if body.trim().is_empty() { None } else { Some(body) })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
