use crate::utils::retry::retry_with_backoff;
use common::config::ApiConfig;
use common::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use url::Url;

const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared HTTP client for the upstream APIs.
///
/// Transport errors, 429 and 5xx answers are retried with backoff. Any other
/// status is handed back to the caller untouched.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    retries: u32,
    base_delay_ms: u64,
}

impl HttpClient {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &api.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidInput(format!("header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidInput(format!("header value for '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            retries: DEFAULT_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        })
    }

    pub fn with_retries(mut self, retries: u32, base_delay_ms: u64) -> Self {
        self.retries = retries;
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub async fn get(&self, url: &Url) -> Result<HttpResponse> {
        retry_with_backoff(self.retries, self.base_delay_ms, || async move {
            let response = self.client.get(url.clone()).send().await?;
            let status = response.status().as_u16();

            if status == 429 || status >= 500 {
                return Err(Error::UpstreamStatus(status));
            }

            let body = response.text().await?;
            Ok(HttpResponse { status, body })
        })
        .await
    }
}
