use super::ClimateSource;
use crate::client::HttpClient;
use crate::models::{ClimateExtract, FetchStatus};
use async_trait::async_trait;
use common::Error;
use tracing::{info, warn};
use url::Url;

pub struct HttpClimateSource {
    client: HttpClient,
    url: String,
    countries: Vec<String>,
}

impl HttpClimateSource {
    pub fn new(client: HttpClient, url: &str, countries: Vec<String>) -> Self {
        Self {
            client,
            url: url.to_string(),
            countries,
        }
    }
}

#[async_trait]
impl ClimateSource for HttpClimateSource {
    async fn pull(&self) -> ClimateExtract {
        let url = match Url::parse(&self.url) {
            Ok(url) => url,
            Err(e) => {
                warn!(url = %self.url, error = %e, "Invalid climate URL");
                return ClimateExtract::unavailable(FetchStatus::Unavailable(e.to_string()));
            }
        };

        let response = match self.client.get(&url).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                warn!(status = response.status, "Climate download failed");
                return ClimateExtract::unavailable(FetchStatus::Upstream(response.status));
            }
            Err(Error::UpstreamStatus(status)) => {
                warn!(status, "Climate download failed after retries");
                return ClimateExtract::unavailable(FetchStatus::Upstream(status));
            }
            Err(e) => {
                warn!(error = %e, "Climate download failed");
                return ClimateExtract::unavailable(FetchStatus::Unavailable(e.to_string()));
            }
        };

        match ClimateExtract::from_csv(&response.body, &self.countries) {
            Ok(extract) => {
                info!(rows = extract.rows.len(), "Climate dataset downloaded");
                extract
            }
            Err(e) => {
                warn!(error = %e, "Climate dataset is not parseable");
                ClimateExtract::unavailable(FetchStatus::Unavailable(e.to_string()))
            }
        }
    }
}
