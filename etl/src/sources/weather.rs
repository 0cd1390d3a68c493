use super::WeatherSource;
use crate::client::HttpClient;
use crate::models::{Coordinates, FetchStatus, WeatherRecord};
use async_trait::async_trait;
use common::Error;
use tracing::warn;
use url::Url;

pub struct OpenMeteoWeather {
    client: HttpClient,
    base_url: String,
}

impl OpenMeteoWeather {
    pub fn new(client: HttpClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoWeather {
    async fn current(&self, city: &str, coordinates: Coordinates) -> WeatherRecord {
        let Coordinates::Known { lat, long } = coordinates else {
            warn!(city, "Skipping weather request, coordinates not available");
            return WeatherRecord::unavailable(
                city,
                coordinates,
                FetchStatus::Unavailable("coordinates not available".to_string()),
            );
        };

        let url = match Url::parse_with_params(
            &self.base_url,
            &[
                ("latitude", lat.to_string()),
                ("longitude", long.to_string()),
                ("current_weather", "true".to_string()),
            ],
        ) {
            Ok(url) => url,
            Err(e) => {
                return WeatherRecord::unavailable(
                    city,
                    coordinates,
                    FetchStatus::Unavailable(format!("invalid weather URL: {}", e)),
                );
            }
        };

        match self.client.get(&url).await {
            Ok(response) => {
                if !response.is_success() {
                    warn!(city, status = response.status, "Weather request failed");
                }
                WeatherRecord::from_response(city, coordinates, response.status, &response.body)
            }
            Err(Error::UpstreamStatus(status)) => {
                warn!(city, status, "Weather request failed after retries");
                WeatherRecord::unavailable(city, coordinates, FetchStatus::Upstream(status))
            }
            Err(e) => {
                warn!(city, error = %e, "Weather request failed");
                let status = FetchStatus::Unavailable(e.to_string());
                WeatherRecord::unavailable(city, coordinates, status)
            }
        }
    }
}
