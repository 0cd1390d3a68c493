mod climate;
mod geocoding;
mod weather;

pub use climate::HttpClimateSource;
pub use geocoding::{OpenMeteoGeocoder, coordinates_from_response};
pub use weather::OpenMeteoWeather;

use crate::models::{ClimateExtract, Coordinates, WeatherRecord};
use async_trait::async_trait;

/// Resolves a city name to coordinates. Unknown names and lookup failures
/// yield [`Coordinates::NotAvailable`].
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn locate(&self, city: &str) -> Coordinates;
}

/// Current conditions at a location. Failures produce a null-valued record.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self, city: &str, coordinates: Coordinates) -> WeatherRecord;
}

/// Historical country temperatures. Failures produce an empty extract.
#[async_trait]
pub trait ClimateSource: Send + Sync {
    async fn pull(&self) -> ClimateExtract;
}

/// Geocodes `city` and fetches its current weather.
pub async fn observe_city(
    geocoder: &dyn Geocoder,
    weather: &dyn WeatherSource,
    city: &str,
) -> WeatherRecord {
    let coordinates = geocoder.locate(city).await;
    weather.current(city, coordinates).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpClient;
    use crate::models::FetchStatus;
    use common::config::ApiConfig;
    use std::collections::HashMap;

    struct NowhereGeocoder;

    #[async_trait]
    impl Geocoder for NowhereGeocoder {
        async fn locate(&self, _city: &str) -> Coordinates {
            Coordinates::NotAvailable
        }
    }

    fn api() -> ApiConfig {
        ApiConfig {
            geocoding_url: "http://127.0.0.1:9/search".to_string(),
            weather_url: "http://127.0.0.1:9/forecast".to_string(),
            climate_url: "http://127.0.0.1:9/climate.csv".to_string(),
            timeout_secs: 1,
            headers: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_unknown_city_degrades_weather_without_request() {
        let client = HttpClient::new(&api()).unwrap().with_retries(0, 0);
        let weather = OpenMeteoWeather::new(client, &api().weather_url);

        let record = observe_city(&NowhereGeocoder, &weather, "Atlantis").await;

        assert_eq!(record.city, "Atlantis");
        assert_eq!(record.lat, None);
        assert_eq!(record.long, None);
        assert_eq!(record.temperature, None);
        assert_eq!(
            record.status,
            FetchStatus::Unavailable("coordinates not available".to_string())
        );
    }

    #[tokio::test]
    async fn test_unreachable_climate_source_degrades_to_empty_extract() {
        let client = HttpClient::new(&api()).unwrap().with_retries(0, 0);
        let source = HttpClimateSource::new(client, &api().climate_url, Vec::new());

        let extract = source.pull().await;

        assert!(extract.rows.is_empty());
        assert!(!extract.status.is_ok());
    }
}
