use super::Geocoder;
use crate::client::HttpClient;
use crate::models::Coordinates;
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;
use url::Url;

pub struct OpenMeteoGeocoder {
    client: HttpClient,
    base_url: String,
}

impl OpenMeteoGeocoder {
    pub fn new(client: HttpClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl Geocoder for OpenMeteoGeocoder {
    async fn locate(&self, city: &str) -> Coordinates {
        let url = match Url::parse_with_params(&self.base_url, &[("name", city), ("count", "1")]) {
            Ok(url) => url,
            Err(e) => {
                warn!(city, error = %e, "Invalid geocoding URL");
                return Coordinates::NotAvailable;
            }
        };

        match self.client.get(&url).await {
            Ok(response) if response.is_success() => {
                let coordinates = coordinates_from_response(&response.body);
                if !coordinates.is_available() {
                    warn!(city, "Geocoder does not know this city");
                }
                coordinates
            }
            Ok(response) => {
                warn!(city, status = response.status, "Geocoding request failed");
                Coordinates::NotAvailable
            }
            Err(e) => {
                warn!(city, error = %e, "Geocoding request failed");
                Coordinates::NotAvailable
            }
        }
    }
}

/// Reads the first match of a geocoding search answer.
pub fn coordinates_from_response(body: &str) -> Coordinates {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return Coordinates::NotAvailable;
    };

    let first = parsed
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first());

    match first {
        Some(hit) => match (
            hit.get("latitude").and_then(Value::as_f64),
            hit.get("longitude").and_then(Value::as_f64),
        ) {
            (Some(lat), Some(long)) => Coordinates::Known { lat, long },
            _ => Coordinates::NotAvailable,
        },
        None => Coordinates::NotAvailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_result_wins() {
        let body = r#"{"results": [
            {"name": "Berlin", "latitude": 52.52437, "longitude": 13.41053},
            {"name": "Berlin", "latitude": 44.46867, "longitude": -71.18508}
        ]}"#;

        assert_eq!(
            coordinates_from_response(body),
            Coordinates::Known {
                lat: 52.52437,
                long: 13.41053
            }
        );
    }

    #[test]
    fn test_unknown_city_is_sentinel() {
        // The search API omits `results` entirely when nothing matches.
        let body = r#"{"generationtime_ms": 0.4}"#;
        assert_eq!(coordinates_from_response(body), Coordinates::NotAvailable);
    }

    #[test]
    fn test_garbage_is_sentinel() {
        assert_eq!(coordinates_from_response("<html>"), Coordinates::NotAvailable);
    }
}
