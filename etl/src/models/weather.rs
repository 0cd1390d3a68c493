use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a geocoding lookup. `NotAvailable` is the explicit sentinel for
/// unknown cities or an unreachable geocoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Coordinates {
    Known { lat: f64, long: f64 },
    NotAvailable,
}

impl Coordinates {
    pub fn lat(&self) -> Option<f64> {
        match self {
            Coordinates::Known { lat, .. } => Some(*lat),
            Coordinates::NotAvailable => None,
        }
    }

    pub fn long(&self) -> Option<f64> {
        match self {
            Coordinates::Known { long, .. } => Some(*long),
            Coordinates::NotAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Coordinates::Known { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchStatus {
    Ok,
    /// The upstream answered with a non-success HTTP status.
    Upstream(u16),
    /// No usable answer: transport failure, malformed body, missing input.
    Unavailable(String),
}

impl FetchStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchStatus::Ok)
    }
}

/// Current conditions for one city, as staged to object storage.
///
/// Measurement fields are null whenever `status` is not `Ok`, so the load
/// step always receives the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub city: String,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub temperature: Option<f64>,
    pub windspeed: Option<f64>,
    pub winddirection: Option<f64>,
    pub weathercode: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: FetchStatus,
}

impl WeatherRecord {
    pub fn unavailable(city: &str, coordinates: Coordinates, status: FetchStatus) -> Self {
        Self {
            city: city.to_string(),
            lat: coordinates.lat(),
            long: coordinates.long(),
            temperature: None,
            windspeed: None,
            winddirection: None,
            weathercode: None,
            timestamp: None,
            status,
        }
    }

    /// Builds a record from a raw forecast API answer. Never fails: a
    /// non-2xx status or an unexpected body degrades to a null record.
    pub fn from_response(city: &str, coordinates: Coordinates, status: u16, body: &str) -> Self {
        if !(200..300).contains(&status) {
            return Self::unavailable(city, coordinates, FetchStatus::Upstream(status));
        }

        let parsed: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(e) => {
                return Self::unavailable(
                    city,
                    coordinates,
                    FetchStatus::Unavailable(format!("malformed response: {}", e)),
                );
            }
        };

        let Some(current) = parsed.get("current_weather").and_then(Value::as_object) else {
            return Self::unavailable(
                city,
                coordinates,
                FetchStatus::Unavailable("response has no current_weather".to_string()),
            );
        };

        let timestamp = current
            .get("time")
            .and_then(Value::as_str)
            .and_then(parse_api_time);

        Self {
            city: city.to_string(),
            lat: coordinates.lat(),
            long: coordinates.long(),
            temperature: current.get("temperature").and_then(Value::as_f64),
            windspeed: current.get("windspeed").and_then(Value::as_f64),
            winddirection: current.get("winddirection").and_then(Value::as_f64),
            weathercode: current
                .get("weathercode")
                .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))),
            timestamp,
            status: FetchStatus::Ok,
        }
    }
}

// The forecast API reports GMT times without seconds or offset.
fn parse_api_time(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .map(|naive| naive.and_utc())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const BERLIN: Coordinates = Coordinates::Known {
        lat: 52.52,
        long: 13.41,
    };

    #[test]
    fn test_parses_current_weather() {
        let body = r#"{
            "latitude": 52.52,
            "longitude": 13.41,
            "current_weather": {
                "temperature": 12.5,
                "windspeed": 8.2,
                "winddirection": 270.0,
                "weathercode": 3,
                "time": "2024-03-01T10:00"
            }
        }"#;

        let record = WeatherRecord::from_response("Berlin", BERLIN, 200, body);

        assert!(record.status.is_ok());
        assert_eq!(record.temperature, Some(12.5));
        assert_eq!(record.windspeed, Some(8.2));
        assert_eq!(record.winddirection, Some(270.0));
        assert_eq!(record.weathercode, Some(3));
        let ts = record.timestamp.unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day(), ts.hour()), (2024, 3, 1, 10));
    }

    #[test]
    fn test_non_success_status_degrades_to_nulls() {
        let record = WeatherRecord::from_response("Berlin", BERLIN, 503, "Service Unavailable");

        assert_eq!(record.status, FetchStatus::Upstream(503));
        assert_eq!(record.lat, Some(52.52));
        assert_eq!(record.temperature, None);
        assert_eq!(record.windspeed, None);
        assert_eq!(record.winddirection, None);
        assert_eq!(record.weathercode, None);
        assert_eq!(record.timestamp, None);
    }

    #[test]
    fn test_malformed_body_degrades() {
        let record = WeatherRecord::from_response("Berlin", BERLIN, 200, "{\"hourly\": {}}");
        assert!(matches!(record.status, FetchStatus::Unavailable(_)));
        assert_eq!(record.temperature, None);
    }

    #[test]
    fn test_status_serializes_with_detail() {
        let json = serde_json::to_value(FetchStatus::Upstream(404)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "upstream", "detail": 404}));
        let json = serde_json::to_value(Coordinates::NotAvailable).unwrap();
        assert_eq!(json, serde_json::json!({"state": "not_available"}));
    }
}
