pub mod client;
pub mod models;
pub mod sources;
pub mod stage;
pub mod utils;

pub use client::HttpClient;
pub use models::{ClimateExtract, ClimateRow, Coordinates, FetchStatus, WeatherRecord};
pub use sources::{
    ClimateSource, Geocoder, HttpClimateSource, OpenMeteoGeocoder, OpenMeteoWeather,
    WeatherSource, observe_city,
};

use common::Result;
use common::config::Settings;
use std::sync::Arc;

/// The three upstream collaborators of the pipeline.
#[derive(Clone)]
pub struct Sources {
    pub geocoder: Arc<dyn Geocoder>,
    pub weather: Arc<dyn WeatherSource>,
    pub climate: Arc<dyn ClimateSource>,
}

impl Sources {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = HttpClient::new(&settings.api)?;

        Ok(Self {
            geocoder: Arc::new(OpenMeteoGeocoder::new(
                client.clone(),
                &settings.api.geocoding_url,
            )),
            weather: Arc::new(OpenMeteoWeather::new(
                client.clone(),
                &settings.api.weather_url,
            )),
            climate: Arc::new(HttpClimateSource::new(
                client,
                &settings.api.climate_url,
                settings.climate.countries.clone(),
            )),
        })
    }
}
