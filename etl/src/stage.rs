//! Encoding of staged objects. Weather records are staged as one JSON
//! document each, climate pulls as one CSV with the upstream header.

use crate::models::{CLIMATE_HEADER, ClimateRow, WeatherRecord};
use common::Result;

pub const WEATHER_EXTENSION: &str = "json";
pub const CLIMATE_EXTENSION: &str = "csv";

pub fn encode_weather(record: &WeatherRecord) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(record)?)
}

pub fn decode_weather(bytes: &[u8]) -> Result<WeatherRecord> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Writes the header even when `rows` is empty, so a degraded pull still
/// stages a well-formed object.
pub fn encode_climate(rows: &[ClimateRow]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(CLIMATE_HEADER)?;
    for row in rows {
        writer.serialize(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| common::Error::Other(format!("Failed to flush climate CSV: {}", e)))
}

pub fn decode_climate(bytes: &[u8]) -> Result<Vec<ClimateRow>> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader.headers()?.clone();
    if headers.iter().ne(CLIMATE_HEADER.iter().copied()) {
        return Err(common::Error::SchemaValidation(format!(
            "unexpected climate header: {:?}",
            headers
        )));
    }

    let mut rows = Vec::new();
    for row in reader.deserialize::<ClimateRow>() {
        rows.push(row?);
    }
    Ok(rows)
}
