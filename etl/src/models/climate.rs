use super::FetchStatus;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Column names of the country temperature dataset, used verbatim for staged
/// climate objects.
pub const CLIMATE_HEADER: [&str; 4] = [
    "dt",
    "AverageTemperature",
    "AverageTemperatureUncertainty",
    "Country",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateRow {
    #[serde(rename = "dt")]
    pub date: NaiveDate,
    #[serde(rename = "AverageTemperature")]
    pub average_temperature: Option<f64>,
    #[serde(rename = "AverageTemperatureUncertainty")]
    pub uncertainty: Option<f64>,
    #[serde(rename = "Country")]
    pub country: String,
}

/// One pull of the climate dataset. On upstream failure `rows` is empty and
/// `status` records why.
#[derive(Debug, Clone, PartialEq)]
pub struct ClimateExtract {
    pub status: FetchStatus,
    pub rows: Vec<ClimateRow>,
}

impl ClimateExtract {
    pub fn unavailable(status: FetchStatus) -> Self {
        Self {
            status,
            rows: Vec::new(),
        }
    }

    /// Parses an upstream CSV body, keeping only `countries` when non-empty.
    pub fn from_csv(body: &str, countries: &[String]) -> common::Result<Self> {
        let mut reader = csv::Reader::from_reader(body.as_bytes());
        let mut rows = Vec::new();

        for row in reader.deserialize::<ClimateRow>() {
            let row = row?;
            if countries.is_empty() || countries.iter().any(|c| c == &row.country) {
                rows.push(row);
            }
        }

        Ok(Self {
            status: FetchStatus::Ok,
            rows,
        })
    }
}
