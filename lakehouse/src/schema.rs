use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use lazy_static::lazy_static;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Tables held by the analytical store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Weather,
    Climate,
    Reporting,
}

impl TableKind {
    pub const ALL: [TableKind; 3] = [TableKind::Weather, TableKind::Climate, TableKind::Reporting];

    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Weather => "weather",
            TableKind::Climate => "climate",
            TableKind::Reporting => "reporting",
        }
    }

    pub fn schema(&self) -> SchemaRef {
        match self {
            TableKind::Weather => Arc::clone(&WEATHER_SCHEMA),
            TableKind::Climate => Arc::clone(&CLIMATE_SCHEMA),
            TableKind::Reporting => Arc::clone(&REPORTING_SCHEMA),
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn weather_schema() -> Schema {
    Schema::new(vec![
        Field::new("city", DataType::Utf8, false),
        Field::new("lat", DataType::Float64, true),
        Field::new("long", DataType::Float64, true),
        Field::new("temperature", DataType::Float64, true),
        Field::new("windspeed", DataType::Float64, true),
        Field::new("winddirection", DataType::Float64, true),
        Field::new("weathercode", DataType::Int64, true),
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            true,
        ),
    ])
}

pub fn climate_schema() -> Schema {
    Schema::new(vec![
        Field::new("date", DataType::Date32, false),
        Field::new("avg_temp", DataType::Float64, true),
        Field::new("uncertainty", DataType::Float64, true),
        Field::new("country", DataType::Utf8, false),
    ])
}

// Window output columns are nullable whatever the input says.
pub fn reporting_schema() -> Schema {
    Schema::new(vec![
        Field::new("date", DataType::Date32, true),
        Field::new("decade_average", DataType::Float64, true),
        Field::new("year_average", DataType::Float64, true),
        Field::new("month_average", DataType::Float64, true),
        Field::new("day_average", DataType::Float64, true),
    ])
}

lazy_static! {
    static ref WEATHER_SCHEMA: SchemaRef = Arc::new(weather_schema());
    static ref CLIMATE_SCHEMA: SchemaRef = Arc::new(climate_schema());
    static ref REPORTING_SCHEMA: SchemaRef = Arc::new(reporting_schema());
}
