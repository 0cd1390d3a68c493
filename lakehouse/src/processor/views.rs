use super::table::TableStore;
use crate::schema::TableKind;
use crate::storage::ObjectStorage;
use crate::utils::arrow::write_parquet;
use crate::utils::paths::{LATEST_WEATHER_VIEW_KEY, REPORTING_VIEW_KEY};
use arrow::record_batch::RecordBatch;
use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

pub const LATEST_WEATHER_SQL: &str = r#"
SELECT city, lat, "long", temperature, windspeed, winddirection, weathercode, "timestamp"
FROM (
    SELECT
        *,
        ROW_NUMBER() OVER (PARTITION BY city ORDER BY "timestamp" DESC NULLS LAST) AS rn
    FROM weather
) AS ranked
WHERE rn = 1
ORDER BY city
"#;

/// Aggregation granularity of the reporting table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grain {
    Decade,
    Year,
    Month,
    Day,
}

impl Grain {
    pub const ALL: [Grain; 4] = [Grain::Decade, Grain::Year, Grain::Month, Grain::Day];

    pub fn column(&self) -> &'static str {
        match self {
            Grain::Decade => "decade_average",
            Grain::Year => "year_average",
            Grain::Month => "month_average",
            Grain::Day => "day_average",
        }
    }

    /// Keeps `date` and this grain's column.
    pub fn project(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        let date = schema.index_of("date")?;
        let value = schema.index_of(self.column())?;
        Ok(batch.project(&[date, value])?)
    }
}

impl fmt::Display for Grain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Grain::Decade => "decade",
            Grain::Year => "year",
            Grain::Month => "month",
            Grain::Day => "day",
        };
        f.write_str(name)
    }
}

impl FromStr for Grain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "decade" => Ok(Grain::Decade),
            "year" => Ok(Grain::Year),
            "month" => Ok(Grain::Month),
            "day" => Ok(Grain::Day),
            other => Err(Error::InvalidInput(format!(
                "unknown grain '{}', expected decade, year, month or day",
                other
            ))),
        }
    }
}

/// Most recent weather row per city.
pub async fn latest_weather(store: &TableStore) -> Result<Vec<RecordBatch>> {
    store.execute(LATEST_WEATHER_SQL).await
}

pub async fn reporting_for(store: &TableStore, grain: Grain) -> Result<Vec<RecordBatch>> {
    let sql = format!(
        r#"SELECT "date", {} FROM reporting ORDER BY "date""#,
        grain.column()
    );
    store.execute(&sql).await
}

/// Exports both dashboard views as parquet objects to `bucket`.
pub async fn publish_views(
    store: &TableStore,
    storage: &dyn ObjectStorage,
    bucket: &str,
) -> Result<()> {
    let latest = latest_weather(store).await?;
    let weather_schema = TableKind::Weather.schema();
    let latest = latest
        .iter()
        .map(|batch| RecordBatch::try_new(Arc::clone(&weather_schema), batch.columns().to_vec()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let data = write_parquet(weather_schema, &latest)?;
    storage.put_object(bucket, LATEST_WEATHER_VIEW_KEY, &data).await?;

    let reporting = store.snapshot(TableKind::Reporting).await;
    let data = write_parquet(TableKind::Reporting.schema(), &reporting)?;
    storage.put_object(bucket, REPORTING_VIEW_KEY, &data).await?;

    let cities: usize = latest.iter().map(|b| b.num_rows()).sum();
    let dates: usize = reporting.iter().map(|b| b.num_rows()).sum();
    info!(bucket, cities, dates, "Dashboard views published");
    Ok(())
}
