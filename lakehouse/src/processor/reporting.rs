use super::table::TableStore;
use crate::schema::TableKind;
use common::Result;
use tracing::info;

/// Mean temperature over the decade, year, month and day of every climate
/// date, computed in one pass. Decades start at `floor(year / 10) * 10`.
pub const REPORTING_SQL: &str = r#"
SELECT DISTINCT
    "date",
    AVG(avg_temp) OVER (PARTITION BY decade_key) AS decade_average,
    AVG(avg_temp) OVER (PARTITION BY year_key) AS year_average,
    AVG(avg_temp) OVER (PARTITION BY year_key, month_key) AS month_average,
    AVG(avg_temp) OVER (PARTITION BY "date") AS day_average
FROM (
    SELECT
        "date",
        avg_temp,
        CAST(date_part('year', "date") AS BIGINT) AS year_key,
        CAST(date_part('month', "date") AS BIGINT) AS month_key,
        (CAST(date_part('year', "date") AS BIGINT) / 10) * 10 AS decade_key
    FROM climate
) AS keyed
ORDER BY "date"
"#;

/// Rebuilds the reporting table from scratch. Returns the number of rows.
pub async fn rebuild_reporting(store: &TableStore) -> Result<usize> {
    let batches = store.execute(REPORTING_SQL).await?;
    let rows = store.replace(TableKind::Reporting, batches).await?;
    info!(rows, "Reporting table rebuilt");
    Ok(rows)
}
