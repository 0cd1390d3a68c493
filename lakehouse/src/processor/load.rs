use super::ledger::{LedgerEntry, LoadLedger, content_hash};
use super::table::TableStore;
use crate::schema::TableKind;
use crate::storage::ObjectStorage;
use crate::utils::paths::StagedKey;
use arrow::array::{
    ArrayRef, Date32Array, Float64Array, Int64Array, StringArray, TimestampMillisecondArray,
};
use arrow::datatypes::Date32Type;
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use common::Result;
use etl::stage::{self, CLIMATE_EXTENSION, WEATHER_EXTENSION};
use etl::{ClimateRow, WeatherRecord};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// A staged source and the table it loads into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Weather,
    Climate,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Weather => "weather",
            Dataset::Climate => "climate",
        }
    }

    pub fn table(&self) -> TableKind {
        match self {
            Dataset::Weather => TableKind::Weather,
            Dataset::Climate => TableKind::Climate,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Dataset::Weather => WEATHER_EXTENSION,
            Dataset::Climate => CLIMATE_EXTENSION,
        }
    }

    fn decode(&self, data: &[u8]) -> Result<RecordBatch> {
        match self {
            Dataset::Weather => weather_batch(&[stage::decode_weather(data)?]),
            Dataset::Climate => climate_batch(&stage::decode_climate(data)?),
        }
    }
}

pub fn weather_batch(records: &[WeatherRecord]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.city.as_str()),
        )),
        Arc::new(Float64Array::from(
            records.iter().map(|r| r.lat).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            records.iter().map(|r| r.long).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            records.iter().map(|r| r.temperature).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            records.iter().map(|r| r.windspeed).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            records.iter().map(|r| r.winddirection).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            records.iter().map(|r| r.weathercode).collect::<Vec<_>>(),
        )),
        Arc::new(TimestampMillisecondArray::from(
            records
                .iter()
                .map(|r| r.timestamp.map(|t| t.timestamp_millis()))
                .collect::<Vec<_>>(),
        )),
    ];

    Ok(RecordBatch::try_new(TableKind::Weather.schema(), columns)?)
}

pub fn climate_batch(rows: &[ClimateRow]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Date32Array::from(
            rows.iter()
                .map(|r| Date32Type::from_naive_date(r.date))
                .collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.average_temperature).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.uncertainty).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.country.as_str()),
        )),
    ];

    Ok(RecordBatch::try_new(TableKind::Climate.schema(), columns)?)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub objects: usize,
    pub loaded_objects: usize,
    pub skipped_objects: usize,
    pub rows: usize,
}

struct StagedObject {
    key: String,
    hash: String,
    batch: RecordBatch,
}

/// Loads staged objects into their table, then moves them to the archive.
pub struct Loader {
    storage: Arc<dyn ObjectStorage>,
    store: Arc<TableStore>,
    warehouse_bucket: String,
    archive_bucket: String,
    deduplicate: bool,
}

impl Loader {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        store: Arc<TableStore>,
        warehouse_bucket: &str,
        archive_bucket: &str,
        deduplicate: bool,
    ) -> Self {
        Self {
            storage,
            store,
            warehouse_bucket: warehouse_bucket.to_string(),
            archive_bucket: archive_bucket.to_string(),
            deduplicate,
        }
    }

    /// Every staged object is parsed before anything is inserted, and objects
    /// are archived only after the insert succeeded.
    ///
    /// With deduplication on, each object's rows go into a part named by its
    /// content hash, so a retry after a failure past the insert (a failed
    /// ledger save, a failed archive, a timeout) adds no rows. With
    /// deduplication off, an object staged again with identical content is
    /// inserted again.
    pub async fn load_and_archive(
        &self,
        dataset: Dataset,
        staging_bucket: &str,
    ) -> Result<LoadSummary> {
        let keys = self
            .storage
            .list_objects(staging_bucket, &StagedKey::prefix(dataset.name()))
            .await?;

        if keys.is_empty() {
            info!(dataset = dataset.name(), "Nothing staged");
            return Ok(LoadSummary::default());
        }

        let mut staged = Vec::with_capacity(keys.len());
        for key in &keys {
            let data = self.storage.get_object(staging_bucket, key).await?;
            staged.push(StagedObject {
                key: key.clone(),
                hash: content_hash(&data),
                batch: dataset.decode(&data)?,
            });
        }

        let table = dataset.table();
        let mut ledger = if self.deduplicate {
            LoadLedger::load(&*self.storage, &self.warehouse_bucket, table).await?
        } else {
            LoadLedger::default()
        };

        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        let mut summary = LoadSummary {
            objects: staged.len(),
            ..Default::default()
        };

        for object in staged {
            if self.deduplicate {
                if let Some(entry) = ledger.get(&object.hash) {
                    info!(
                        dataset = dataset.name(),
                        key = %object.key,
                        first_key = %entry.source_key,
                        "Content already loaded, skipping insert"
                    );
                    summary.skipped_objects += 1;
                    continue;
                }
                if !seen.insert(object.hash.clone()) {
                    info!(
                        dataset = dataset.name(),
                        key = %object.key,
                        "Content staged twice, skipping insert"
                    );
                    summary.skipped_objects += 1;
                    continue;
                }
            }
            fresh.push(object);
        }

        summary.rows = if self.deduplicate {
            let loads = fresh
                .iter()
                .map(|o| (o.hash.clone(), o.batch.clone()))
                .collect();
            self.store.append_keyed(table, loads).await?
        } else {
            let batches = fresh.iter().map(|o| o.batch.clone()).collect();
            self.store.append(table, batches).await?
        };
        summary.loaded_objects = fresh.len();

        if self.deduplicate && !fresh.is_empty() {
            let loaded_at = Utc::now();
            for object in &fresh {
                ledger.record(
                    object.hash.clone(),
                    LedgerEntry {
                        source_key: object.key.clone(),
                        rows: object.batch.num_rows(),
                        loaded_at,
                    },
                );
            }
            ledger
                .save(&*self.storage, &self.warehouse_bucket, table)
                .await?;
        }

        self.archive(staging_bucket, &keys).await?;

        info!(
            dataset = dataset.name(),
            objects = summary.objects,
            loaded = summary.loaded_objects,
            skipped = summary.skipped_objects,
            rows = summary.rows,
            "Load complete"
        );
        Ok(summary)
    }

    /// Copies everything before deleting anything, so no object is ever
    /// absent from both buckets.
    async fn archive(&self, staging_bucket: &str, keys: &[String]) -> Result<()> {
        for key in keys {
            self.storage
                .copy_object(staging_bucket, key, &self.archive_bucket, key)
                .await?;
        }
        self.storage.delete_objects(staging_bucket, keys).await?;
        info!(count = keys.len(), archive = %self.archive_bucket, "Staged objects archived");
        Ok(())
    }
}
