use super::pool::ConnectionPool;
use crate::schema::TableKind;
use crate::storage::ObjectStorage;
use crate::utils::arrow::{read_parquet, write_parquet};
use crate::utils::paths::{load_part_key, table_part_key, table_prefix};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use common::{Error, Result};
use datafusion::datasource::MemTable;
use datafusion::execution::context::SessionContext;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// The analytical store: DataFusion tables backed by parquet parts in the
/// warehouse bucket.
///
/// Every `execute`, `append`, `append_keyed` and `replace` holds one pool
/// session for its whole duration.
pub struct TableStore {
    ctx: SessionContext,
    pool: ConnectionPool,
    storage: Arc<dyn ObjectStorage>,
    bucket: String,
    tables: RwLock<HashMap<TableKind, TableData>>,
    sequence: AtomicU64,
}

/// Rows of one table and the keys of the parts they came from.
#[derive(Debug, Clone, Default)]
struct TableData {
    batches: Vec<RecordBatch>,
    parts: BTreeSet<String>,
}

impl TableData {
    fn rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

impl TableStore {
    /// Registers every table, rehydrated from the parts already persisted.
    /// A missing warehouse bucket means empty tables.
    pub async fn open(
        storage: Arc<dyn ObjectStorage>,
        bucket: &str,
        pool_size: usize,
    ) -> Result<Self> {
        let store = Self {
            ctx: SessionContext::new(),
            pool: ConnectionPool::new(pool_size),
            storage,
            bucket: bucket.to_string(),
            tables: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        };

        {
            let mut tables = store.tables.write().await;
            for kind in TableKind::ALL {
                let data = store.rehydrate(kind).await?;
                store.register(kind, &data.batches)?;
                debug!(
                    table = %kind,
                    rows = data.rows(),
                    parts = data.parts.len(),
                    "Table registered"
                );
                tables.insert(kind, data);
            }
        }

        info!(bucket, pool_size = store.pool.size(), "Table store opened");
        Ok(store)
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub async fn execute(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        let _session = self.pool.acquire().await?;
        let _tables = self.tables.read().await;

        debug!(sql, "Executing query");
        let df = self.ctx.sql(sql).await?;
        Ok(df.collect().await?)
    }

    /// Persists `batches` as a new part and appends them to the table.
    pub async fn append(&self, kind: TableKind, batches: Vec<RecordBatch>) -> Result<usize> {
        let _session = self.pool.acquire().await?;

        let batches = conform(kind, batches)?;
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        if rows == 0 {
            return Ok(0);
        }

        let key = self.write_part(kind, &batches).await?;

        let mut tables = self.tables.write().await;
        let mut current = tables.get(&kind).cloned().unwrap_or_default();
        current.batches.extend(batches);
        current.parts.insert(key.clone());
        self.register(kind, &current.batches)?;
        tables.insert(kind, current);

        info!(table = %kind, rows, part = %key, "Rows appended");
        Ok(rows)
    }

    /// Appends each batch as its own part named after its load id and
    /// returns the rows added.
    ///
    /// An id whose part is already in the table adds nothing. An id whose
    /// part is persisted but not yet in the table, as left by an attempt
    /// that failed after writing it, is read back instead of written again.
    pub async fn append_keyed(
        &self,
        kind: TableKind,
        loads: Vec<(String, RecordBatch)>,
    ) -> Result<usize> {
        let _session = self.pool.acquire().await?;

        let (ids, batches): (Vec<String>, Vec<RecordBatch>) = loads.into_iter().unzip();
        let batches = conform(kind, batches)?;

        let loaded = {
            let tables = self.tables.read().await;
            tables.get(&kind).map(|t| t.parts.clone()).unwrap_or_default()
        };
        let persisted: HashSet<String> = self.part_keys(kind).await?.into_iter().collect();

        let mut parts = Vec::new();
        for (id, batch) in ids.iter().zip(batches) {
            let key = load_part_key(kind.name(), id);
            if loaded.contains(&key) {
                debug!(table = %kind, part = %key, "Part already in table");
                continue;
            }
            if persisted.contains(&key) {
                let data = self.storage.get_object(&self.bucket, &key).await?;
                info!(table = %kind, part = %key, "Adopting persisted part");
                parts.push((key, conform(kind, read_parquet(data)?)?));
            } else {
                let data = write_parquet(kind.schema(), std::slice::from_ref(&batch))?;
                self.storage.put_object(&self.bucket, &key, &data).await?;
                parts.push((key, vec![batch]));
            }
        }

        if parts.is_empty() {
            return Ok(0);
        }

        let mut tables = self.tables.write().await;
        let mut current = tables.get(&kind).cloned().unwrap_or_default();
        let before = current.rows();
        let mut added = 0;
        for (key, part) in parts {
            if current.parts.insert(key) {
                current.batches.extend(part);
                added += 1;
            }
        }
        let rows = current.rows() - before;
        self.register(kind, &current.batches)?;
        tables.insert(kind, current);

        info!(table = %kind, rows, parts = added, "Keyed rows appended");
        Ok(rows)
    }

    /// Swaps the whole table for `batches`. Old parts are deleted only after
    /// the new one is written.
    pub async fn replace(&self, kind: TableKind, batches: Vec<RecordBatch>) -> Result<usize> {
        let _session = self.pool.acquire().await?;

        let batches = conform(kind, batches)?;
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();

        let stale = self.part_keys(kind).await?;
        let key = self.write_part(kind, &batches).await?;
        let stale: Vec<String> = stale.into_iter().filter(|k| *k != key).collect();
        self.storage.delete_objects(&self.bucket, &stale).await?;

        let mut tables = self.tables.write().await;
        self.register(kind, &batches)?;
        tables.insert(
            kind,
            TableData {
                batches,
                parts: BTreeSet::from([key.clone()]),
            },
        );

        info!(table = %kind, rows, part = %key, removed_parts = stale.len(), "Table replaced");
        Ok(rows)
    }

    pub async fn row_count(&self, kind: TableKind) -> usize {
        let tables = self.tables.read().await;
        tables.get(&kind).map(TableData::rows).unwrap_or(0)
    }

    pub async fn snapshot(&self, kind: TableKind) -> Vec<RecordBatch> {
        let tables = self.tables.read().await;
        tables
            .get(&kind)
            .map(|t| t.batches.clone())
            .unwrap_or_default()
    }

    async fn part_keys(&self, kind: TableKind) -> Result<Vec<String>> {
        match self
            .storage
            .list_objects(&self.bucket, &table_prefix(kind.name()))
            .await
        {
            Ok(keys) => Ok(keys),
            Err(Error::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn rehydrate(&self, kind: TableKind) -> Result<TableData> {
        let mut table = TableData::default();
        for key in self.part_keys(kind).await? {
            let data = self.storage.get_object(&self.bucket, &key).await?;
            table.batches.extend(conform(kind, read_parquet(data)?)?);
            table.parts.insert(key);
        }
        Ok(table)
    }

    async fn write_part(&self, kind: TableKind, batches: &[RecordBatch]) -> Result<String> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let key = table_part_key(kind.name(), Utc::now(), sequence);
        let data = write_parquet(kind.schema(), batches)?;
        self.storage.put_object(&self.bucket, &key, &data).await?;
        Ok(key)
    }

    fn register(&self, kind: TableKind, batches: &[RecordBatch]) -> Result<()> {
        let provider = MemTable::try_new(kind.schema(), vec![batches.to_vec()])?;
        self.ctx.deregister_table(kind.name())?;
        self.ctx.register_table(kind.name(), Arc::new(provider))?;
        Ok(())
    }
}

/// Rebinds batches to the table's declared schema.
fn conform(kind: TableKind, batches: Vec<RecordBatch>) -> Result<Vec<RecordBatch>> {
    let schema = kind.schema();
    batches
        .into_iter()
        .map(|batch| {
            RecordBatch::try_new(Arc::clone(&schema), batch.columns().to_vec()).map_err(|e| {
                Error::SchemaValidation(format!("batch does not fit table {}: {}", kind, e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use arrow::array::{Date32Array, Float64Array, StringArray};
    use std::time::Duration;

    fn climate_batch(days: Vec<i32>, temps: Vec<f64>) -> RecordBatch {
        let countries = vec!["Norway"; days.len()];
        let uncertainty = vec![0.1; days.len()];
        RecordBatch::try_new(
            TableKind::Climate.schema(),
            vec![
                Arc::new(Date32Array::from(days)),
                Arc::new(Float64Array::from(temps)),
                Arc::new(Float64Array::from(uncertainty)),
                Arc::new(StringArray::from(countries)),
            ],
        )
        .unwrap()
    }

    async fn warehouse() -> Arc<dyn ObjectStorage> {
        let storage = MemoryStorage::new();
        storage.create_bucket("warehouse").await.unwrap();
        Arc::new(storage)
    }

    #[tokio::test]
    async fn test_append_is_queryable_and_survives_reopen() {
        let storage = warehouse().await;
        let store = TableStore::open(Arc::clone(&storage), "warehouse", 2)
            .await
            .unwrap();

        store
            .append(TableKind::Climate, vec![climate_batch(vec![0, 1], vec![1.0, 2.0])])
            .await
            .unwrap();
        store
            .append(TableKind::Climate, vec![climate_batch(vec![2], vec![3.0])])
            .await
            .unwrap();

        let batches = store
            .execute("SELECT SUM(avg_temp) AS total FROM climate")
            .await
            .unwrap();
        let total = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .value(0);
        assert_eq!(total, 6.0);

        let parts = storage.list_objects("warehouse", "tables/climate/").await.unwrap();
        assert_eq!(parts.len(), 2);

        let reopened = TableStore::open(storage, "warehouse", 2).await.unwrap();
        assert_eq!(reopened.row_count(TableKind::Climate).await, 3);
        assert_eq!(reopened.row_count(TableKind::Weather).await, 0);
    }

    #[tokio::test]
    async fn test_replace_drops_previous_parts() {
        let storage = warehouse().await;
        let store = TableStore::open(Arc::clone(&storage), "warehouse", 1)
            .await
            .unwrap();

        store
            .replace(TableKind::Climate, vec![climate_batch(vec![0, 1], vec![1.0, 2.0])])
            .await
            .unwrap();
        store
            .replace(TableKind::Climate, vec![climate_batch(vec![5], vec![9.0])])
            .await
            .unwrap();

        assert_eq!(store.row_count(TableKind::Climate).await, 1);
        let parts = storage.list_objects("warehouse", "tables/climate/").await.unwrap();
        assert_eq!(parts.len(), 1);
    }

    #[tokio::test]
    async fn test_keyed_parts_are_inserted_once_across_stores() {
        let storage = warehouse().await;
        let first = TableStore::open(Arc::clone(&storage), "warehouse", 1)
            .await
            .unwrap();
        let second = TableStore::open(Arc::clone(&storage), "warehouse", 1)
            .await
            .unwrap();

        let rows = second
            .append_keyed(
                TableKind::Climate,
                vec![("aa".to_string(), climate_batch(vec![0, 1], vec![1.0, 2.0]))],
            )
            .await
            .unwrap();
        assert_eq!(rows, 2);

        // `aa` is persisted by the other store, so it is read back, not rewritten.
        let rows = first
            .append_keyed(
                TableKind::Climate,
                vec![
                    ("aa".to_string(), climate_batch(vec![0, 1], vec![1.0, 2.0])),
                    ("bb".to_string(), climate_batch(vec![2], vec![3.0])),
                ],
            )
            .await
            .unwrap();
        assert_eq!(rows, 3);

        let rows = first
            .append_keyed(
                TableKind::Climate,
                vec![("bb".to_string(), climate_batch(vec![2], vec![3.0]))],
            )
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(first.row_count(TableKind::Climate).await, 3);

        let parts = storage.list_objects("warehouse", "tables/climate/").await.unwrap();
        assert_eq!(
            parts,
            vec![
                "tables/climate/load-aa.parquet".to_string(),
                "tables/climate/load-bb.parquet".to_string(),
            ]
        );

        let reopened = TableStore::open(storage, "warehouse", 1).await.unwrap();
        assert_eq!(reopened.row_count(TableKind::Climate).await, 3);
    }

    #[tokio::test]
    async fn test_missing_warehouse_opens_empty() {
        let storage: Arc<dyn ObjectStorage> = Arc::new(MemoryStorage::new());
        let store = TableStore::open(storage, "warehouse", 1).await.unwrap();

        let batches = store.execute("SELECT COUNT(*) FROM weather").await.unwrap();
        assert_eq!(batches[0].num_rows(), 1);
        assert_eq!(store.row_count(TableKind::Reporting).await, 0);
    }

    #[tokio::test]
    async fn test_mismatched_batch_is_a_schema_error() {
        let storage = warehouse().await;
        let store = TableStore::open(storage, "warehouse", 1).await.unwrap();

        let err = store
            .append(TableKind::Weather, vec![climate_batch(vec![0], vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemaValidation(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_queries_wait_for_a_free_session() {
        let storage = warehouse().await;
        let store = Arc::new(TableStore::open(storage, "warehouse", 1).await.unwrap());

        let held = store.pool().acquire().await.unwrap();
        let query = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.execute("SELECT COUNT(*) FROM climate").await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!query.is_finished());

        drop(held);
        let batches = tokio::time::timeout(Duration::from_secs(5), query)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(batches[0].num_rows(), 1);
    }
}
