use super::pipeline::PipelineOverview;
use crate::processor::Grain;
use crate::storage::ObjectStorage;
use crate::utils::arrow::{batches_to_json, read_parquet};
use crate::utils::paths::{LATEST_WEATHER_VIEW_KEY, REPORTING_VIEW_KEY};
use arrow::record_batch::RecordBatch;
use common::config::BucketConfig;
use common::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Read-only access to the published dashboard views.
pub struct DashboardService {
    storage: Arc<dyn ObjectStorage>,
    buckets: BucketConfig,
}

impl DashboardService {
    pub fn new(storage: Arc<dyn ObjectStorage>, buckets: BucketConfig) -> Self {
        Self { storage, buckets }
    }

    // A view that was never published reads as empty.
    async fn read_view(&self, key: &str) -> Result<Vec<RecordBatch>> {
        match self.storage.get_object(&self.buckets.reporting, key).await {
            Ok(data) => read_parquet(data),
            Err(Error::NotFound(_)) => {
                debug!(key, "View not published yet");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn latest_weather(&self) -> Result<Vec<Value>> {
        let batches = self.read_view(LATEST_WEATHER_VIEW_KEY).await?;
        batches_to_json(&batches)
    }

    /// All reporting columns, or `date` plus one grain's column.
    pub async fn reporting(&self, grain: Option<Grain>) -> Result<Vec<Value>> {
        let batches = self.read_view(REPORTING_VIEW_KEY).await?;
        match grain {
            Some(grain) => {
                let projected = batches
                    .iter()
                    .map(|batch| grain.project(batch))
                    .collect::<Result<Vec<_>>>()?;
                batches_to_json(&projected)
            }
            None => batches_to_json(&batches),
        }
    }

    pub async fn pipeline(&self) -> Result<PipelineOverview> {
        PipelineOverview::load(&*self.storage, &self.buckets.warehouse).await
    }
}
