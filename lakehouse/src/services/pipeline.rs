use super::units::{PipelineContext, build_units, unit_specs};
use crate::processor::TableStore;
use crate::storage::{ObjectStorage, build_storage};
use crate::utils::paths::TRIGGER_STATE_KEY;
use common::config::Settings;
use common::{Error, Result};
use etl::Sources;
use orchestrator::{
    Dag, RetryPolicy, RunReport, Scheduler, Signal, SignalVersion, TriggerTable, UnitSpec,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Units and the signal versions recorded by the last run.
#[derive(Debug, Serialize)]
pub struct PipelineOverview {
    pub units: Vec<UnitSpec>,
    pub signals: BTreeMap<Signal, SignalVersion>,
}

impl PipelineOverview {
    pub async fn load(storage: &dyn ObjectStorage, warehouse_bucket: &str) -> Result<Self> {
        let table = load_trigger_table(storage, warehouse_bucket).await?;
        Ok(Self {
            units: unit_specs(),
            signals: table
                .signals()
                .map(|(signal, version)| (signal.clone(), *version))
                .collect(),
        })
    }
}

pub async fn load_trigger_table(storage: &dyn ObjectStorage, bucket: &str) -> Result<TriggerTable> {
    match storage.get_object(bucket, TRIGGER_STATE_KEY).await {
        Ok(data) => Ok(serde_json::from_slice(&data)?),
        Err(Error::NotFound(_)) => Ok(TriggerTable::new()),
        Err(e) => Err(e),
    }
}

pub async fn save_trigger_table(
    storage: &dyn ObjectStorage,
    bucket: &str,
    table: &TriggerTable,
) -> Result<()> {
    let data = serde_json::to_vec_pretty(table)?;
    storage.put_object(bucket, TRIGGER_STATE_KEY, &data).await
}

pub struct PipelineService {
    ctx: PipelineContext,
}

impl PipelineService {
    pub async fn new(settings: Arc<Settings>) -> Result<Self> {
        let storage = build_storage(&settings).await?;
        let sources = Sources::from_settings(&settings)?;
        Self::with_parts(settings, storage, sources).await
    }

    pub async fn with_parts(
        settings: Arc<Settings>,
        storage: Arc<dyn ObjectStorage>,
        sources: Sources,
    ) -> Result<Self> {
        let store = TableStore::open(
            Arc::clone(&storage),
            &settings.buckets.warehouse,
            settings.database.pool_size,
        )
        .await?;

        Ok(Self {
            ctx: PipelineContext {
                settings,
                storage,
                store: Arc::new(store),
                sources,
            },
        })
    }

    pub fn store(&self) -> &Arc<TableStore> {
        &self.ctx.store
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.ctx.storage
    }

    pub fn dag(&self) -> Result<Dag> {
        Dag::new(build_units(&self.ctx))
    }

    /// One scheduler run, resumed from and saved back to the persisted
    /// trigger table.
    pub async fn run(&self) -> Result<RunReport> {
        let settings = &self.ctx.settings;
        let warehouse = &settings.buckets.warehouse;

        let table = load_trigger_table(&*self.ctx.storage, warehouse).await?;
        let mut scheduler = Scheduler::new(
            self.dag()?,
            RetryPolicy::from_config(&settings.scheduler),
            settings.scheduler.workers,
        )
        .with_table(table);

        info!(
            units = scheduler.dag().units().len(),
            workers = settings.scheduler.workers,
            "Starting pipeline run"
        );
        let report = scheduler.run().await;

        match save_trigger_table(&*self.ctx.storage, warehouse, scheduler.table()).await {
            Ok(()) => {}
            Err(Error::NotFound(_)) => {
                warn!(bucket = %warehouse, "Warehouse bucket missing, trigger state not saved")
            }
            Err(e) => return Err(e),
        }

        for unit in report.failed() {
            warn!(
                unit = %unit.name,
                attempts = unit.attempts,
                error = unit.error.as_deref().unwrap_or(""),
                "Unit failed"
            );
        }
        info!(success = report.success(), "Pipeline run finished");
        Ok(report)
    }
}
