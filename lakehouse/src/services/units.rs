use crate::processor::{Dataset, Loader, TableStore, publish_views, rebuild_reporting};
use crate::storage::{ObjectStorage, provision_buckets};
use crate::utils::paths::StagedKey;
use async_trait::async_trait;
use chrono::Utc;
use common::Result;
use common::config::Settings;
use etl::{Sources, observe_city, stage};
use futures::stream::{FuturesUnordered, StreamExt};
use orchestrator::{Unit, UnitKind, UnitSpec};
use std::sync::Arc;
use tracing::{info, warn};

pub const BUCKETS_READY: &str = "buckets_ready";
pub const WEATHER_STAGED: &str = "weather_staged";
pub const CLIMATE_STAGED: &str = "climate_staged";
pub const WEATHER_LOADED: &str = "weather_loaded";
pub const CLIMATE_LOADED: &str = "climate_loaded";
pub const REPORTING_READY: &str = "reporting_ready";
pub const VIEWS_PUBLISHED: &str = "views_published";

const CLIMATE_SLUG: &str = "global_land_temperatures_by_country";

/// Everything a unit needs, shared by all units of one pipeline.
#[derive(Clone)]
pub struct PipelineContext {
    pub settings: Arc<Settings>,
    pub storage: Arc<dyn ObjectStorage>,
    pub store: Arc<TableStore>,
    pub sources: Sources,
}

impl PipelineContext {
    fn loader(&self) -> Loader {
        Loader::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.store),
            &self.settings.buckets.warehouse,
            &self.settings.buckets.archive,
            self.settings.database.deduplicate_loads,
        )
    }
}

/// Graph position of every pipeline unit, in declaration order.
pub fn unit_specs() -> Vec<UnitSpec> {
    vec![
        ProvisionBuckets::describe(),
        IngestWeather::describe(),
        IngestClimate::describe(),
        LoadStaged::describe(Dataset::Weather),
        LoadStaged::describe(Dataset::Climate),
        BuildReporting::describe(),
        PublishViews::describe(),
    ]
}

pub fn build_units(ctx: &PipelineContext) -> Vec<Arc<dyn Unit>> {
    vec![
        Arc::new(ProvisionBuckets::new(ctx.clone())),
        Arc::new(IngestWeather::new(ctx.clone())),
        Arc::new(IngestClimate::new(ctx.clone())),
        Arc::new(LoadStaged::new(ctx.clone(), Dataset::Weather)),
        Arc::new(LoadStaged::new(ctx.clone(), Dataset::Climate)),
        Arc::new(BuildReporting::new(ctx.clone())),
        Arc::new(PublishViews::new(ctx.clone())),
    ]
}

pub struct ProvisionBuckets {
    spec: UnitSpec,
    ctx: PipelineContext,
}

impl ProvisionBuckets {
    pub fn describe() -> UnitSpec {
        UnitSpec::new("provision_buckets", UnitKind::Provision).produces(&[BUCKETS_READY])
    }

    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            spec: Self::describe(),
            ctx,
        }
    }
}

#[async_trait]
impl Unit for ProvisionBuckets {
    fn spec(&self) -> &UnitSpec {
        &self.spec
    }

    async fn run(&self) -> Result<()> {
        let buckets = self.ctx.settings.buckets.all();
        let outcomes = provision_buckets(&*self.ctx.storage, &buckets).await?;
        for (bucket, outcome) in outcomes {
            info!(bucket = %bucket, ?outcome, "Bucket ready");
        }
        Ok(())
    }
}

/// Geocodes and observes every configured city, one staged JSON object each.
pub struct IngestWeather {
    spec: UnitSpec,
    ctx: PipelineContext,
}

impl IngestWeather {
    pub fn describe() -> UnitSpec {
        UnitSpec::new("ingest_weather", UnitKind::Fetch)
            .consumes(&[BUCKETS_READY])
            .produces(&[WEATHER_STAGED])
    }

    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            spec: Self::describe(),
            ctx,
        }
    }

    async fn stage_city(&self, city: &str, at: chrono::DateTime<Utc>) -> Result<String> {
        let sources = &self.ctx.sources;
        let record = observe_city(&*sources.geocoder, &*sources.weather, city).await;
        if !record.status.is_ok() {
            warn!(city, status = ?record.status, "Weather unavailable, staging null record");
        }

        let key = StagedKey::new(Dataset::Weather.name(), at)
            .with_slug(city)
            .with_extension(Dataset::Weather.extension())
            .build();
        let data = stage::encode_weather(&record)?;
        self.ctx
            .storage
            .put_object(&self.ctx.settings.buckets.weather, &key, &data)
            .await?;
        Ok(key)
    }
}

#[async_trait]
impl Unit for IngestWeather {
    fn spec(&self) -> &UnitSpec {
        &self.spec
    }

    async fn run(&self) -> Result<()> {
        let at = Utc::now();
        let mut pending: FuturesUnordered<_> = self
            .ctx
            .settings
            .cities
            .names
            .iter()
            .map(|city| async move { (city, self.stage_city(city, at).await) })
            .collect();

        let mut first_error = None;
        while let Some((city, result)) = pending.next().await {
            match result {
                Ok(key) => info!(city = %city, key = %key, "Weather staged"),
                Err(e) => {
                    warn!(city = %city, error = %e, "Failed to stage weather");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Pulls the climate dataset and stages it as one CSV object.
pub struct IngestClimate {
    spec: UnitSpec,
    ctx: PipelineContext,
}

impl IngestClimate {
    pub fn describe() -> UnitSpec {
        UnitSpec::new("ingest_climate", UnitKind::Fetch)
            .consumes(&[BUCKETS_READY])
            .produces(&[CLIMATE_STAGED])
    }

    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            spec: Self::describe(),
            ctx,
        }
    }
}

#[async_trait]
impl Unit for IngestClimate {
    fn spec(&self) -> &UnitSpec {
        &self.spec
    }

    async fn run(&self) -> Result<()> {
        let extract = self.ctx.sources.climate.pull().await;
        if !extract.status.is_ok() {
            warn!(status = ?extract.status, "Climate data unavailable, staging empty extract");
        }

        let key = StagedKey::new(Dataset::Climate.name(), Utc::now())
            .with_slug(CLIMATE_SLUG)
            .with_extension(Dataset::Climate.extension())
            .build();
        let data = stage::encode_climate(&extract.rows)?;
        self.ctx
            .storage
            .put_object(&self.ctx.settings.buckets.climate, &key, &data)
            .await?;

        info!(key = %key, rows = extract.rows.len(), "Climate staged");
        Ok(())
    }
}

/// Loads one dataset's staged objects and archives them.
pub struct LoadStaged {
    spec: UnitSpec,
    ctx: PipelineContext,
    dataset: Dataset,
}

impl LoadStaged {
    pub fn describe(dataset: Dataset) -> UnitSpec {
        match dataset {
            Dataset::Weather => UnitSpec::new("load_weather", UnitKind::Load)
                .consumes(&[WEATHER_STAGED])
                .produces(&[WEATHER_LOADED]),
            Dataset::Climate => UnitSpec::new("load_climate", UnitKind::Load)
                .consumes(&[CLIMATE_STAGED])
                .produces(&[CLIMATE_LOADED]),
        }
    }

    pub fn new(ctx: PipelineContext, dataset: Dataset) -> Self {
        Self {
            spec: Self::describe(dataset),
            ctx,
            dataset,
        }
    }

    fn staging_bucket(&self) -> &str {
        match self.dataset {
            Dataset::Weather => &self.ctx.settings.buckets.weather,
            Dataset::Climate => &self.ctx.settings.buckets.climate,
        }
    }
}

#[async_trait]
impl Unit for LoadStaged {
    fn spec(&self) -> &UnitSpec {
        &self.spec
    }

    async fn run(&self) -> Result<()> {
        self.ctx
            .loader()
            .load_and_archive(self.dataset, self.staging_bucket())
            .await?;
        Ok(())
    }
}

pub struct BuildReporting {
    spec: UnitSpec,
    ctx: PipelineContext,
}

impl BuildReporting {
    pub fn describe() -> UnitSpec {
        UnitSpec::new("build_reporting", UnitKind::Aggregate)
            .consumes(&[WEATHER_LOADED, CLIMATE_LOADED])
            .produces(&[REPORTING_READY])
    }

    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            spec: Self::describe(),
            ctx,
        }
    }
}

#[async_trait]
impl Unit for BuildReporting {
    fn spec(&self) -> &UnitSpec {
        &self.spec
    }

    async fn run(&self) -> Result<()> {
        rebuild_reporting(&self.ctx.store).await?;
        Ok(())
    }
}

pub struct PublishViews {
    spec: UnitSpec,
    ctx: PipelineContext,
}

impl PublishViews {
    pub fn describe() -> UnitSpec {
        UnitSpec::new("publish_views", UnitKind::Export)
            .consumes(&[REPORTING_READY])
            .produces(&[VIEWS_PUBLISHED])
    }

    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            spec: Self::describe(),
            ctx,
        }
    }
}

#[async_trait]
impl Unit for PublishViews {
    fn spec(&self) -> &UnitSpec {
        &self.spec
    }

    async fn run(&self) -> Result<()> {
        publish_views(
            &self.ctx.store,
            &*self.ctx.storage,
            &self.ctx.settings.buckets.reporting,
        )
        .await
    }
}
