pub mod api;
pub mod processor;
pub mod schema;
pub mod services;
pub mod storage;
pub mod utils;

use std::sync::Arc;
use common::config::Settings;
use common::Result;
use orchestrator::RunReport;
use services::{DashboardService, PipelineOverview, PipelineService};
use storage::build_storage;
use tokio::net::TcpListener;
use tracing::info;

/// Runs the pipeline once, resuming from the persisted trigger state.
pub async fn run_pipeline(settings: Arc<Settings>) -> Result<RunReport> {
    let service = PipelineService::new(settings).await?;
    service.run().await
}

pub async fn list_pipeline(settings: &Settings) -> Result<PipelineOverview> {
    let storage = build_storage(settings).await?;
    PipelineOverview::load(&*storage, &settings.buckets.warehouse).await
}

/// Serves the dashboard API until the process is stopped.
pub async fn serve_dashboard(settings: &Settings) -> Result<()> {
    let storage = build_storage(settings).await?;
    let service = Arc::new(DashboardService::new(storage, settings.buckets.clone()));

    // Create API router
    let api_router = api::routes(service);

    let addr = format!("{}:{}", settings.dashboard.host, settings.dashboard.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Dashboard API listening");
    axum::serve(listener, api_router).await?;

    Ok(())
}
