use axum::{
    routing::get,
    Router,
    extract::{State, Query},
    Json
};
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::processor::Grain;
use crate::services::{AppError, DashboardService, PipelineOverview};
use super::models::{ApiResponse, ReportingQuery};

pub async fn latest_weather(
    State(service): State<Arc<DashboardService>>,
) -> Result<Json<ApiResponse<Vec<Value>>>, AppError> {
    let rows = service.latest_weather().await?;
    Ok(Json(ApiResponse::success(rows)))
}

pub async fn reporting(
    Query(query): Query<ReportingQuery>,
    State(service): State<Arc<DashboardService>>,
) -> Result<Json<ApiResponse<Vec<Value>>>, AppError> {
    let grain = query
        .grain
        .as_deref()
        .map(str::parse::<Grain>)
        .transpose()?;

    let rows = service.reporting(grain).await?;
    Ok(Json(ApiResponse::success(rows)))
}

pub async fn pipeline(
    State(service): State<Arc<DashboardService>>,
) -> Result<Json<ApiResponse<PipelineOverview>>, AppError> {
    let overview = service.pipeline().await?;
    Ok(Json(ApiResponse::success(overview)))
}

// Define all API routes
pub fn routes(service: Arc<DashboardService>) -> Router {
    Router::new()
        .route("/api/weather/latest", get(latest_weather))
        .route("/api/reporting", get(reporting))
        .route("/api/pipeline", get(pipeline))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, ObjectStorage};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use common::config::BucketConfig;
    use tower::ServiceExt;

    async fn app() -> Router {
        let memory = MemoryStorage::new();
        memory.create_bucket("reporting").await.unwrap();
        let buckets = BucketConfig {
            weather: "weather".to_string(),
            climate: "climate".to_string(),
            archive: "archive".to_string(),
            warehouse: "warehouse".to_string(),
            reporting: "reporting".to_string(),
        };
        routes(Arc::new(DashboardService::new(Arc::new(memory), buckets)))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_latest_weather_ok() {
        let (status, body) = get_json(app().await, "/api/weather/latest").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_unknown_grain_is_bad_request() {
        let (status, body) = get_json(app().await, "/api/reporting?grain=week").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("week"));
    }

    #[tokio::test]
    async fn test_pipeline_lists_units() {
        let (status, body) = get_json(app().await, "/api/pipeline").await;

        assert_eq!(status, StatusCode::OK);
        let units = body["data"]["units"].as_array().unwrap();
        assert_eq!(units.len(), 7);
        assert_eq!(units[0]["name"], "provision_buckets");
    }
}
