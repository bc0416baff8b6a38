//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Interval queries
        .route("/overlaps/{entity}", get(handlers::get_overlaps))
        .route("/concurrency/peak", get(handlers::get_peak_concurrency))
        // Mean durations
        .route("/mean-durations", get(handlers::list_mean_durations))
        .route("/mean-durations/recompute", post(handlers::recompute_mean_durations))
        .route("/mean-durations/{uniform_id}", get(handlers::get_mean_duration))
        // Summaries
        .route("/safety/helmet-usage", get(handlers::get_helmet_usage))
        .route("/trains/busiest", get(handlers::get_busiest_trains))
        .route("/peak-periods", get(handlers::get_peak_periods))
        .route("/uniforms/activity-time", get(handlers::get_activity_time_by_uniform))
        // Timelines
        .route("/trains/{train_id}/presence", get(handlers::get_presence_timeline))
        .route(
            "/trains/by-number/{number}/workers",
            get(handlers::get_workers_on_train_activity),
        )
        .route("/workers/{worker_id}/timeline", get(handlers::get_worker_timeline))
        // Incidents and retention
        .route("/incidents/recent", get(handlers::get_recent_incidents))
        .route("/retention/enforce", post(handlers::enforce_retention));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, TimeZone, Utc};
    use tower::ServiceExt;

    use crate::db::repositories::LocalRepository;
    use crate::db::repository::{DepotRepository, FullRepository};
    use crate::models::{Interval, NewTrain, NewWorker};

    fn app_with(repo: Arc<LocalRepository>) -> Router {
        create_router(AppState::new(repo as Arc<dyn FullRepository>))
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_reports_connected() {
        let (status, body) = send(app_with(Arc::new(LocalRepository::new())), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "connected");
    }

    #[tokio::test]
    async fn test_overlaps_returns_open_worker() {
        let repo = Arc::new(LocalRepository::new());
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let train = repo
            .insert_train(&NewTrain {
                number: "T-1".into(),
                stay: Interval::open(t0),
            })
            .await
            .unwrap();
        let uniform = repo.insert_uniform("orange").await.unwrap();
        repo.insert_worker(&NewWorker {
            train_id: train.id,
            uniform_id: uniform.id,
            helmet_on: true,
            presence: Interval::open(t0 + Duration::minutes(5)),
        })
        .await
        .unwrap();

        let (status, body) = send(
            app_with(repo),
            "GET",
            "/v1/overlaps/workers?start=2024-03-01T09:00:00Z&end=2024-03-01T10:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["items"][0]["entity"], "worker");
    }

    #[tokio::test]
    async fn test_inverted_window_is_bad_request() {
        let (status, body) = send(
            app_with(Arc::new(LocalRepository::new())),
            "GET",
            "/v1/overlaps/trains?start=2024-03-02T00:00:00Z&end=2024-03-01T00:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_WINDOW");
    }

    #[tokio::test]
    async fn test_oversized_lookback_is_bad_request() {
        let app = app_with(Arc::new(LocalRepository::new()));
        let (status, body) = send(app.clone(), "GET", "/v1/peak-periods?hours=10000000000").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_WINDOW");

        let (status, body) =
            send(app, "GET", "/v1/incidents/recent?minutes=1000000000000").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_WINDOW");
    }

    #[tokio::test]
    async fn test_unknown_entity_is_bad_request() {
        let (status, _) = send(
            app_with(Arc::new(LocalRepository::new())),
            "GET",
            "/v1/overlaps/wagons?start=2024-03-01T00:00:00Z&end=2024-03-02T00:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_mean_duration_is_not_found() {
        let (status, body) = send(
            app_with(Arc::new(LocalRepository::new())),
            "GET",
            "/v1/mean-durations/42",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_unhealthy_store_is_unavailable() {
        let repo = Arc::new(LocalRepository::new());
        repo.set_healthy(false);
        let (status, _) = send(app_with(repo), "GET", "/v1/safety/helmet-usage").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_retention_on_empty_store() {
        let (status, body) = send(
            app_with(Arc::new(LocalRepository::new())),
            "POST",
            "/v1/retention/enforce",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["triggered"], false);
    }
}
