//! HTTP trigger surface for the report job.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::job::{self, Mailer, SummarySource};
use crate::models::{ReportOutcome, ReportWindow};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ReportConfig>,
    pub source: Arc<dyn SummarySource>,
    pub mailer: Arc<dyn Mailer>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/send-task-status-report", post(send_task_status_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Report trigger listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "task-status-report",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    date: Option<NaiveDate>,
}

async fn send_task_status_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ReportOutcome>, ApiError> {
    let now = Utc::now();
    let day = query.date.unwrap_or_else(|| now.date_naive());
    let window = ReportWindow::for_day(day)
        .ok_or_else(|| ApiError::BadRequest(format!("date {day} is out of range")))?;
    let outcome = job::run_report(
        &state.config,
        state.source.as_ref(),
        state.mailer.as_ref(),
        &window,
        now,
    )
    .await?;
    Ok(Json(outcome))
}

#[derive(Debug)]
enum ApiError {
    Report(ReportError),
    BadRequest(String),
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Report(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Report(err) => {
                tracing::error!(kind = err.kind(), error = %err, "Report run failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "success": false,
                        "error": err.kind(),
                        "message": err.to_string(),
                    }),
                )
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "success": false,
                    "error": "bad_request",
                    "message": message,
                }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::testing::{
        sample_config, sample_row, FixedSource, RecordingMailer, UnreachableSource,
    };
    use crate::models::StatusCounts;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn state(source: Arc<dyn SummarySource>, mailer: Arc<RecordingMailer>) -> AppState {
        AppState {
            config: Arc::new(sample_config()),
            source,
            mailer,
        }
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = build_router(state(
            Arc::new(FixedSource { rows: Vec::new() }),
            Arc::new(RecordingMailer::default()),
        ));

        let (status, body) = call(app, "GET", "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "task-status-report");
    }

    #[tokio::test]
    async fn trigger_sends_report_and_returns_summary() {
        let mailer = Arc::new(RecordingMailer::default());
        let source = FixedSource {
            rows: vec![sample_row(
                "APW-1",
                Some("Jane Doe"),
                StatusCounts {
                    completed: 3,
                    pending: 1,
                    ..Default::default()
                },
            )],
        };
        let app = build_router(state(Arc::new(source), mailer.clone()));

        let (status, body) = call(app, "POST", "/send-task-status-report?date=2025-12-23").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["email_sent"], true);
        assert_eq!(body["email_sent_to"], "ops@example.com");
        assert_eq!(body["task_combinations_count"], 1);
        assert_eq!(body["tasks_data"][0]["apw_id"], "APW-1");
        assert_eq!(body["tasks_data"][0]["completed"], 3);
        assert_eq!(mailer.call_count(), 1);
        let sent = mailer.last.lock().unwrap().clone().unwrap();
        assert!(sent.subject.ends_with("2025-12-23"));
    }

    #[tokio::test]
    async fn trigger_without_tasks_skips_email() {
        let mailer = Arc::new(RecordingMailer::default());
        let app = build_router(state(
            Arc::new(FixedSource { rows: Vec::new() }),
            mailer.clone(),
        ));

        let (status, body) = call(app, "POST", "/send-task-status-report").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email_sent"], false);
        assert_eq!(body["task_combinations_count"], 0);
        assert_eq!(mailer.call_count(), 0);
    }

    #[tokio::test]
    async fn store_failure_maps_to_server_error() {
        let mailer = Arc::new(RecordingMailer::default());
        let app = build_router(state(Arc::new(UnreachableSource), mailer.clone()));

        let (status, body) = call(app, "POST", "/send-task-status-report").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "connection");
        assert_eq!(mailer.call_count(), 0);
    }

    #[tokio::test]
    async fn malformed_date_is_bad_request() {
        let mailer = Arc::new(RecordingMailer::default());
        let app = build_router(state(
            Arc::new(FixedSource { rows: Vec::new() }),
            mailer.clone(),
        ));

        let (status, _) = call(app, "POST", "/send-task-status-report?date=yesterday").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(mailer.call_count(), 0);
    }

    #[tokio::test]
    async fn date_without_following_day_is_bad_request() {
        let mailer = Arc::new(RecordingMailer::default());
        let app = build_router(state(
            Arc::new(FixedSource { rows: Vec::new() }),
            mailer.clone(),
        ));

        // `+` would decode to a space in a query string.
        let date = NaiveDate::MAX.to_string().replace('+', "%2B");
        let uri = format!("/send-task-status-report?date={date}");

        let (status, body) = call(app, "POST", &uri).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert_eq!(mailer.call_count(), 0);
    }
}
