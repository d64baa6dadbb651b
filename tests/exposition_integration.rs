mod common;

use axum::body::to_bytes;
use axum::http::StatusCode;
use common::{build_app, gauge, get, load_test_config};
use tower::ServiceExt;
use workflow_metrics::metrics::MetricsRecorder;

const COMBINED_CONFIG: &str = r#"
version: "1.0.0"
logging:
  level: "debug"
  format: "json"
"#;

const SPLIT_CONFIG: &str = r#"
version: "1.0.0"
metrics:
  path: /metrics
  port: 9090
  ttl: 60
telemetry:
  path: /telemetry
  port: 9090
"#;

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    String::from_utf8(bytes.to_vec()).expect("body should be UTF-8")
}

#[tokio::test]
async fn scrape_serves_builtins_and_custom_metrics() {
    let (app, metrics) = build_app(load_test_config(COMBINED_CONFIG));
    metrics.workflow_processed();
    metrics
        .upsert_custom_metric("m1", "run-a", gauge("progress", "Workflow progress"), true)
        .unwrap();

    let response = app.oneshot(get("/metrics")).await.expect("request should succeed");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; version=0.0.4; charset=utf-8"
    );

    let body = body_text(response).await;
    assert!(body.contains("argo_workflows_workflows_processed_count 1"));
    assert!(body.contains("# HELP argo_workflows_progress Workflow progress"));
    assert!(body.contains("log_messages{level=\"error\"} 0"));
}

#[tokio::test]
async fn removed_owner_disappears_from_scrape() {
    let (app, metrics) = build_app(load_test_config(COMBINED_CONFIG));
    metrics
        .upsert_custom_metric("m1", "run-a", gauge("progress", "Workflow progress"), true)
        .unwrap();
    metrics.stop_realtime_metrics_for_key("run-a");

    let response = app.oneshot(get("/metrics")).await.unwrap();
    let body = body_text(response).await;
    assert!(!body.contains("argo_workflows_progress"));
}

#[tokio::test]
async fn split_endpoints_share_one_router() {
    let (app, _metrics) = build_app(load_test_config(SPLIT_CONFIG));

    let metrics_response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(metrics_response.status(), StatusCode::OK);
    let metrics_body = body_text(metrics_response).await;
    assert!(metrics_body.contains("argo_workflows_operation_duration_seconds"));

    let telemetry_response = app.oneshot(get("/telemetry")).await.unwrap();
    assert_eq!(telemetry_response.status(), StatusCode::OK);
    let telemetry_body = body_text(telemetry_response).await;
    assert!(!telemetry_body.contains("argo_workflows_"));
}

#[tokio::test]
async fn scrape_is_cached_within_ttl() {
    let (app, metrics) = build_app(load_test_config(SPLIT_CONFIG));

    let first = body_text(app.clone().oneshot(get("/metrics")).await.unwrap()).await;
    metrics
        .upsert_custom_metric("late", "", gauge("late_arrival", "Late"), false)
        .unwrap();
    let second = body_text(app.oneshot(get("/metrics")).await.unwrap()).await;

    assert_eq!(first, second);
    assert!(!second.contains("argo_workflows_late_arrival"));
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let (app, _metrics) = build_app(load_test_config(COMBINED_CONFIG));
    let response = app.oneshot(get("/telemetry")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

const UNSLASHED_CONFIG: &str = r#"
version: "1.0.0"
metrics:
  path: metrics
  port: 9090
telemetry:
  path: /metrics
  port: 9090
"#;

const LENIENT_CONFIG: &str = r#"
version: "1.0.0"
metrics:
  ignore_errors: true
"#;

#[tokio::test]
async fn unslashed_path_serves_combined_endpoint() {
    let (app, _metrics) = build_app(load_test_config(UNSLASHED_CONFIG));
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("argo_workflows_workflows_processed_count"));
}

#[tokio::test]
async fn duplicate_series_fail_the_scrape() {
    let (app, metrics) = build_app(load_test_config(COMBINED_CONFIG));
    metrics
        .upsert_custom_metric("a", "run-a", gauge("progress", "Progress"), true)
        .unwrap();
    metrics
        .upsert_custom_metric("b", "run-b", gauge("progress", "Progress"), true)
        .unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(body.contains("argo_workflows_progress"));
}

#[tokio::test]
async fn duplicate_series_skipped_when_ignoring_errors() {
    let (app, metrics) = build_app(load_test_config(LENIENT_CONFIG));
    metrics
        .upsert_custom_metric("a", "run-a", gauge("progress", "Progress"), true)
        .unwrap();
    metrics
        .upsert_custom_metric("b", "run-b", gauge("progress", "Progress"), true)
        .unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert_eq!(body.matches("argo_workflows_progress 0").count(), 1);
}
