#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use workflow_metrics::config::{parse_config, ConfigV1};
use workflow_metrics::metrics::{new_gauge, Instrument, Metrics};
use workflow_metrics::routes::create_router;
use workflow_metrics::startup::plan_servers;
use workflow_metrics::state::AppState;

pub fn load_test_config(yaml: &str) -> ConfigV1 {
    parse_config(yaml).expect("Failed to parse test config YAML")
}

/// Router for the first planned server, plus the metrics handle behind it.
pub fn build_app(config: ConfigV1) -> (Router, Metrics) {
    let metrics = Metrics::new();
    let plans = plan_servers(&config);
    let plan = plans.first().expect("config should enable a server").clone();
    let state = AppState::new(Arc::new(config), metrics.clone());
    (create_router(state, &plan.endpoints), metrics)
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Body::empty())
        .expect("failed to build request")
}

pub fn gauge(name: &str, help: &str) -> Instrument {
    new_gauge(name, help, &[]).expect("valid gauge").into()
}
