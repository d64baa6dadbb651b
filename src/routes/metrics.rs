//! Metrics exposition endpoint.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Router};
use tracing::error;

use crate::config::ServerConfig;
use crate::metrics::{encode_families, merge_families, RenderError};
use crate::state::AppState;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Which registries an endpoint exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Exposition {
    /// Controller instruments.
    Metrics,
    /// Process telemetry.
    Telemetry,
    /// Both, when the two endpoints share a server.
    Combined,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub path: String,
    pub exposition: Exposition,
}

impl Endpoint {
    pub fn new(server: &ServerConfig, exposition: Exposition) -> Self {
        Endpoint {
            path: server.route_path(),
            exposition,
        }
    }
}

pub fn routes(path: &str, exposition: Exposition) -> Router<AppState> {
    Router::new().route(
        path,
        get(move |State(state): State<AppState>| async move { scrape(state, exposition) }),
    )
}

/// Returns the scrape in Prometheus text format, from cache while the
/// endpoint's TTL has not expired.
fn scrape(state: AppState, exposition: Exposition) -> Response {
    let cache = state.cache_for(exposition);
    if let Some(body) = cache.get() {
        return text_response(body);
    }

    match render(&state, exposition) {
        Ok(body) => {
            cache.set(body.clone());
            text_response(body)
        }
        Err(err) => {
            error!(?exposition, "Failed to render metrics: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

fn render(state: &AppState, exposition: Exposition) -> Result<String, RenderError> {
    let ignore_errors = match exposition {
        Exposition::Metrics | Exposition::Combined => state.config.metrics.ignore_errors,
        Exposition::Telemetry => state.config.telemetry.ignore_errors,
    };
    let families = match exposition {
        Exposition::Metrics => state.metrics.gather(ignore_errors)?,
        Exposition::Telemetry => state.telemetry.gather(),
        Exposition::Combined => {
            let mut families = state.metrics.collect_families();
            families.extend(state.telemetry.gather());
            merge_families(families, ignore_errors)?
        }
    };
    encode_families(&families, ignore_errors)
}

fn text_response(body: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
}
