//! Exposition server startup.
//!
//! Decides how many listeners the metrics and telemetry endpoints need and
//! runs them until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ConfigV1;
use crate::metrics::Metrics;
use crate::routes::{self, Endpoint, Exposition};
use crate::state::AppState;

/// One listener and the endpoints it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPlan {
    pub port: u16,
    pub endpoints: Vec<Endpoint>,
}

/// Groups the enabled endpoints by port. When both endpoints are the same
/// server a single combined endpoint is served.
pub fn plan_servers(config: &ConfigV1) -> Vec<ServerPlan> {
    let (metrics, telemetry) = (&config.metrics, &config.telemetry);
    if metrics.same_server_as(telemetry) {
        return vec![ServerPlan {
            port: metrics.port,
            endpoints: vec![Endpoint::new(metrics, Exposition::Combined)],
        }];
    }

    let mut plans: Vec<ServerPlan> = Vec::new();
    for (server, exposition) in [
        (metrics, Exposition::Metrics),
        (telemetry, Exposition::Telemetry),
    ] {
        if !server.enabled {
            continue;
        }
        let endpoint = Endpoint::new(server, exposition);
        match plans.iter_mut().find(|plan| plan.port == server.port) {
            Some(plan) => plan.endpoints.push(endpoint),
            None => plans.push(ServerPlan {
                port: server.port,
                endpoints: vec![endpoint],
            }),
        }
    }
    plans
}

/// Runs every planned listener until shutdown.
///
/// # Errors
///
/// Returns an error if a listener fails to bind or stops with an I/O error.
pub async fn run(config: Arc<ConfigV1>, metrics: Metrics) -> Result<(), Box<dyn std::error::Error>> {
    let plans = plan_servers(&config);
    if plans.is_empty() {
        info!("Metrics and telemetry endpoints are disabled");
        return Ok(());
    }

    let state = AppState::new(config, metrics);
    try_join_all(plans.into_iter().map(|plan| serve(plan, state.clone()))).await?;
    Ok(())
}

async fn serve(plan: ServerPlan, state: AppState) -> std::io::Result<()> {
    let address = SocketAddr::from(([0, 0, 0, 0], plan.port));
    let listener = TcpListener::bind(address).await?;
    let paths: Vec<&str> = plan.endpoints.iter().map(|e| e.path.as_str()).collect();
    info!(%address, ?paths, "Starting metrics server");

    let app = routes::create_router(state, &plan.endpoints);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down metrics server");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn config(metrics: ServerConfig, telemetry: ServerConfig) -> ConfigV1 {
        ConfigV1 {
            metrics,
            telemetry,
            ..ConfigV1::default()
        }
    }

    fn server(enabled: bool, path: &str, port: u16) -> ServerConfig {
        ServerConfig {
            enabled,
            path: path.to_string(),
            port,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_same_server_is_combined() {
        let plans = plan_servers(&ConfigV1::default());
        assert_eq!(
            plans,
            vec![ServerPlan {
                port: 9090,
                endpoints: vec![Endpoint::new(&ServerConfig::default(), Exposition::Combined)],
            }]
        );
    }

    #[test]
    fn test_unslashed_path_is_still_combined() {
        let plans = plan_servers(&config(
            server(true, "metrics", 9090),
            server(true, "/metrics", 9090),
        ));
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].endpoints.len(), 1);
        assert_eq!(plans[0].endpoints[0].path, "/metrics");
        assert_eq!(plans[0].endpoints[0].exposition, Exposition::Combined);
    }

    #[test]
    fn test_separate_ports() {
        let plans = plan_servers(&config(
            server(true, "/metrics", 9090),
            server(true, "/telemetry", 8080),
        ));
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].endpoints[0].exposition, Exposition::Metrics);
        assert_eq!(plans[1].port, 8080);
    }

    #[test]
    fn test_shared_port_different_paths() {
        let plans = plan_servers(&config(
            server(true, "/metrics", 9090),
            server(true, "/telemetry", 9090),
        ));
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].endpoints.len(), 2);
    }

    #[test]
    fn test_disabled_endpoints_are_skipped() {
        let plans = plan_servers(&config(
            server(false, "/metrics", 9090),
            server(true, "/metrics", 9090),
        ));
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].endpoints[0].exposition, Exposition::Telemetry);

        let none = plan_servers(&config(
            server(false, "/metrics", 9090),
            server(false, "/telemetry", 9091),
        ));
        assert!(none.is_empty());
    }
}
