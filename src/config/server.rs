use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_METRICS_SERVER_PORT: u16 = 9090;
pub const DEFAULT_METRICS_SERVER_PATH: &str = "/metrics";

/// One exposition endpoint.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub path: String,
    pub port: u16,
    /// Seconds a rendered scrape is served from cache; 0 disables caching.
    pub ttl: u64,
    /// Serve the families that did encode instead of failing the scrape.
    pub ignore_errors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            enabled: true,
            path: DEFAULT_METRICS_SERVER_PATH.to_string(),
            port: DEFAULT_METRICS_SERVER_PORT,
            ttl: 0,
            ignore_errors: false,
        }
    }
}

impl ServerConfig {
    /// The path as routed, with a leading `/`.
    pub fn route_path(&self) -> String {
        if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }

    /// Both endpoints enabled on the same port and routed path.
    pub fn same_server_as(&self, other: &ServerConfig) -> bool {
        self.port == other.port
            && self.route_path() == other.route_path()
            && self.enabled
            && other.enabled
    }
}
