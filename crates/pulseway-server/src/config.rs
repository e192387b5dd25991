//! Server configuration from environment.

use std::env;
use std::time::Duration;

use crate::routing::DEFAULT_ROUTING_URL;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    /// `None` keeps documents in memory only.
    pub database_path: Option<String>,
    pub database_max_connections: u32,
    /// Reporting cadence advertised to vehicles.
    pub report_interval: Duration,
    pub report_distance_m: f64,
    /// Zero disables the background refresh loop.
    pub directory_refresh_secs: u64,
    pub routing_url: String,
    pub routing_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            database_path: None,
            database_max_connections: 5,
            report_interval: Duration::from_millis(5000),
            report_distance_m: 1.0,
            directory_refresh_secs: 0,
            routing_url: DEFAULT_ROUTING_URL.to_string(),
            routing_api_key: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parse_env("PULSEWAY_PORT").unwrap_or(defaults.server_port),
            database_path: non_empty_env("PULSEWAY_DATABASE_PATH"),
            database_max_connections: parse_env("PULSEWAY_DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            report_interval: parse_env("PULSEWAY_REPORT_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.report_interval),
            report_distance_m: parse_env("PULSEWAY_REPORT_DISTANCE_M")
                .unwrap_or(defaults.report_distance_m),
            directory_refresh_secs: parse_env("PULSEWAY_DIRECTORY_REFRESH_SECS")
                .unwrap_or(defaults.directory_refresh_secs),
            routing_url: non_empty_env("PULSEWAY_ROUTING_URL").unwrap_or(defaults.routing_url),
            routing_api_key: non_empty_env("PULSEWAY_ROUTING_API_KEY"),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    non_empty_env(key).and_then(|value| value.parse().ok())
}
