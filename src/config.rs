//! Runtime configuration, resolved from environment variables with
//! sensible defaults for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "inventio";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("{APP_NAME}=info,tower_http=info")
}

/// Listen address for the HTTP API. `INVENTIO_BIND` overrides.
pub fn bind_addr() -> SocketAddr {
    std::env::var("INVENTIO_BIND")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)))
}

/// SQLite database path for durable run state. `INVENTIO_DB` overrides;
/// an empty value selects the in-memory store.
pub fn database_path() -> Option<PathBuf> {
    match std::env::var("INVENTIO_DB") {
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(PathBuf::from(v)),
        Err(_) => Some(PathBuf::from("inventio.db")),
    }
}

/// HTTP fetch timeout for document ingestion, in seconds.
/// `INVENTIO_FETCH_TIMEOUT_SECS` overrides.
pub fn fetch_timeout_secs() -> u64 {
    std::env::var("INVENTIO_FETCH_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30)
}
