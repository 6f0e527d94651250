//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use foodshare_core::ViewLimits;

use crate::errors::{ApiError, Result};

/// Where donations and claims are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// SQLite database at `database_url`.
    Sqlite,
    /// JSON snapshot mirrored from memory, at `local_store_path`.
    Local,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the REST API server
    pub api_port: u16,
    pub store_backend: StoreBackend,
    /// SQLite database URL or file path
    pub database_url: String,
    /// Maximum pooled SQLite connections
    pub db_max_connections: u32,
    /// Snapshot file used by the `local` backend
    pub local_store_path: PathBuf,
    /// Bounds on the cached list views
    pub view_limits: ViewLimits,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; missing keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            api_port: var("API_PORT", "3001")
                .parse()
                .map_err(|_| ApiError::Config("Invalid API_PORT".to_string()))?,
            store_backend: match var("STORE_BACKEND", "sqlite").as_str() {
                "sqlite" => StoreBackend::Sqlite,
                "local" => StoreBackend::Local,
                other => {
                    return Err(ApiError::Config(format!(
                        "Invalid STORE_BACKEND `{other}` (expected `sqlite` or `local`)"
                    )))
                }
            },
            database_url: var("DATABASE_URL", "sqlite:./foodshare.db"),
            db_max_connections: var("DB_MAX_CONNECTIONS", "5")
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ApiError::Config("Invalid DB_MAX_CONNECTIONS".to_string()))?,
            local_store_path: PathBuf::from(var("LOCAL_STORE_PATH", "./foodshare-local.json")),
            view_limits: ViewLimits {
                max_entries: var("VIEW_CACHE_MAX_ENTRIES", "256")
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| ApiError::Config("Invalid VIEW_CACHE_MAX_ENTRIES".to_string()))?,
                idle_ttl: var("VIEW_CACHE_IDLE_SECS", "300")
                    .parse()
                    .map(Duration::from_secs)
                    .map_err(|_| ApiError::Config("Invalid VIEW_CACHE_IDLE_SECS".to_string()))?,
            },
        })
    }
}
