//! Configuration module for querylift.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "querylift.db")
    pub db_path: String,
    /// Log Analytics workspace filled into queries that have none (default: unset)
    pub default_workspace: String,
    /// Rewrite every stored query to the current schema at startup (default: false)
    pub upgrade_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "querylift.db".to_string(),
            default_workspace: String::new(),
            upgrade_on_start: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `QUERYLIFT_HTTP_PORT`: HTTP port (default: 8080)
    /// - `QUERYLIFT_DB_PATH`: Database file path (default: "querylift.db")
    /// - `QUERYLIFT_DEFAULT_WORKSPACE`: default Log Analytics workspace
    /// - `QUERYLIFT_UPGRADE_ON_START`: `true`/`1` to upgrade stored queries on boot
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(port_str) = lookup("QUERYLIFT_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Some(db_path) = lookup("QUERYLIFT_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(workspace) = lookup("QUERYLIFT_DEFAULT_WORKSPACE") {
            cfg.default_workspace = workspace.trim().to_string();
        }

        if let Some(flag) = lookup("QUERYLIFT_UPGRADE_ON_START") {
            cfg.upgrade_on_start = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "querylift.db");
        assert!(cfg.default_workspace.is_empty());
        assert!(!cfg.upgrade_on_start);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("QUERYLIFT_HTTP_PORT", "9090"),
            ("QUERYLIFT_DB_PATH", "/tmp/q.db"),
            ("QUERYLIFT_DEFAULT_WORKSPACE", " ws-1 "),
            ("QUERYLIFT_UPGRADE_ON_START", "TRUE"),
        ]
        .into_iter()
        .collect();
        let cfg = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.http_port, 9090);
        assert_eq!(cfg.db_path, "/tmp/q.db");
        assert_eq!(cfg.default_workspace, "ws-1");
        assert!(cfg.upgrade_on_start);
    }

    #[test]
    fn test_bad_port_keeps_default() {
        let cfg = ServerConfig::from_lookup(|k| {
            (k == "QUERYLIFT_HTTP_PORT").then(|| "eighty".to_string())
        });
        assert_eq!(cfg.http_port, 8080);
    }
}
