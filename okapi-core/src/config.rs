use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Top-level configuration for the Okapi gateway (spec.md §6). Every
/// field falls back to a development-only default when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkapiConfig {
    /// Base URL this node advertises to modules via `X-Okapi-Url`.
    #[serde(default = "default_okapi_url")]
    pub okapi_url: String,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub postgres: PostgresConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Number of worker threads (0 = auto-detect core count).
    #[serde(default)]
    pub workers: usize,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_addr")]
    pub addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// `postgres_*` settings from spec.md §6, including the legacy
/// `postgres_db_init` flag that replaces the old `initdatabase`/
/// `purgedatabase` commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    #[serde(default = "default_postgres_host")]
    pub host: String,

    #[serde(default = "default_postgres_port")]
    pub port: u16,

    #[serde(default = "default_postgres_username")]
    pub username: String,

    #[serde(default = "default_postgres_password")]
    pub password: String,

    #[serde(default = "default_postgres_database")]
    pub database: String,

    #[serde(default)]
    pub db_init: bool,
}

/// The intra-cluster gossip bus configuration ClusterSync connects to
/// (spec.md §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_bus_endpoints")]
    pub bus_endpoints: Vec<String>,

    #[serde(default = "default_bus_topic")]
    pub topic: String,
}

impl OkapiConfig {
    /// Loads configuration from an optional YAML file, merged with
    /// `OKAPI_`-prefixed environment variables (`OKAPI_PROXY__WORKERS`,
    /// etc.), then built-in defaults.
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        } else {
            for default_path in &["okapi.yaml", "/etc/okapi/okapi.yaml", "config/okapi.yaml"] {
                if std::path::Path::new(default_path).exists() {
                    figment = figment.merge(Yaml::file(default_path));
                    break;
                }
            }
        }

        figment = figment.merge(Env::prefixed("OKAPI_").split("__"));

        let config: Self = figment.extract()?;
        Ok(config)
    }

    /// Worker count after resolving 0 ("auto") to the host's core count.
    pub fn effective_workers(&self) -> usize {
        if self.proxy.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.proxy.workers
        }
    }
}

impl Default for OkapiConfig {
    fn default() -> Self {
        Self {
            okapi_url: default_okapi_url(),
            proxy: ProxyConfig::default(),
            admin: AdminConfig::default(),
            postgres: PostgresConfig::default(),
            cluster: ClusterConfig::default(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            workers: 0,
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            addr: default_admin_addr(),
            enabled: true,
            cors_origins: vec![],
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: default_postgres_host(),
            port: default_postgres_port(),
            username: default_postgres_username(),
            password: default_postgres_password(),
            database: default_postgres_database(),
            db_init: false,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            bus_endpoints: default_bus_endpoints(),
            topic: default_bus_topic(),
        }
    }
}

fn default_okapi_url() -> String {
    "http://localhost:9130".to_string()
}

fn default_http_addr() -> SocketAddr {
    "0.0.0.0:9130".parse().unwrap()
}

fn default_admin_addr() -> SocketAddr {
    "127.0.0.1:9131".parse().unwrap()
}

fn default_connect_timeout() -> u64 {
    6000
}

fn default_read_timeout() -> u64 {
    15000
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_username() -> String {
    "okapi".to_string()
}

fn default_postgres_password() -> String {
    "okapi25".to_string()
}

fn default_postgres_database() -> String {
    "okapi".to_string()
}

fn default_bus_endpoints() -> Vec<String> {
    vec!["127.0.0.1:9092".to_string()]
}

fn default_bus_topic() -> String {
    "okapi.conf.modules".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = OkapiConfig::default();
        assert_eq!(cfg.proxy.http_addr.port(), 9130);
        assert_eq!(cfg.admin.addr.port(), 9131);
        assert_eq!(cfg.postgres.database, "okapi");
        assert!(!cfg.postgres.db_init);
    }

    #[test]
    fn test_effective_workers_auto_detects() {
        let mut cfg = OkapiConfig::default();
        cfg.proxy.workers = 0;
        assert!(cfg.effective_workers() >= 1);
        cfg.proxy.workers = 4;
        assert_eq!(cfg.effective_workers(), 4);
    }

    #[test]
    fn test_cluster_bus_topic_matches_spec() {
        let cfg = OkapiConfig::default();
        assert_eq!(cfg.cluster.topic, "okapi.conf.modules");
    }
}
