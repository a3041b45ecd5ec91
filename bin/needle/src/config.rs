//! Layered configuration
//!
//! Precedence, lowest first: built-in defaults, the TOML file (`--config`
//! or `needle.toml` in the working directory), `NEEDLE_` environment
//! variables with `__` between section and key, then command line flags.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use needle_core::PostgresConfig;
use needle_namerd::NamerdConfig;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "needle.toml";
pub const ENV_PREFIX: &str = "NEEDLE_";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub grpc: GrpcConfig,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub namerd: NamerdConfig,
    pub sync: SyncConfig,
    pub kube: KubeConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Console,
    Discard,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub listen_address: SocketAddr,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            listen_address: (Ipv4Addr::UNSPECIFIED, 5000).into(),
        }
    }
}

/// Listener for `/healthz` and `/metrics`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen_address: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_address: (Ipv4Addr::UNSPECIFIED, 9090).into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub host: String,
    pub name: String,
    pub username: String,
    pub password: String,
    pub ssl_mode: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let postgres = PostgresConfig::default();
        Self {
            backend: DatabaseBackend::default(),
            host: postgres.host,
            name: postgres.name,
            username: postgres.username,
            password: postgres.password,
            ssl_mode: postgres.ssl_mode,
            max_connections: postgres.max_connections,
            connect_timeout_secs: postgres.connect_timeout_secs,
        }
    }
}

impl DatabaseConfig {
    pub fn postgres(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.host.clone(),
            name: self.name.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            ssl_mode: self.ssl_mode.clone(),
            max_connections: self.max_connections,
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Pending dtab notifications held before new ones are dropped
    pub queue_capacity: usize,
    /// Period of the full reconcile sweep, 0 to disable
    pub reconcile_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            reconcile_interval_secs: 300,
        }
    }
}

impl SyncConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KubeConfig {
    /// kubeconfig context; in-cluster or current context when unset
    pub context: Option<String>,
}

/// Values given on the command line
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub log_format: Option<LogFormat>,
    pub grpc_listen: Option<SocketAddr>,
}

impl Config {
    pub fn figment(path: Option<&Path>, overrides: &CliOverrides) -> Result<Figment> {
        let file = match path {
            Some(path) => {
                if !path.is_file() {
                    bail!("config file {} does not exist", path.display());
                }
                path.to_path_buf()
            }
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let mut figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(format) = overrides.log_format {
            figment = figment.merge(Serialized::default("log.format", format));
        }
        if let Some(listen) = overrides.grpc_listen {
            figment = figment.merge(Serialized::default("grpc.listen_address", listen));
        }
        Ok(figment)
    }

    pub fn load(path: Option<&Path>, overrides: &CliOverrides) -> Result<Self> {
        Self::figment(path, overrides)?
            .extract()
            .context("Failed to load configuration")
    }
}
