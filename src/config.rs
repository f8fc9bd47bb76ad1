use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Server settings, read once from `ROOMBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub catalog: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub sweep_interval: Duration,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parsed = |var: &'static str| -> Result<Option<u64>, ConfigError> {
            get(var)
                .map(|value| value.trim().parse().map_err(|_| ConfigError::Invalid { var, value }))
                .transpose()
        };
        let port = |var: &'static str| -> Result<Option<u16>, ConfigError> {
            get(var)
                .map(|value| value.trim().parse().map_err(|_| ConfigError::Invalid { var, value }))
                .transpose()
        };

        let max_connections = parsed("ROOMBOOK_MAX_CONNECTIONS")?.unwrap_or(256) as usize;
        if max_connections == 0 {
            return Err(ConfigError::Zero("ROOMBOOK_MAX_CONNECTIONS"));
        }
        let sweep_secs = parsed("ROOMBOOK_SWEEP_INTERVAL_SECS")?.unwrap_or(60);
        if sweep_secs == 0 {
            return Err(ConfigError::Zero("ROOMBOOK_SWEEP_INTERVAL_SECS"));
        }

        Ok(Self {
            port: port("ROOMBOOK_PORT")?.unwrap_or(5434),
            bind: get("ROOMBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            data_dir: get("ROOMBOOK_DATA_DIR").unwrap_or_else(|| "./data".into()).into(),
            catalog: get("ROOMBOOK_CATALOG")
                .unwrap_or_else(|| "./catalog.json".into())
                .into(),
            password: get("ROOMBOOK_PASSWORD").unwrap_or_else(|| "roombook".into()),
            max_connections,
            sweep_interval: Duration::from_secs(sweep_secs),
            metrics_port: port("ROOMBOOK_METRICS_PORT")?,
            tls_cert: get("ROOMBOOK_TLS_CERT").map(PathBuf::from),
            tls_key: get("ROOMBOOK_TLS_KEY").map(PathBuf::from),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("roombook.wal")
    }
}
