//! Process configuration, loaded once at startup.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. legacy variables (`DB_HOST`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`, `DB_PORT`, `DB_ENGINE`, `PORT`)
//! 3. `ENTREGAS_*` variables, nested with `__` (e.g. `ENTREGAS_DATABASE__ENGINE=mssql`)

use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};

use crate::db::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    Disabled,
    #[default]
    Preferred,
    Required,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub engine: Engine,
    pub host: String,
    /// Falls back to the engine's standard port.
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub name: String,
    pub tls: TlsMode,
    /// Accept any server certificate (SQL Server only).
    pub trust_cert: bool,
    /// Upper bound on open connections; further callers wait in line.
    pub pool_size: u32,
    /// How long a caller may wait for a free connection.
    pub acquire_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: Engine::MySql,
            host: "localhost".to_string(),
            port: None,
            user: "root".to_string(),
            password: String::new(),
            name: "registro_entregas".to_string(),
            tls: TlsMode::Preferred,
            trust_cert: false,
            pool_size: 10,
            acquire_timeout_secs: 30,
            query_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or_else(|| self.engine.default_port())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs.max(1))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub port: u16,
    pub loglevel: String,
    /// Key required on delivery routes.
    pub api_key: String,
    /// Run the bundled DDL before serving.
    pub init_schema: bool,
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: 3000,
            loglevel: "info".to_string(),
            api_key: String::new(),
            init_schema: false,
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        let legacy = Env::raw().filter_map(|key| {
            let mapped = match key.as_str().to_ascii_uppercase().as_str() {
                "DB_ENGINE" | "DB_TYPE" => "database.engine",
                "DB_HOST" => "database.host",
                "DB_PORT" => "database.port",
                "DB_USER" => "database.user",
                "DB_PASSWORD" => "database.password",
                "DB_NAME" => "database.name",
                "PORT" => "port",
                _ => return None,
            };
            Some(mapped.into())
        });

        Figment::from(Serialized::defaults(Config::default()))
            .merge(legacy)
            .merge(Env::prefixed("ENTREGAS_").split("__"))
    }

    pub fn from_env() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.port)
    }
}
