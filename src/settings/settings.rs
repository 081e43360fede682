use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub http: Http,
    pub log: Log,
    pub store: Store,
    pub token: Token,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Deserialize)]
pub struct Store {
    pub backend: String, // "memory", "redis" or "mysql"
    pub redis_dsn: Option<String>,
    pub mysql_dsn: Option<String>,
    pub prefix: String,
    pub connect_timeout_ms: u64,
    pub op_timeout_ms: u64,
    pub sweep_interval_secs: u64,
}

// DSNs may carry credentials.
impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(dsn: &Option<String>) -> Option<&'static str> {
            dsn.as_ref().map(|_| "<redacted>")
        }
        f.debug_struct("Store")
            .field("backend", &self.backend)
            .field("redis_dsn", &redact(&self.redis_dsn))
            .field("mysql_dsn", &redact(&self.mysql_dsn))
            .field("prefix", &self.prefix)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("op_timeout_ms", &self.op_timeout_ms)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct Token {
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub secret_backend: String, // "hmac" or "argon2"
    pub access_key_env: String,
    pub refresh_key_env: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

const ENV_PREFIX: &str = "TOKENPAIR";

/// Load settings from a TOML file, then apply `TOKENPAIR__SECTION__KEY` overrides.
pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
