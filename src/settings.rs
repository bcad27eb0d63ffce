use config::{Config, Environment, File};
use serde::Deserialize;

use crate::datatype::DEFAULT_ROUNDING_MS;
use crate::error::Result;

pub const DEFAULT_CONFIG_FILE: &str = "compose-store.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file; the database lives in memory when absent.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdSettings {
    pub machine_id: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClockSettings {
    pub rounding_ms: i64,
}
impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            rounding_ms: DEFAULT_ROUNDING_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub filter: String,
}
impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub ids: IdSettings,
    pub clock: ClockSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Reads the optional config file at `path`, then lets
    /// `COMPOSE_STORE__<SECTION>__<KEY>` environment variables override it.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("COMPOSE_STORE").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
