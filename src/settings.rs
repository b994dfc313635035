//! Client settings, layered from defaults, an optional `xtdb.toml` and
//! `XTDB_*` environment variables.

use std::path::Path;

use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_URI: &str = "http://localhost:3000/_xtdb";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Base URI of the node's HTTP API.
    pub uri: String,
    /// Per-request timeout; `None` waits indefinitely.
    pub timeout_seconds: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            timeout_seconds: Some(DEFAULT_TIMEOUT_SECONDS),
        }
    }
}

impl Settings {
    /// Loads the settings. An explicit `path` must exist; without one,
    /// `xtdb.toml` in the working directory is read when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("xtdb").required(false),
        };
        let settings = defaults()?
            .add_source(file)
            .add_source(Environment::with_prefix("XTDB"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Reads settings from TOML text, on top of the defaults.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings = defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("uri", DEFAULT_URI)?
        .set_default("timeout_seconds", DEFAULT_TIMEOUT_SECONDS as i64)?)
}
