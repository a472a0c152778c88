//! Harness settings.
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `SHARDWATCH_*` environment variables (`__` separates nested keys, e.g.
//! `SHARDWATCH_VALIDATION__PROMOTION=400`).

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::chaos::TerminationMode;
use crate::validator::TailLimits;

pub const ENV_PREFIX: &str = "SHARDWATCH_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosSettings {
    pub mode: TerminationMode,
    /// Seed for target selection; random when unset.
    pub seed: Option<u64>,
}

impl Default for ChaosSettings {
    fn default() -> Self {
        ChaosSettings {
            mode: TerminationMode::Abrupt,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub validation: TailLimits,
    pub logging: LoggingSettings,
    pub chaos: ChaosSettings,
}

impl Settings {
    /// Load settings, reading `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file_exact(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()
    }
}
