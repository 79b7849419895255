//! Application configuration.

use serde::{Deserialize, Serialize};

use crate::params::EngineParams;

/// Top-level configuration for the crowdcast runners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineParams,
    #[serde(default)]
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Runner-side settings: the exclusive write lock shared by every mutating
/// command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub lock_path: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            lock_path: "crowdcast.lock".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/crowdcast".to_string(),
                max_connections: 10,
            },
            engine: EngineParams::default(),
            runner: RunnerConfig::default(),
        }
    }
}
