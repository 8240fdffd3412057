//! Service configuration, loaded from TOML with every key optional.

use crate::Pipeline;
use cxlens_engine::ProcessEngine;
use cxlens_store::TempSourceStore;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_ENGINE: &str = "analyzer";
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SOURCE_SUFFIX: &str = ".cpp";
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub engine: PathBuf,
    pub engine_timeout_secs: u64,
    pub temp_dir: Option<PathBuf>,
    pub source_suffix: String,
    pub max_body_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            engine: PathBuf::from(DEFAULT_ENGINE),
            engine_timeout_secs: DEFAULT_ENGINE_TIMEOUT_SECS,
            temp_dir: None,
            source_suffix: DEFAULT_SOURCE_SUFFIX.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServiceConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse TOML text; `origin` names the source in error messages.
    pub fn parse(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.engine_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "engine_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be at least 1".to_string(),
            ));
        }
        if self.engine.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("engine must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn store(&self) -> TempSourceStore {
        match &self.temp_dir {
            Some(dir) => TempSourceStore::new(dir, &self.source_suffix),
            None => TempSourceStore::system(&self.source_suffix),
        }
    }

    /// Pipeline backed by the configured analyzer program.
    pub fn pipeline(&self) -> Pipeline {
        let engine = ProcessEngine::new(&self.engine).with_timeout(self.engine_timeout());
        Pipeline::new(self.store(), Arc::new(engine))
    }
}
