use crate::ProviderError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where and how to reach the provider gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub endpoint: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Region used for convergence when a definition names none.
    #[serde(default)]
    pub default_region: Option<String>,
}

impl ProviderConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            auth_token: None,
            default_region: None,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    #[must_use]
    pub fn with_default_region(mut self, region: &str) -> Self {
        self.default_region = Some(region.to_owned());
        self
    }

    /// Load config from `~/.config/stackform/provider.json`.
    pub fn load_default() -> Result<Self, ProviderError> {
        let path = default_config_path()?;
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| ProviderError::Config(format!("invalid provider config: {e}")))?;
        config.endpoint = config.endpoint.trim_end_matches('/').to_owned();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ProviderError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ProviderError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, ProviderError> {
    let home =
        std::env::var("HOME").map_err(|_| ProviderError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/stackform/provider.json"))
}
