//! Configuration Management
//!
//! Handles persistent configuration storage for azprov.

use crate::azure::auth::get_default_subscription;
use crate::azure::client::PollSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Location used by bootstrap commands when none is given
pub const DEFAULT_LOCATION: &str = "westeurope";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Subscription to provision into
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Service principal tenant
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Service principal application id
    #[serde(default)]
    pub client_id: Option<String>,
    /// Default location for resource groups, storage accounts and vnets
    #[serde(default)]
    pub location: Option<String>,
    /// Seconds between long-running operation polls
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    /// Seconds to wait for one long-running operation
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("azprov").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config file: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective subscription (CLI > env > config > Azure CLI default)
    pub fn effective_subscription(&self, cli: Option<&str>) -> Option<String> {
        cli.map(String::from)
            .or_else(|| env_value("AZURE_SUBSCRIPTION_ID"))
            .or_else(|| self.subscription_id.clone())
            .or_else(get_default_subscription)
    }

    /// Get effective tenant (CLI > env > config)
    pub fn effective_tenant(&self, cli: Option<&str>) -> Option<String> {
        cli.map(String::from)
            .or_else(|| env_value("AZURE_TENANT_ID"))
            .or_else(|| self.tenant_id.clone())
    }

    /// Get effective client id (CLI > env > config)
    pub fn effective_client_id(&self, cli: Option<&str>) -> Option<String> {
        cli.map(String::from)
            .or_else(|| env_value("AZURE_CLIENT_ID"))
            .or_else(|| self.client_id.clone())
    }

    /// Get effective location (CLI > config > westeurope)
    pub fn effective_location(&self, cli: Option<&str>) -> String {
        cli.map(String::from)
            .or_else(|| self.location.clone())
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string())
    }

    /// Long-running operation polling, falling back to the client defaults
    pub fn poll_settings(&self) -> PollSettings {
        let defaults = PollSettings::default();
        PollSettings {
            interval: self
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            timeout: self
                .operation_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
