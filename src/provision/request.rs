//! Provisioning request
//!
//! Deserialized from YAML or JSON. Missing fields deserialize to empty
//! values and are reported together by [`ProvisioningRequest::validate`]
//! before anything is sent to Azure.

use super::error::ProvisionError;
use crate::azure::models::AllocationMethod;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

/// Run ordinal, written as a string (`"05"`) or an integer (`5`)
///
/// Names embed the text as written, so quote it to keep leading zeros.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawOrdinal", into = "String")]
pub struct Ordinal(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOrdinal {
    Text(String),
    Number(i64),
}

impl From<RawOrdinal> for Ordinal {
    fn from(raw: RawOrdinal) -> Self {
        match raw {
            RawOrdinal::Text(text) => Ordinal(text),
            RawOrdinal::Number(n) => Ordinal(n.to_string()),
        }
    }
}

impl From<Ordinal> for String {
    fn from(ordinal: Ordinal) -> Self {
        ordinal.0
    }
}

impl From<&str> for Ordinal {
    fn from(text: &str) -> Self {
        Ordinal(text.to_string())
    }
}

impl From<u32> for Ordinal {
    fn from(n: u32) -> Self {
        Ordinal(n.to_string())
    }
}

impl Ordinal {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Custom script extension to install once the VM exists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionSettings {
    pub name: String,
    /// Passed to the extension unmodified (e.g. `fileUris`, `commandToExecute`)
    pub settings: Option<Map<String, Value>>,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmSettings {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub size: String,
    pub extension: ExtensionSettings,
}

impl fmt::Debug for VmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmSettings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("size", &self.size)
            .field("extension", &self.extension)
            .finish()
    }
}

/// Overrides for the public IP defaults (dynamic, labelled with the domain name)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PublicIpSettings {
    pub allocation_method: AllocationMethod,
    pub dns_label: Option<String>,
}

/// Desired deployment of one virtual machine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProvisioningRequest {
    pub resource_group: String,
    pub location: String,
    pub storage_account: String,
    pub domain_prefix: String,
    pub number: Ordinal,
    pub vnet: String,
    pub vm: VmSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<PublicIpSettings>,
}

impl ProvisioningRequest {
    /// Parse a request from YAML (JSON is accepted too)
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse provisioning request")
    }

    /// Load a request file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    /// Check that every field used by a pipeline step is present
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let mut missing = Vec::new();
        let mut require = |present: bool, field: &'static str| {
            if !present {
                missing.push(field);
            }
        };

        require(!self.resource_group.trim().is_empty(), "resourceGroup");
        require(!self.location.trim().is_empty(), "location");
        require(!self.storage_account.trim().is_empty(), "storageAccount");
        require(!self.domain_prefix.trim().is_empty(), "domainPrefix");
        require(!self.number.as_str().trim().is_empty(), "number");
        require(!self.vnet.trim().is_empty(), "vnet");
        require(!self.vm.username.trim().is_empty(), "vm.username");
        require(!self.vm.password.is_empty(), "vm.password");
        require(!self.vm.size.trim().is_empty(), "vm.size");
        require(!self.vm.extension.name.trim().is_empty(), "vm.extension.name");
        require(self.vm.extension.settings.is_some(), "vm.extension.settings");

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ProvisionError::Validation { missing })
        }
    }
}
