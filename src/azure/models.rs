//! Resource Manager models
//!
//! Typed request bodies for the create-or-update calls and the handles
//! returned by them. Each body knows how to render itself into the ARM
//! JSON shape (`location` + `properties`).

use super::error::{AzureError, AzureResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::marker::PhantomData;

/// Marker for the kind of resource a handle refers to
pub trait ResourceKind {
    const LABEL: &'static str;
}

macro_rules! resource_kinds {
    ($($kind:ident => $label:literal),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub enum $kind {}

            impl ResourceKind for $kind {
                const LABEL: &'static str = $label;
            }
        )*
    };
}

resource_kinds! {
    Subnet => "subnet",
    PublicIp => "public IP address",
    NetworkInterface => "network interface",
    VirtualMachine => "virtual machine",
    VmExtension => "VM extension",
    VirtualNetwork => "virtual network",
    ResourceGroup => "resource group",
    StorageAccount => "storage account",
}

/// Reference to a created resource: ARM id, name and the raw provider document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(bound = "")]
pub struct ResourceHandle<K> {
    pub id: String,
    pub name: String,
    pub provider: Value,
    #[serde(skip)]
    kind: PhantomData<K>,
}

pub type SubnetHandle = ResourceHandle<Subnet>;
pub type PublicIpHandle = ResourceHandle<PublicIp>;
pub type NicHandle = ResourceHandle<NetworkInterface>;
pub type VmHandle = ResourceHandle<VirtualMachine>;
pub type ExtensionHandle = ResourceHandle<VmExtension>;
pub type VnetHandle = ResourceHandle<VirtualNetwork>;
pub type ResourceGroupHandle = ResourceHandle<ResourceGroup>;
pub type StorageAccountHandle = ResourceHandle<StorageAccount>;

impl<K: ResourceKind> ResourceHandle<K> {
    pub fn new(id: &str, name: &str, provider: Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            provider,
            kind: PhantomData,
        }
    }

    /// Build a handle from an ARM resource document
    pub fn from_arm(value: Value) -> AzureResult<Self> {
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or(AzureError::MissingField("id"))?
            .to_string();
        let name = value
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or(AzureError::MissingField("name"))?
            .to_string();

        Ok(Self {
            id,
            name,
            provider: value,
            kind: PhantomData,
        })
    }

    /// Human readable kind, used in logs
    pub fn kind(&self) -> &'static str {
        K::LABEL
    }

    /// `properties.provisioningState`, if reported
    pub fn provisioning_state(&self) -> Option<&str> {
        provisioning_state(&self.provider)
    }
}

/// Read `properties.provisioningState` from an ARM document
pub fn provisioning_state(value: &Value) -> Option<&str> {
    value
        .get("properties")
        .and_then(|p| p.get("provisioningState"))
        .and_then(|v| v.as_str())
}

/// IP allocation method for public and private addresses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationMethod {
    #[default]
    Dynamic,
    Static,
}

impl fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationMethod::Dynamic => write!(f, "Dynamic"),
            AllocationMethod::Static => write!(f, "Static"),
        }
    }
}

// =============================================================================
// Network
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SubnetParams {
    pub address_prefix: String,
}

impl SubnetParams {
    pub fn to_arm_body(&self) -> Value {
        json!({
            "properties": {
                "addressPrefix": self.address_prefix
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublicIpParams {
    pub location: String,
    pub allocation_method: AllocationMethod,
    pub dns_label: String,
}

impl PublicIpParams {
    pub fn to_arm_body(&self) -> Value {
        json!({
            "location": self.location,
            "properties": {
                "publicIPAllocationMethod": self.allocation_method.to_string(),
                "dnsSettings": {
                    "domainNameLabel": self.dns_label
                }
            }
        })
    }
}

/// IP configuration binding a subnet and a public IP to a NIC
#[derive(Debug, Clone, PartialEq)]
pub struct IpConfiguration<'a> {
    pub name: String,
    pub private_allocation_method: AllocationMethod,
    pub subnet: &'a SubnetHandle,
    pub public_ip: &'a PublicIpHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NicParams<'a> {
    pub location: String,
    pub ip_configurations: Vec<IpConfiguration<'a>>,
}

impl NicParams<'_> {
    pub fn to_arm_body(&self) -> Value {
        let configurations: Vec<Value> = self
            .ip_configurations
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "properties": {
                        "privateIPAllocationMethod": c.private_allocation_method.to_string(),
                        "subnet": { "id": c.subnet.id },
                        "publicIPAddress": { "id": c.public_ip.id }
                    }
                })
            })
            .collect();

        json!({
            "location": self.location,
            "properties": {
                "ipConfigurations": configurations
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VnetParams {
    pub location: String,
    pub address_prefixes: Vec<String>,
    pub dns_servers: Vec<String>,
}

impl VnetParams {
    /// Single `10.0.0.0/16` space, no custom DNS, subnets added later
    pub fn with_defaults(location: &str) -> Self {
        Self {
            location: location.to_string(),
            address_prefixes: vec!["10.0.0.0/16".to_string()],
            dns_servers: Vec::new(),
        }
    }

    pub fn to_arm_body(&self) -> Value {
        json!({
            "location": self.location,
            "properties": {
                "addressSpace": { "addressPrefixes": self.address_prefixes },
                "dhcpOptions": { "dnsServers": self.dns_servers },
                "subnets": []
            }
        })
    }
}

// =============================================================================
// Compute
// =============================================================================

/// One entry of the VM image catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageVersion {
    pub name: String,
    pub location: Option<String>,
    pub id: Option<String>,
}

impl ImageVersion {
    pub fn from_arm(value: &Value) -> AzureResult<Self> {
        let name = value
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or(AzureError::MissingField("name"))?
            .to_string();

        Ok(Self {
            name,
            location: value.get("location").and_then(|v| v.as_str()).map(String::from),
            id: value.get("id").and_then(|v| v.as_str()).map(String::from),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

#[derive(Clone, PartialEq)]
pub struct OsProfile {
    pub computer_name: String,
    pub admin_username: String,
    pub admin_password: String,
}

impl fmt::Debug for OsProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsProfile")
            .field("computer_name", &self.computer_name)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsDisk {
    pub name: String,
    pub caching: String,
    pub create_option: String,
    pub vhd_uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageProfile {
    pub image_reference: VmImageReference,
    pub os_disk: OsDisk,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkInterfaceReference {
    pub id: String,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootDiagnostics {
    pub enabled: bool,
    pub storage_uri: String,
}

/// Full create-or-update body of a virtual machine
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualMachineSpec {
    pub location: String,
    pub os_profile: OsProfile,
    pub vm_size: String,
    pub storage_profile: StorageProfile,
    pub network_interfaces: Vec<NetworkInterfaceReference>,
    pub boot_diagnostics: BootDiagnostics,
}

impl VirtualMachineSpec {
    pub fn to_arm_body(&self) -> Value {
        let image = &self.storage_profile.image_reference;
        let disk = &self.storage_profile.os_disk;
        let interfaces: Vec<Value> = self
            .network_interfaces
            .iter()
            .map(|nic| json!({ "id": nic.id, "properties": { "primary": nic.primary } }))
            .collect();

        json!({
            "location": self.location,
            "properties": {
                "osProfile": {
                    "computerName": self.os_profile.computer_name,
                    "adminUsername": self.os_profile.admin_username,
                    "adminPassword": self.os_profile.admin_password
                },
                "hardwareProfile": {
                    "vmSize": self.vm_size
                },
                "storageProfile": {
                    "imageReference": {
                        "publisher": image.publisher,
                        "offer": image.offer,
                        "sku": image.sku,
                        "version": image.version
                    },
                    "osDisk": {
                        "name": disk.name,
                        "caching": disk.caching,
                        "createOption": disk.create_option,
                        "vhd": { "uri": disk.vhd_uri }
                    }
                },
                "networkProfile": {
                    "networkInterfaces": interfaces
                },
                "diagnosticsProfile": {
                    "bootDiagnostics": {
                        "enabled": self.boot_diagnostics.enabled,
                        "storageUri": self.boot_diagnostics.storage_uri
                    }
                }
            }
        })
    }
}

/// Create-or-update body of a VM extension
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionSpec {
    pub location: String,
    pub publisher: String,
    pub extension_type: String,
    pub type_handler_version: String,
    pub auto_upgrade_minor_version: bool,
    pub settings: Map<String, Value>,
}

impl ExtensionSpec {
    pub fn to_arm_body(&self) -> Value {
        json!({
            "location": self.location,
            "properties": {
                "publisher": self.publisher,
                "type": self.extension_type,
                "typeHandlerVersion": self.type_handler_version,
                "autoUpgradeMinorVersion": self.auto_upgrade_minor_version,
                "settings": self.settings
            }
        })
    }
}

// =============================================================================
// Resource groups and storage
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StorageAccountParams {
    pub location: String,
    pub sku: String,
    pub kind: String,
}

impl StorageAccountParams {
    /// Locally redundant general purpose account
    pub fn with_defaults(location: &str) -> Self {
        Self {
            location: location.to_string(),
            sku: "Standard_LRS".to_string(),
            kind: "Storage".to_string(),
        }
    }

    pub fn to_arm_body(&self) -> Value {
        json!({
            "location": self.location,
            "sku": { "name": self.sku },
            "kind": self.kind
        })
    }
}
