//! Azure Compute
//!
//! Image catalog, virtual machines and VM extensions.

use super::client::{segment, AzureClient, COMPUTE_API_VERSION};
use super::error::{AzureError, AzureResult};
use super::models::{
    ExtensionHandle, ExtensionSpec, ImageVersion, ResourceHandle, VirtualMachineSpec, VmHandle,
};
use url::Url;

/// List image versions for a publisher/offer/sku, provider ordered
pub async fn list_vm_images(
    client: &AzureClient,
    location: &str,
    publisher: &str,
    offer: &str,
    sku: &str,
    top: u32,
) -> AzureResult<Vec<ImageVersion>> {
    let base = client.compute_location_url(
        location,
        &format!(
            "publishers/{}/artifacttypes/vmimage/offers/{}/skus/{}/versions",
            segment(publisher),
            segment(offer),
            segment(sku)
        ),
    );
    let top = top.to_string();
    let url = Url::parse_with_params(
        &base,
        &[("api-version", COMPUTE_API_VERSION), ("$top", top.as_str())],
    )?;

    let response = client.get(url.as_str()).await?;
    let entries = response
        .as_array()
        .ok_or(AzureError::MissingField("versions"))?;

    entries.iter().map(ImageVersion::from_arm).collect()
}

/// Create or update a virtual machine
pub async fn create_virtual_machine(
    client: &AzureClient,
    resource_group: &str,
    vm_name: &str,
    spec: &VirtualMachineSpec,
) -> AzureResult<VmHandle> {
    let url = client.compute_url(resource_group, &vm_path(vm_name));
    let response = client.put(&url, &spec.to_arm_body()).await?;
    ResourceHandle::from_arm(response)
}

/// Create or update an extension on a virtual machine
pub async fn create_vm_extension(
    client: &AzureClient,
    resource_group: &str,
    vm_name: &str,
    extension_name: &str,
    spec: &ExtensionSpec,
) -> AzureResult<ExtensionHandle> {
    let url = client.compute_url(
        resource_group,
        &format!("{}/extensions/{}", vm_path(vm_name), segment(extension_name)),
    );
    let response = client.put(&url, &spec.to_arm_body()).await?;
    ResourceHandle::from_arm(response)
}

/// Get a virtual machine including its instance view
pub async fn get_vm(client: &AzureClient, resource_group: &str, vm_name: &str) -> AzureResult<VmHandle> {
    let url = format!(
        "{}&$expand=instanceView",
        client.compute_url(resource_group, &vm_path(vm_name))
    );
    ResourceHandle::from_arm(client.get(&url).await?)
}

/// List all virtual machines of a resource group (auto-paginate)
pub async fn list_vms(client: &AzureClient, resource_group: &str) -> AzureResult<Vec<VmHandle>> {
    let mut all_items = Vec::new();
    let mut next_url = Some(client.compute_url(resource_group, "virtualMachines"));

    while let Some(url) = next_url {
        let response = client.get(&url).await?;

        if let Some(items) = response.get("value").and_then(|v| v.as_array()) {
            for item in items {
                all_items.push(ResourceHandle::from_arm(item.clone())?);
            }
        }

        next_url = response
            .get("nextLink")
            .and_then(|v| v.as_str())
            .map(String::from);
    }

    Ok(all_items)
}

/// Start a virtual machine
pub async fn start_vm(client: &AzureClient, resource_group: &str, vm_name: &str) -> AzureResult<()> {
    tracing::info!("Starting VM {}/{}", resource_group, vm_name);
    let url = client.compute_url(resource_group, &format!("{}/start", vm_path(vm_name)));
    client.post_action(&url).await
}

/// Stop and deallocate a virtual machine (compute is no longer billed)
pub async fn stop_vm(client: &AzureClient, resource_group: &str, vm_name: &str) -> AzureResult<()> {
    tracing::info!("Deallocating VM {}/{}", resource_group, vm_name);
    let url = client.compute_url(resource_group, &format!("{}/deallocate", vm_path(vm_name)));
    client.post_action(&url).await
}

/// Power state from the instance view, e.g. `running` or `deallocated`
pub fn power_state(vm: &VmHandle) -> Option<&str> {
    vm.provider
        .get("properties")?
        .get("instanceView")?
        .get("statuses")?
        .as_array()?
        .iter()
        .filter_map(|s| s.get("code").and_then(|v| v.as_str()))
        .find_map(|code| code.strip_prefix("PowerState/"))
}

fn vm_path(vm_name: &str) -> String {
    format!("virtualMachines/{}", segment(vm_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_power_state_from_instance_view() {
        let vm = VmHandle::new(
            "/vms/machine-05",
            "machine-05",
            json!({
                "properties": {
                    "instanceView": {
                        "statuses": [
                            {"code": "ProvisioningState/succeeded"},
                            {"code": "PowerState/deallocated"}
                        ]
                    }
                }
            }),
        );
        assert_eq!(power_state(&vm), Some("deallocated"));
    }

    #[test]
    fn test_power_state_missing_instance_view() {
        let vm = VmHandle::new("/vms/machine-05", "machine-05", json!({"properties": {}}));
        assert_eq!(power_state(&vm), None);
    }
}
