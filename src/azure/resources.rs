//! Resource groups and storage accounts

use super::client::{segment, AzureClient};
use super::error::AzureResult;
use super::models::{ResourceGroupHandle, ResourceHandle, StorageAccountHandle, StorageAccountParams};
use serde_json::json;

/// Create or update a resource group
pub async fn create_resource_group(
    client: &AzureClient,
    resource_group: &str,
    location: &str,
) -> AzureResult<ResourceGroupHandle> {
    let url = client.resource_group_url(resource_group);
    let response = client.put(&url, &json!({ "location": location })).await?;
    ResourceHandle::from_arm(response)
}

/// Create a storage account
/// Defaults to a `Standard_LRS` general purpose account
pub async fn create_storage_account(
    client: &AzureClient,
    resource_group: &str,
    account_name: &str,
    location: &str,
    params: Option<StorageAccountParams>,
) -> AzureResult<StorageAccountHandle> {
    let params = params.unwrap_or_else(|| StorageAccountParams::with_defaults(location));
    let url = client.storage_url(
        resource_group,
        &format!("storageAccounts/{}", segment(&account_name.to_lowercase())),
    );

    let response = client.put(&url, &params.to_arm_body()).await?;
    ResourceHandle::from_arm(response)
}
