//! Control-plane collaborators used by the provisioning pipeline

use crate::azure::models::{
    ExtensionHandle, ExtensionSpec, ImageVersion, NicHandle, NicParams, PublicIpHandle,
    PublicIpParams, SubnetHandle, SubnetParams, VirtualMachineSpec, VmHandle,
};
use crate::azure::{compute, network, AzureClient, AzureResult};
use async_trait::async_trait;

/// The six create-or-update/list operations the pipeline drives, plus the
/// session precondition checked before the first of them
#[async_trait]
pub trait ResourceClients: Send + Sync {
    /// Fails when no authenticated session can be established
    async fn verify_session(&self) -> AzureResult<()>;

    async fn create_subnet(
        &self,
        resource_group: &str,
        vnet_name: &str,
        subnet_name: &str,
        params: &SubnetParams,
    ) -> AzureResult<SubnetHandle>;

    async fn create_public_ip(
        &self,
        resource_group: &str,
        ip_name: &str,
        params: &PublicIpParams,
    ) -> AzureResult<PublicIpHandle>;

    async fn create_network_interface(
        &self,
        resource_group: &str,
        nic_name: &str,
        params: &NicParams<'_>,
    ) -> AzureResult<NicHandle>;

    async fn list_vm_images(
        &self,
        location: &str,
        publisher: &str,
        offer: &str,
        sku: &str,
        top: u32,
    ) -> AzureResult<Vec<ImageVersion>>;

    async fn create_virtual_machine(
        &self,
        resource_group: &str,
        vm_name: &str,
        spec: &VirtualMachineSpec,
    ) -> AzureResult<VmHandle>;

    async fn create_vm_extension(
        &self,
        resource_group: &str,
        vm_name: &str,
        extension_name: &str,
        spec: &ExtensionSpec,
    ) -> AzureResult<ExtensionHandle>;
}

#[async_trait]
impl ResourceClients for AzureClient {
    async fn verify_session(&self) -> AzureResult<()> {
        AzureClient::verify_session(self).await
    }

    async fn create_subnet(
        &self,
        resource_group: &str,
        vnet_name: &str,
        subnet_name: &str,
        params: &SubnetParams,
    ) -> AzureResult<SubnetHandle> {
        network::create_subnet(self, resource_group, vnet_name, subnet_name, params).await
    }

    async fn create_public_ip(
        &self,
        resource_group: &str,
        ip_name: &str,
        params: &PublicIpParams,
    ) -> AzureResult<PublicIpHandle> {
        network::create_public_ip(self, resource_group, ip_name, params).await
    }

    async fn create_network_interface(
        &self,
        resource_group: &str,
        nic_name: &str,
        params: &NicParams<'_>,
    ) -> AzureResult<NicHandle> {
        network::create_network_interface(self, resource_group, nic_name, params).await
    }

    async fn list_vm_images(
        &self,
        location: &str,
        publisher: &str,
        offer: &str,
        sku: &str,
        top: u32,
    ) -> AzureResult<Vec<ImageVersion>> {
        compute::list_vm_images(self, location, publisher, offer, sku, top).await
    }

    async fn create_virtual_machine(
        &self,
        resource_group: &str,
        vm_name: &str,
        spec: &VirtualMachineSpec,
    ) -> AzureResult<VmHandle> {
        compute::create_virtual_machine(self, resource_group, vm_name, spec).await
    }

    async fn create_vm_extension(
        &self,
        resource_group: &str,
        vm_name: &str,
        extension_name: &str,
        spec: &ExtensionSpec,
    ) -> AzureResult<ExtensionHandle> {
        compute::create_vm_extension(self, resource_group, vm_name, extension_name, spec).await
    }
}
