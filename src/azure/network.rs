//! Azure Networking
//!
//! Virtual networks, subnets, public IP addresses and network interfaces.

use super::client::{segment, AzureClient};
use super::error::AzureResult;
use super::models::{
    NicHandle, NicParams, PublicIpHandle, PublicIpParams, ResourceHandle, SubnetHandle,
    SubnetParams, VnetHandle, VnetParams,
};

/// Create or update a virtual network
/// Uses a `10.0.0.0/16` address space when no parameters are given
pub async fn create_vnet(
    client: &AzureClient,
    resource_group: &str,
    vnet_name: &str,
    location: &str,
    params: Option<VnetParams>,
) -> AzureResult<VnetHandle> {
    let params = params.unwrap_or_else(|| VnetParams::with_defaults(location));
    let url = client.network_url(
        resource_group,
        &format!("virtualNetworks/{}", segment(vnet_name)),
    );

    let response = client.put(&url, &params.to_arm_body()).await?;
    ResourceHandle::from_arm(response)
}

/// Create or update a subnet inside an existing virtual network
pub async fn create_subnet(
    client: &AzureClient,
    resource_group: &str,
    vnet_name: &str,
    subnet_name: &str,
    params: &SubnetParams,
) -> AzureResult<SubnetHandle> {
    let url = client.network_url(
        resource_group,
        &format!(
            "virtualNetworks/{}/subnets/{}",
            segment(vnet_name),
            segment(subnet_name)
        ),
    );

    let response = client.put(&url, &params.to_arm_body()).await?;
    ResourceHandle::from_arm(response)
}

/// Create or update a public IP address
pub async fn create_public_ip(
    client: &AzureClient,
    resource_group: &str,
    ip_name: &str,
    params: &PublicIpParams,
) -> AzureResult<PublicIpHandle> {
    let url = client.network_url(
        resource_group,
        &format!("publicIPAddresses/{}", segment(ip_name)),
    );

    let response = client.put(&url, &params.to_arm_body()).await?;
    ResourceHandle::from_arm(response)
}

/// Create or update a network interface
pub async fn create_network_interface(
    client: &AzureClient,
    resource_group: &str,
    nic_name: &str,
    params: &NicParams<'_>,
) -> AzureResult<NicHandle> {
    let url = client.network_url(
        resource_group,
        &format!("networkInterfaces/{}", segment(nic_name)),
    );

    let response = client.put(&url, &params.to_arm_body()).await?;
    ResourceHandle::from_arm(response)
}
