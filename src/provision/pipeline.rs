//! Provisioning pipeline
//!
//! Creates a subnet, a public IP, a NIC, resolves the image version, then
//! creates the VM and installs its custom script extension. Steps run
//! strictly in order because each consumes handles produced before it.
//! The first failure ends the run; resources created by earlier steps are
//! left in place.

use super::clients::ResourceClients;
use super::error::ProvisionError;
use super::naming::{self, ResourceNames};
use super::request::ProvisioningRequest;
use crate::azure::models::{
    AllocationMethod, BootDiagnostics, ExtensionHandle, ExtensionSpec, IpConfiguration,
    NetworkInterfaceReference, NicHandle, NicParams, OsDisk, OsProfile, PublicIpHandle,
    PublicIpParams, StorageProfile, SubnetHandle, SubnetParams, VirtualMachineSpec, VmHandle,
    VmImageReference,
};
use crate::azure::AzureResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Instant;
use tracing::Instrument;

pub const DEFAULT_IMAGE_PUBLISHER: &str = "Canonical";
pub const DEFAULT_IMAGE_OFFER: &str = "UbuntuServer";
pub const DEFAULT_IMAGE_SKU: &str = "16.04.0-LTS";

pub const EXTENSION_PUBLISHER: &str = "Microsoft.OSTCExtensions";
pub const EXTENSION_TYPE: &str = "CustomScriptForLinux";
pub const EXTENSION_HANDLER_VERSION: &str = "1.4";

/// One remote operation of the pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    CreateSubnet,
    CreatePublicIp,
    CreateNic,
    ResolveVmImage,
    CreateVirtualMachine,
    InstallExtension,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::CreateSubnet,
        Step::CreatePublicIp,
        Step::CreateNic,
        Step::ResolveVmImage,
        Step::CreateVirtualMachine,
        Step::InstallExtension,
    ];

    /// 1-based position in the pipeline
    pub fn index(self) -> usize {
        match self {
            Step::CreateSubnet => 1,
            Step::CreatePublicIp => 2,
            Step::CreateNic => 3,
            Step::ResolveVmImage => 4,
            Step::CreateVirtualMachine => 5,
            Step::InstallExtension => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Step::CreateSubnet => "create-subnet",
            Step::CreatePublicIp => "create-public-ip",
            Step::CreateNic => "create-nic",
            Step::ResolveVmImage => "resolve-vm-image",
            Step::CreateVirtualMachine => "create-virtual-machine",
            Step::InstallExtension => "install-extension",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.index(), self.name())
    }
}

/// Image looked up in the catalog; the version comes from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSpec {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            publisher: DEFAULT_IMAGE_PUBLISHER.to_string(),
            offer: DEFAULT_IMAGE_OFFER.to_string(),
            sku: DEFAULT_IMAGE_SKU.to_string(),
        }
    }
}

/// Everything a successful run created
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provisioned {
    pub names: ResourceNames,
    pub subnet: SubnetHandle,
    pub public_ip: PublicIpHandle,
    pub nic: NicHandle,
    pub image: VmImageReference,
    pub vm: VmHandle,
    pub extension: ExtensionHandle,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub type PipelineOutcome = Result<Provisioned, ProvisionError>;

/// Runs provisioning requests against a set of control-plane clients
///
/// Holds no per-run state, so one pipeline can serve concurrent runs.
pub struct ProvisioningPipeline<'a, C: ?Sized> {
    clients: &'a C,
    image: ImageSpec,
}

impl<'a, C> ProvisioningPipeline<'a, C>
where
    C: ResourceClients + ?Sized,
{
    pub fn new(clients: &'a C) -> Self {
        Self {
            clients,
            image: ImageSpec::default(),
        }
    }

    /// Look up another publisher/offer/sku
    pub fn with_image(mut self, image: ImageSpec) -> Self {
        self.image = image;
        self
    }

    /// Provision the VM described by `request`
    ///
    /// Validation and the session check happen before any resource call.
    pub async fn execute(&self, request: &ProvisioningRequest) -> PipelineOutcome {
        request.validate()?;

        self.clients.verify_session().await.map_err(|err| {
            tracing::error!("Session check failed: {}", err);
            ProvisionError::Authentication(err)
        })?;

        let names = naming::derive(&request.domain_prefix, request.number.as_str());
        let span = tracing::info_span!(
            "provision",
            vm = %names.vm_name,
            resource_group = %request.resource_group
        );

        self.run(request, names).instrument(span).await
    }

    async fn run(&self, request: &ProvisioningRequest, names: ResourceNames) -> PipelineOutcome {
        let started_at = Utc::now();
        let resource_group = request.resource_group.as_str();

        let subnet = run_step(
            Step::CreateSubnet,
            self.clients.create_subnet(
                resource_group,
                &request.vnet,
                &names.subnet_name,
                &SubnetParams {
                    address_prefix: names.address_prefix.clone(),
                },
            ),
        )
        .await?;

        let public_ip = run_step(
            Step::CreatePublicIp,
            self.clients.create_public_ip(
                resource_group,
                &names.pip_name,
                &public_ip_params(request, &names),
            ),
        )
        .await?;

        let nic = {
            let nic_params = NicParams {
                location: request.location.clone(),
                ip_configurations: vec![IpConfiguration {
                    name: names.pip_name.clone(),
                    private_allocation_method: AllocationMethod::Dynamic,
                    subnet: &subnet,
                    public_ip: &public_ip,
                }],
            };
            run_step(
                Step::CreateNic,
                self.clients
                    .create_network_interface(resource_group, &names.nic_name, &nic_params),
            )
            .await?
        };

        let image = self.resolve_image(&request.location).await?;

        let vm = run_step(
            Step::CreateVirtualMachine,
            self.clients.create_virtual_machine(
                resource_group,
                &names.vm_name,
                &vm_spec(request, &names, &nic, &image),
            ),
        )
        .await?;

        let extension = run_step(
            Step::InstallExtension,
            self.clients.create_vm_extension(
                resource_group,
                &names.vm_name,
                &request.vm.extension.name,
                &extension_spec(request),
            ),
        )
        .await?;

        tracing::info!("Provisioned {} ({})", vm.name, vm.id);

        Ok(Provisioned {
            names,
            subnet,
            public_ip,
            nic,
            image,
            vm,
            extension,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Pick the first catalog entry as the image version
    async fn resolve_image(&self, location: &str) -> Result<VmImageReference, ProvisionError> {
        let versions = run_step(
            Step::ResolveVmImage,
            self.clients.list_vm_images(
                location,
                &self.image.publisher,
                &self.image.offer,
                &self.image.sku,
                1,
            ),
        )
        .await?;

        let Some(first) = versions.into_iter().next() else {
            tracing::error!(
                "No image versions for {}/{}/{} in {}",
                self.image.publisher,
                self.image.offer,
                self.image.sku,
                location
            );
            return Err(ProvisionError::ImageNotFound {
                location: location.to_string(),
                publisher: self.image.publisher.clone(),
                offer: self.image.offer.clone(),
                sku: self.image.sku.clone(),
            });
        };

        Ok(VmImageReference {
            publisher: self.image.publisher.clone(),
            offer: self.image.offer.clone(),
            sku: self.image.sku.clone(),
            version: first.name,
        })
    }
}

/// Await one collaborator call, tagging its failure with the step
async fn run_step<T, F>(step: Step, operation: F) -> Result<T, ProvisionError>
where
    F: Future<Output = AzureResult<T>>,
{
    tracing::info!(step = step.index(), "Starting {}", step.name());
    let started = Instant::now();

    match operation.await {
        Ok(value) => {
            tracing::info!(
                step = step.index(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Completed {}",
                step.name()
            );
            Ok(value)
        }
        Err(source) => {
            tracing::error!(step = step.index(), "{} failed: {}", step.name(), source);
            Err(ProvisionError::ResourceCreation { step, source })
        }
    }
}

fn public_ip_params(request: &ProvisioningRequest, names: &ResourceNames) -> PublicIpParams {
    let overrides = request.public_ip.clone().unwrap_or_default();
    PublicIpParams {
        location: request.location.clone(),
        allocation_method: overrides.allocation_method,
        dns_label: overrides
            .dns_label
            .unwrap_or_else(|| names.domain_name.clone()),
    }
}

fn vm_spec(
    request: &ProvisioningRequest,
    names: &ResourceNames,
    nic: &NicHandle,
    image: &VmImageReference,
) -> VirtualMachineSpec {
    VirtualMachineSpec {
        location: request.location.clone(),
        os_profile: OsProfile {
            computer_name: names.vm_name.clone(),
            admin_username: request.vm.username.clone(),
            admin_password: request.vm.password.clone(),
        },
        vm_size: request.vm.size.clone(),
        storage_profile: StorageProfile {
            image_reference: image.clone(),
            os_disk: OsDisk {
                name: names.os_disk_name.clone(),
                caching: "None".to_string(),
                create_option: "FromImage".to_string(),
                vhd_uri: naming::vhd_uri(&request.storage_account, &names.os_disk_name),
            },
        },
        network_interfaces: vec![NetworkInterfaceReference {
            id: nic.id.clone(),
            primary: true,
        }],
        boot_diagnostics: BootDiagnostics {
            enabled: true,
            storage_uri: naming::boot_diagnostics_uri(&request.storage_account),
        },
    }
}

fn extension_spec(request: &ProvisioningRequest) -> ExtensionSpec {
    ExtensionSpec {
        location: request.location.clone(),
        publisher: EXTENSION_PUBLISHER.to_string(),
        extension_type: EXTENSION_TYPE.to_string(),
        type_handler_version: EXTENSION_HANDLER_VERSION.to_string(),
        auto_upgrade_minor_version: true,
        settings: request.vm.extension.settings.clone().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::models::{ImageVersion, ResourceHandle};
    use crate::azure::AzureError;
    use crate::provision::request::{ExtensionSettings, PublicIpSettings, VmSettings};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    const VM_ID: &str =
        "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Compute/virtualMachines/machine-05";

    /// One collaborator invocation as seen by the fake
    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Subnet {
            resource_group: String,
            vnet: String,
            name: String,
            params: SubnetParams,
        },
        PublicIp {
            resource_group: String,
            name: String,
            params: PublicIpParams,
        },
        Nic {
            resource_group: String,
            name: String,
            location: String,
            configurations: Vec<(String, SubnetHandle, PublicIpHandle)>,
        },
        Images {
            location: String,
            publisher: String,
            offer: String,
            sku: String,
            top: u32,
        },
        Vm {
            resource_group: String,
            name: String,
            spec: VirtualMachineSpec,
        },
        Extension {
            resource_group: String,
            vm_name: String,
            name: String,
            spec: ExtensionSpec,
        },
    }

    impl Call {
        fn step(&self) -> Step {
            match self {
                Call::Subnet { .. } => Step::CreateSubnet,
                Call::PublicIp { .. } => Step::CreatePublicIp,
                Call::Nic { .. } => Step::CreateNic,
                Call::Images { .. } => Step::ResolveVmImage,
                Call::Vm { .. } => Step::CreateVirtualMachine,
                Call::Extension { .. } => Step::InstallExtension,
            }
        }
    }

    /// In-memory control plane recording every call
    struct RecordingClients {
        calls: Mutex<Vec<Call>>,
        session_checks: AtomicUsize,
        session_valid: bool,
        fail_at: Option<Step>,
        images: Vec<ImageVersion>,
    }

    impl RecordingClients {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                session_checks: AtomicUsize::new(0),
                session_valid: true,
                fail_at: None,
                images: vec![image("16.04.202109280")],
            }
        }

        fn failing_at(step: Step) -> Self {
            Self {
                fail_at: Some(step),
                ..Self::new()
            }
        }

        fn with_images(images: Vec<ImageVersion>) -> Self {
            Self {
                images,
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn steps(&self) -> Vec<Step> {
            self.calls().iter().map(Call::step).collect()
        }

        fn record(&self, call: Call) -> AzureResult<()> {
            let step = call.step();
            self.calls.lock().unwrap().push(call);
            if self.fail_at == Some(step) {
                return Err(AzureError::Api {
                    status: 409,
                    code: "Conflict".to_string(),
                    message: format!("{} rejected", step.name()),
                });
            }
            Ok(())
        }

        fn handle<K: crate::azure::models::ResourceKind>(
            resource_group: &str,
            path: &str,
            name: &str,
        ) -> ResourceHandle<K> {
            ResourceHandle::new(
                &format!(
                    "/subscriptions/sub/resourceGroups/{}/providers/{}/{}",
                    resource_group, path, name
                ),
                name,
                json!({"properties": {"provisioningState": "Succeeded"}}),
            )
        }
    }

    #[async_trait]
    impl ResourceClients for RecordingClients {
        async fn verify_session(&self) -> AzureResult<()> {
            self.session_checks.fetch_add(1, Ordering::SeqCst);
            if self.session_valid {
                Ok(())
            } else {
                Err(AzureError::Auth("token request rejected: invalid_client".to_string()))
            }
        }

        async fn create_subnet(
            &self,
            resource_group: &str,
            vnet_name: &str,
            subnet_name: &str,
            params: &SubnetParams,
        ) -> AzureResult<SubnetHandle> {
            self.record(Call::Subnet {
                resource_group: resource_group.to_string(),
                vnet: vnet_name.to_string(),
                name: subnet_name.to_string(),
                params: params.clone(),
            })?;
            Ok(Self::handle(
                resource_group,
                &format!("Microsoft.Network/virtualNetworks/{}/subnets", vnet_name),
                subnet_name,
            ))
        }

        async fn create_public_ip(
            &self,
            resource_group: &str,
            ip_name: &str,
            params: &PublicIpParams,
        ) -> AzureResult<PublicIpHandle> {
            self.record(Call::PublicIp {
                resource_group: resource_group.to_string(),
                name: ip_name.to_string(),
                params: params.clone(),
            })?;
            Ok(Self::handle(
                resource_group,
                "Microsoft.Network/publicIPAddresses",
                ip_name,
            ))
        }

        async fn create_network_interface(
            &self,
            resource_group: &str,
            nic_name: &str,
            params: &NicParams<'_>,
        ) -> AzureResult<NicHandle> {
            self.record(Call::Nic {
                resource_group: resource_group.to_string(),
                name: nic_name.to_string(),
                location: params.location.clone(),
                configurations: params
                    .ip_configurations
                    .iter()
                    .map(|c| (c.name.clone(), c.subnet.clone(), c.public_ip.clone()))
                    .collect(),
            })?;
            Ok(Self::handle(
                resource_group,
                "Microsoft.Network/networkInterfaces",
                nic_name,
            ))
        }

        async fn list_vm_images(
            &self,
            location: &str,
            publisher: &str,
            offer: &str,
            sku: &str,
            top: u32,
        ) -> AzureResult<Vec<ImageVersion>> {
            self.record(Call::Images {
                location: location.to_string(),
                publisher: publisher.to_string(),
                offer: offer.to_string(),
                sku: sku.to_string(),
                top,
            })?;
            Ok(self.images.clone())
        }

        async fn create_virtual_machine(
            &self,
            resource_group: &str,
            vm_name: &str,
            spec: &VirtualMachineSpec,
        ) -> AzureResult<VmHandle> {
            self.record(Call::Vm {
                resource_group: resource_group.to_string(),
                name: vm_name.to_string(),
                spec: spec.clone(),
            })?;
            Ok(Self::handle(
                resource_group,
                "Microsoft.Compute/virtualMachines",
                vm_name,
            ))
        }

        async fn create_vm_extension(
            &self,
            resource_group: &str,
            vm_name: &str,
            extension_name: &str,
            spec: &ExtensionSpec,
        ) -> AzureResult<ExtensionHandle> {
            self.record(Call::Extension {
                resource_group: resource_group.to_string(),
                vm_name: vm_name.to_string(),
                name: extension_name.to_string(),
                spec: spec.clone(),
            })?;
            Ok(Self::handle(
                resource_group,
                &format!("Microsoft.Compute/virtualMachines/{}/extensions", vm_name),
                extension_name,
            ))
        }
    }

    fn image(version: &str) -> ImageVersion {
        ImageVersion {
            name: version.to_string(),
            location: Some("westeurope".to_string()),
            id: None,
        }
    }

    fn settings() -> serde_json::Map<String, Value> {
        match json!({
            "fileUris": ["http://x/file.sh"],
            "commandToExecute": "sh file.sh"
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn request(number: &str) -> ProvisioningRequest {
        ProvisioningRequest {
            resource_group: "rg1".to_string(),
            location: "westeurope".to_string(),
            storage_account: "sa1".to_string(),
            domain_prefix: "vm".to_string(),
            number: number.into(),
            vnet: "vnet1".to_string(),
            vm: VmSettings {
                username: "admin".to_string(),
                password: "p".to_string(),
                size: "Standard_GS5".to_string(),
                extension: ExtensionSettings {
                    name: "ext1".to_string(),
                    settings: Some(settings()),
                },
            },
            public_ip: None,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let clients = RecordingClients::new();
        let pipeline = ProvisioningPipeline::new(&clients);

        let outcome = assert_ok!(pipeline.execute(&request("05")).await);

        assert_eq!(clients.steps(), Step::ALL.to_vec());
        assert_eq!(outcome.vm.id, VM_ID);
        assert_eq!(outcome.image.version, "16.04.202109280");

        let calls = clients.calls();
        match &calls[0] {
            Call::Subnet { resource_group, vnet, name, params } => {
                assert_eq!(resource_group, "rg1");
                assert_eq!(vnet, "vnet1");
                assert_eq!(name, "subnet-05");
                assert_eq!(params.address_prefix, "10.0.5.0/24");
            }
            other => panic!("unexpected first call {other:?}"),
        }
        match &calls[1] {
            Call::PublicIp { name, params, .. } => {
                assert_eq!(name, "ip-05");
                assert_eq!(params.dns_label, "vm-05");
                assert_eq!(params.location, "westeurope");
                assert_eq!(params.allocation_method, AllocationMethod::Dynamic);
            }
            other => panic!("unexpected second call {other:?}"),
        }
        match &calls[2] {
            Call::Nic { name, location, configurations, .. } => {
                assert_eq!(name, "nic-05");
                assert_eq!(location, "westeurope");
                assert_eq!(configurations.len(), 1);
                assert_eq!(configurations[0].0, "ip-05");
            }
            other => panic!("unexpected third call {other:?}"),
        }
        match &calls[3] {
            Call::Images { location, publisher, offer, sku, top } => {
                assert_eq!(location, "westeurope");
                assert_eq!(publisher, "Canonical");
                assert_eq!(offer, "UbuntuServer");
                assert_eq!(sku, "16.04.0-LTS");
                assert_eq!(*top, 1);
            }
            other => panic!("unexpected fourth call {other:?}"),
        }
        match &calls[4] {
            Call::Vm { resource_group, name, spec } => {
                assert_eq!(resource_group, "rg1");
                assert_eq!(name, "machine-05");
                assert_eq!(spec.os_profile.computer_name, "machine-05");
                assert_eq!(spec.os_profile.admin_username, "admin");
                assert_eq!(spec.os_profile.admin_password, "p");
                assert_eq!(spec.vm_size, "Standard_GS5");
                assert_eq!(spec.storage_profile.os_disk.name, "machine-disk-05");
                assert_eq!(
                    spec.storage_profile.os_disk.vhd_uri,
                    "https://sa1.blob.core.windows.net/vhds/machine-disk-05.vhd"
                );
                assert_eq!(spec.storage_profile.image_reference.version, "16.04.202109280");
                assert_eq!(spec.network_interfaces.len(), 1);
                assert_eq!(spec.network_interfaces[0].id, outcome.nic.id);
                assert!(spec.network_interfaces[0].primary);
                assert!(spec.boot_diagnostics.enabled);
                assert_eq!(
                    spec.boot_diagnostics.storage_uri,
                    "https://sa1.blob.core.windows.net/"
                );
            }
            other => panic!("unexpected fifth call {other:?}"),
        }
        match &calls[5] {
            Call::Extension { vm_name, name, .. } => {
                assert_eq!(vm_name, "machine-05");
                assert_eq!(name, "ext1");
            }
            other => panic!("unexpected sixth call {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nic_failure_stops_the_run() {
        let clients = RecordingClients::failing_at(Step::CreateNic);
        let pipeline = ProvisioningPipeline::new(&clients);

        let err = assert_err!(pipeline.execute(&request("05")).await);

        assert_eq!(
            clients.steps(),
            vec![Step::CreateSubnet, Step::CreatePublicIp, Step::CreateNic]
        );
        assert_eq!(err.step(), Some(Step::CreateNic));
        match err {
            ProvisionError::ResourceCreation { step, source } => {
                assert_eq!(step, Step::CreateNic);
                assert_eq!(source.code(), Some("Conflict"));
            }
            other => panic!("expected resource creation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_every_step_failure_is_tagged() {
        for failing in Step::ALL {
            let clients = RecordingClients::failing_at(failing);
            let pipeline = ProvisioningPipeline::new(&clients);

            let err = assert_err!(pipeline.execute(&request("05")).await);

            assert_eq!(err.step(), Some(failing));
            assert_eq!(clients.steps().last(), Some(&failing));
            assert_eq!(clients.steps().len(), failing.index());
            assert!(err.to_string().starts_with(&failing.to_string()));
        }
    }

    #[tokio::test]
    async fn test_nic_receives_handles_from_previous_steps() {
        let clients = RecordingClients::new();
        let pipeline = ProvisioningPipeline::new(&clients);

        let outcome = assert_ok!(pipeline.execute(&request("05")).await);

        let configurations = clients
            .calls()
            .into_iter()
            .find_map(|call| match call {
                Call::Nic { configurations, .. } => Some(configurations),
                _ => None,
            })
            .unwrap();
        let (_, subnet, public_ip) = &configurations[0];
        assert_eq!(subnet, &outcome.subnet);
        assert_eq!(public_ip, &outcome.public_ip);
    }

    #[tokio::test]
    async fn test_empty_catalog_is_image_not_found() {
        let clients = RecordingClients::with_images(Vec::new());
        let pipeline = ProvisioningPipeline::new(&clients);

        let err = assert_err!(pipeline.execute(&request("05")).await);

        assert!(matches!(err, ProvisionError::ImageNotFound { .. }));
        assert!(err.azure_error().is_none());
        assert_eq!(err.step(), Some(Step::ResolveVmImage));
        assert_eq!(clients.steps().len(), 4);
    }

    #[tokio::test]
    async fn test_catalog_failure_is_resource_error() {
        let clients = RecordingClients::failing_at(Step::ResolveVmImage);
        let pipeline = ProvisioningPipeline::new(&clients);

        let err = assert_err!(pipeline.execute(&request("05")).await);

        assert!(matches!(
            err,
            ProvisionError::ResourceCreation {
                step: Step::ResolveVmImage,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_image_version_comes_from_first_entry() {
        let clients = RecordingClients::with_images(vec![
            image("16.04.202109280"),
            image("16.04.201901220"),
        ]);
        let pipeline = ProvisioningPipeline::new(&clients);

        let outcome = assert_ok!(pipeline.execute(&request("05")).await);
        assert_eq!(outcome.image.version, "16.04.202109280");
    }

    #[tokio::test]
    async fn test_custom_image_spec() {
        let clients = RecordingClients::new();
        let pipeline = ProvisioningPipeline::new(&clients).with_image(ImageSpec {
            publisher: "Debian".to_string(),
            offer: "debian-12".to_string(),
            sku: "12".to_string(),
        });

        let outcome = assert_ok!(pipeline.execute(&request("05")).await);
        assert_eq!(outcome.image.publisher, "Debian");
        assert!(clients.calls().iter().any(|c| matches!(
            c,
            Call::Images { offer, .. } if offer == "debian-12"
        )));
    }

    #[tokio::test]
    async fn test_invalid_request_issues_no_calls() {
        let clients = RecordingClients::new();
        let pipeline = ProvisioningPipeline::new(&clients);
        let mut incomplete = request("05");
        incomplete.vm.extension.settings = None;
        incomplete.storage_account.clear();

        let err = assert_err!(pipeline.execute(&incomplete).await);

        match err {
            ProvisionError::Validation { missing } => {
                assert_eq!(missing, vec!["storageAccount", "vm.extension.settings"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(clients.session_checks.load(Ordering::SeqCst), 0);
        assert!(clients.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_session_refuses_to_start() {
        let clients = RecordingClients {
            session_valid: false,
            ..RecordingClients::new()
        };
        let pipeline = ProvisioningPipeline::new(&clients);

        let err = assert_err!(pipeline.execute(&request("05")).await);

        assert!(matches!(err, ProvisionError::Authentication(_)));
        assert_eq!(err.step(), None);
        assert!(clients.calls().is_empty());
    }

    #[tokio::test]
    async fn test_public_ip_override() {
        let clients = RecordingClients::new();
        let pipeline = ProvisioningPipeline::new(&clients);
        let mut custom = request("05");
        custom.public_ip = Some(PublicIpSettings {
            allocation_method: AllocationMethod::Static,
            dns_label: Some("frontend".to_string()),
        });

        assert_ok!(pipeline.execute(&custom).await);

        let params = clients
            .calls()
            .into_iter()
            .find_map(|call| match call {
                Call::PublicIp { params, .. } => Some(params),
                _ => None,
            })
            .unwrap();
        assert_eq!(params.allocation_method, AllocationMethod::Static);
        assert_eq!(params.dns_label, "frontend");
    }

    #[tokio::test]
    async fn test_extension_settings_pass_through() {
        let clients = RecordingClients::new();
        let pipeline = ProvisioningPipeline::new(&clients);

        assert_ok!(pipeline.execute(&request("05")).await);

        let spec = clients
            .calls()
            .into_iter()
            .find_map(|call| match call {
                Call::Extension { spec, .. } => Some(spec),
                _ => None,
            })
            .unwrap();
        assert_eq!(spec.publisher, "Microsoft.OSTCExtensions");
        assert_eq!(spec.extension_type, "CustomScriptForLinux");
        assert_eq!(spec.type_handler_version, "1.4");
        assert!(spec.auto_upgrade_minor_version);
        assert_eq!(spec.location, "westeurope");
        assert_eq!(spec.settings, settings());
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let clients = RecordingClients::new();
        let pipeline = ProvisioningPipeline::new(&clients);
        let requests = [request("01"), request("02"), request("03")];

        let outcomes =
            futures::future::join_all(requests.iter().map(|r| pipeline.execute(r))).await;

        let vm_names: Vec<String> = outcomes
            .into_iter()
            .map(|o| o.map(|p| p.vm.name))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(vm_names, vec!["machine-01", "machine-02", "machine-03"]);
        assert_eq!(clients.calls().len(), 18);
    }

    #[test]
    fn test_step_display() {
        assert_eq!(Step::CreateNic.to_string(), "step 3 (create-nic)");
        assert_eq!(
            Step::ALL.iter().map(|s| s.index()).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5, 6]
        );
    }
}
