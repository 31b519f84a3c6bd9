// ── Router lifecycle driver ──
//
// The orchestration layer calls a precommit hook inside its transaction
// and a postcommit hook after it succeeds. Precommit prepares candidate
// configuration and returns the commits still owed as a `PendingCommit`;
// the caller hands that value back to `postcommit`. The driver keeps no
// state between the two calls.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{DriverKind, InterfaceAddress};
use crate::connector::PanoramaConnector;
use crate::error::CoreError;
use crate::reservation::ReservationStore;

/// The router fields the driver needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterInfo {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
}

impl RouterInfo {
    /// Static tags put on the router's device:
    /// `tenant_<first 8 chars of tenant id>` and `router_<name>`.
    pub fn device_tags(&self) -> Vec<String> {
        let tenant: String = self.tenant_id.chars().take(8).collect();
        vec![format!("tenant_{tenant}"), format!("router_{}", self.name)]
    }
}

/// A router port on a tenant network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterInterface {
    pub router_id: String,
    pub port_id: String,
    pub address: InterfaceAddress,
    /// VLAN tag of the port's network segment.
    pub segmentation_id: u16,
}

/// External gateway change carried by a router update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayChange {
    Unchanged,
    Set(InterfaceAddress),
    Cleared,
}

/// Where a commit has to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitTarget {
    /// The management node.
    Panorama,
    Device(String),
}

/// Commits owed after a successful precommit.
#[must_use = "pass the pending commit to postcommit"]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingCommit {
    targets: Vec<CommitTarget>,
}

impl PendingCommit {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn panorama() -> Self {
        Self {
            targets: vec![CommitTarget::Panorama],
        }
    }

    pub fn device(serial: impl Into<String>) -> Self {
        Self {
            targets: vec![CommitTarget::Device(serial.into())],
        }
    }

    pub fn targets(&self) -> &[CommitTarget] {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

// ── Device-backed driver ─────────────────────────────────────────────

/// Driver that backs every router with a dedicated managed device.
pub struct DeviceRouterDriver {
    connector: PanoramaConnector,
    store: Arc<dyn ReservationStore>,
}

impl DeviceRouterDriver {
    pub fn new(connector: PanoramaConnector, store: Arc<dyn ReservationStore>) -> Self {
        Self { connector, store }
    }

    pub fn connector(&self) -> &PanoramaConnector {
        &self.connector
    }

    pub fn store(&self) -> &Arc<dyn ReservationStore> {
        &self.store
    }

    async fn device_of(&self, router_id: &str) -> Result<String, CoreError> {
        Ok(self.store.get(router_id).await?.device_sn)
    }

    /// Device-group members not reserved by any router.
    pub async fn free_devices(&self) -> Result<Vec<String>, CoreError> {
        let devices = self.connector.list_devices().await?;
        let reserved = self.store.list_all().await?;
        Ok(devices
            .into_iter()
            .filter(|sn| !reserved.iter().any(|r| &r.device_sn == sn))
            .collect())
    }

    /// Reserve a free device for the router and tag it.
    pub async fn create_router_precommit(
        &self,
        router: &RouterInfo,
    ) -> Result<PendingCommit, CoreError> {
        let free = self.free_devices().await?;
        let Some(device_sn) = free.into_iter().next() else {
            return Err(CoreError::AllocationExhausted {
                device_group: self.connector.settings().device_group.clone(),
            });
        };

        self.store.reserve(&router.id, &device_sn).await?;
        info!(router_id = %router.id, device_sn = %device_sn, "device allocated");

        if let Err(e) = self
            .connector
            .add_device_tags(&device_sn, &router.device_tags())
            .await
        {
            if let Err(release) = self.store.release(&router.id).await {
                warn!(router_id = %router.id, error = %release, "failed to release reservation");
            }
            return Err(e);
        }
        Ok(PendingCommit::panorama())
    }

    /// Attach or detach the external gateway address on the router's device.
    pub async fn update_router_precommit(
        &self,
        router_id: &str,
        gateway: GatewayChange,
    ) -> Result<PendingCommit, CoreError> {
        let address = match gateway {
            GatewayChange::Unchanged => return Ok(PendingCommit::none()),
            GatewayChange::Set(address) => Some(address),
            GatewayChange::Cleared => None,
        };

        let device_sn = self.device_of(router_id).await?;
        match address {
            Some(address) => {
                debug!(router_id, device_sn = %device_sn, address = %address, "setting gateway");
                self.connector.add_external_ip(&device_sn, &address).await?;
                self.connector.add_external_nat(&device_sn, &address).await?;
            }
            None => {
                debug!(router_id, device_sn = %device_sn, "clearing gateway");
                self.connector.remove_external_nat(&device_sn).await?;
                self.connector.remove_external_ip(&device_sn).await?;
            }
        }
        Ok(PendingCommit::device(device_sn))
    }

    /// Remove the router's tags from its device, then release the device.
    pub async fn delete_router_precommit(
        &self,
        router: &RouterInfo,
    ) -> Result<PendingCommit, CoreError> {
        // Release only once the device is untagged.
        let device_sn = self.device_of(&router.id).await?;
        self.connector
            .remove_device_tags(&device_sn, &router.device_tags())
            .await?;
        self.store.release(&router.id).await?;
        info!(router_id = %router.id, device_sn = %device_sn, "device released");
        Ok(PendingCommit::panorama())
    }

    pub async fn add_interface_precommit(
        &self,
        iface: &RouterInterface,
    ) -> Result<PendingCommit, CoreError> {
        let device_sn = self.device_of(&iface.router_id).await?;
        self.connector
            .add_vlan_interface(
                &device_sn,
                &iface.port_id,
                &iface.address,
                iface.segmentation_id,
            )
            .await?;
        Ok(PendingCommit::device(device_sn))
    }

    pub async fn remove_interface_precommit(
        &self,
        router_id: &str,
        port_id: &str,
    ) -> Result<PendingCommit, CoreError> {
        let device_sn = self.device_of(router_id).await?;
        self.connector
            .remove_vlan_interface(&device_sn, port_id)
            .await?;
        Ok(PendingCommit::device(device_sn))
    }

    /// Register an instance address with its tags on the devices of
    /// `router_ids`, committing each device right away.
    pub async fn register_instance_address(
        &self,
        address: &str,
        tags: &[String],
        router_ids: &[String],
    ) -> Result<(), CoreError> {
        for router_id in router_ids {
            let device_sn = self.device_of(router_id).await?;
            self.connector
                .register_ip_address(&device_sn, address, tags)
                .await?;
            self.connector.commit_configuration(Some(&device_sn)).await?;
        }
        Ok(())
    }

    /// Unregister an instance address from the devices of `router_ids`.
    pub async fn unregister_instance_address_precommit(
        &self,
        address: &str,
        router_ids: &[String],
    ) -> Result<PendingCommit, CoreError> {
        let mut pending = PendingCommit::none();
        for router_id in router_ids {
            let device_sn = self.device_of(router_id).await?;
            self.connector
                .unregister_ip_address(&device_sn, address)
                .await?;
            pending.targets.push(CommitTarget::Device(device_sn));
        }
        Ok(pending)
    }

    /// Run the commits a precommit left pending.
    pub async fn postcommit(&self, pending: PendingCommit) -> Result<(), CoreError> {
        for target in pending.targets {
            match target {
                CommitTarget::Panorama => self.connector.commit_configuration(None).await?,
                CommitTarget::Device(sn) => {
                    self.connector.commit_configuration(Some(&sn)).await?;
                }
            }
        }
        Ok(())
    }
}

// ── Driver selection ─────────────────────────────────────────────────

/// Router driver chosen at startup.
pub enum RouterDriver {
    /// Routing handled by agents; every hook succeeds without doing anything.
    Agent,
    Device(DeviceRouterDriver),
}

impl RouterDriver {
    /// Build the driver for `kind`. The agent driver ignores the connector
    /// and store.
    pub fn from_kind(
        kind: DriverKind,
        connector: PanoramaConnector,
        store: Arc<dyn ReservationStore>,
    ) -> Self {
        match kind {
            DriverKind::Agent => Self::Agent,
            DriverKind::Device => Self::Device(DeviceRouterDriver::new(connector, store)),
        }
    }

    pub fn kind(&self) -> DriverKind {
        match self {
            Self::Agent => DriverKind::Agent,
            Self::Device(_) => DriverKind::Device,
        }
    }

    pub async fn create_router_precommit(
        &self,
        router: &RouterInfo,
    ) -> Result<PendingCommit, CoreError> {
        match self {
            Self::Agent => Ok(PendingCommit::none()),
            Self::Device(d) => d.create_router_precommit(router).await,
        }
    }

    pub async fn update_router_precommit(
        &self,
        router_id: &str,
        gateway: GatewayChange,
    ) -> Result<PendingCommit, CoreError> {
        match self {
            Self::Agent => Ok(PendingCommit::none()),
            Self::Device(d) => d.update_router_precommit(router_id, gateway).await,
        }
    }

    pub async fn delete_router_precommit(
        &self,
        router: &RouterInfo,
    ) -> Result<PendingCommit, CoreError> {
        match self {
            Self::Agent => Ok(PendingCommit::none()),
            Self::Device(d) => d.delete_router_precommit(router).await,
        }
    }

    pub async fn add_interface_precommit(
        &self,
        iface: &RouterInterface,
    ) -> Result<PendingCommit, CoreError> {
        match self {
            Self::Agent => Ok(PendingCommit::none()),
            Self::Device(d) => d.add_interface_precommit(iface).await,
        }
    }

    pub async fn remove_interface_precommit(
        &self,
        router_id: &str,
        port_id: &str,
    ) -> Result<PendingCommit, CoreError> {
        match self {
            Self::Agent => Ok(PendingCommit::none()),
            Self::Device(d) => d.remove_interface_precommit(router_id, port_id).await,
        }
    }

    pub async fn register_instance_address(
        &self,
        address: &str,
        tags: &[String],
        router_ids: &[String],
    ) -> Result<(), CoreError> {
        match self {
            Self::Agent => Ok(()),
            Self::Device(d) => {
                d.register_instance_address(address, tags, router_ids)
                    .await
            }
        }
    }

    pub async fn unregister_instance_address_precommit(
        &self,
        address: &str,
        router_ids: &[String],
    ) -> Result<PendingCommit, CoreError> {
        match self {
            Self::Agent => Ok(PendingCommit::none()),
            Self::Device(d) => {
                d.unregister_instance_address_precommit(address, router_ids)
                    .await
            }
        }
    }

    pub async fn postcommit(&self, pending: PendingCommit) -> Result<(), CoreError> {
        match self {
            Self::Agent => Ok(()),
            Self::Device(d) => d.postcommit(pending).await,
        }
    }
}
