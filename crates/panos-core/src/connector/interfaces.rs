// VLAN sub-interfaces on the internal parent interface.
//
// Units are named `<parent>.<n>` and carry `port_id=<id>` in their comment
// so they can be found again on removal.

use panos_api::xml::escape;
use tracing::debug;

use super::{PanoramaConnector, paths};
use crate::config::InterfaceAddress;
use crate::error::CoreError;

/// A layer3 sub-interface found on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanInterface {
    pub name: String,
    pub comment: Option<String>,
}

impl VlanInterface {
    /// Numeric unit suffix after the last `.`.
    fn unit_index(&self) -> Option<usize> {
        self.name.rsplit_once('.').and_then(|(_, n)| n.parse().ok())
    }

    /// Whether the unit's comment is exactly `port_id=<port_id>`.
    fn belongs_to(&self, port_id: &str) -> bool {
        !port_id.is_empty()
            && self
                .comment
                .as_deref()
                .and_then(|c| c.trim().strip_prefix("port_id="))
                .is_some_and(|id| id == port_id)
    }
}

impl PanoramaConnector {
    /// Sub-interfaces of the VLAN parent interface. A missing `units` node
    /// reads as no sub-interfaces; any other failure is returned.
    pub async fn list_vlan_interfaces(&self, serial: &str) -> Result<Vec<VlanInterface>, CoreError> {
        let api = self.session(Some(serial))?;
        self.vlan_units(&api).await
    }

    async fn vlan_units(&self, api: &panos_api::XapiClient) -> Result<Vec<VlanInterface>, CoreError> {
        let xpath = paths::vlan_units(self.settings());
        let response = match api.show(&xpath).await {
            Ok(r) => r,
            Err(e) if e.is_no_such_node() => {
                debug!(xpath = %xpath, "no VLAN units configured");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let Some(root) = response.root.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(root
            .find_all("result/units/entry")
            .into_iter()
            .filter_map(|entry| {
                Some(VlanInterface {
                    name: entry.attribute("name")?.to_owned(),
                    comment: entry.find_text("comment").map(str::to_owned),
                })
            })
            .collect())
    }

    /// Add a tagged sub-interface for `port_id`, join it to the virtual
    /// router and the internal zone. Returns the sub-interface name.
    pub async fn add_vlan_interface(
        &self,
        serial: &str,
        port_id: &str,
        address: &InterfaceAddress,
        segmentation_id: u16,
    ) -> Result<String, CoreError> {
        let s = self.settings();
        let api = self.session(Some(serial))?;
        let existing = self.vlan_units(&api).await?;

        let next = existing
            .iter()
            .filter_map(VlanInterface::unit_index)
            .max()
            .unwrap_or(existing.len())
            + 1;
        let name = format!("{}.{next}", s.vlan_parent_interface);

        let profile = s
            .management_profile
            .as_deref()
            .map(|p| {
                format!(
                    "<interface-management-profile>{}</interface-management-profile>",
                    escape(p)
                )
            })
            .unwrap_or_default();
        let element = format!(
            "<ipv6><neighbor-discovery><router-advertisement><enable>no</enable>\
             </router-advertisement></neighbor-discovery></ipv6>\
             <ip><entry name='{address}'/></ip>{profile}\
             <tag>{segmentation_id}</tag><comment>port_id={}</comment>",
            escape(port_id)
        );

        debug!(serial, iface = %name, segmentation_id, "adding VLAN interface");
        api.set(&paths::vlan_unit(s, &name), &element).await?;
        self.set_router_interface(&api, &name).await?;
        self.set_zone_interface(&api, &s.internal_zone, &name).await?;
        Ok(name)
    }

    /// Remove the sub-interface created for `port_id`. Returns its name, or
    /// `None` when no sub-interface carries that port.
    pub async fn remove_vlan_interface(
        &self,
        serial: &str,
        port_id: &str,
    ) -> Result<Option<String>, CoreError> {
        let s = self.settings();
        let api = self.session(Some(serial))?;
        let Some(unit) = self
            .vlan_units(&api)
            .await?
            .into_iter()
            .find(|u| u.belongs_to(port_id))
        else {
            debug!(serial, port_id, "no VLAN interface for port");
            return Ok(None);
        };

        debug!(serial, iface = %unit.name, "removing VLAN interface");
        api.delete(&paths::router_interface(s, &unit.name)).await?;
        api.delete(&paths::zone_interface(s, &s.internal_zone, &unit.name))
            .await?;
        api.delete(&paths::vlan_unit(s, &unit.name)).await?;
        Ok(Some(unit.name))
    }
}
