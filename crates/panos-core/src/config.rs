// ── Facade settings ──
//
// Names the facade writes into device configuration: zones, virtual
// router, interfaces, vsys, NAT rule, optional management profile and
// default route. Passed explicitly to `PanoramaConnector`; core never reads
// config files.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;

/// Which router driver the orchestration layer runs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DriverKind {
    /// Routing is done elsewhere; every lifecycle hook is a no-op.
    Agent,
    /// Each router is backed by a dedicated managed device.
    #[default]
    Device,
}

/// Names and knobs used when writing device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorSettings {
    /// Device group whose members can be reserved.
    pub device_group: String,
    pub virtual_router: String,
    pub internal_zone: String,
    pub external_zone: String,
    /// Interface management profile for the external and VLAN interfaces.
    pub management_profile: Option<String>,
    /// Next hop for the default route; no route is written when unset.
    pub default_route_next_hop: Option<String>,
    pub external_interface: String,
    /// Parent of the VLAN sub-interfaces (`<parent>.<n>`).
    pub vlan_parent_interface: String,
    pub vsys: String,
    pub nat_rule_name: String,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            device_group: "default".into(),
            virtual_router: "default".into(),
            internal_zone: "internal".into(),
            external_zone: "external".into(),
            management_profile: None,
            default_route_next_hop: None,
            external_interface: "ethernet1/1".into(),
            vlan_parent_interface: "ethernet1/2".into(),
            vsys: "vsys1".into(),
            nat_rule_name: "egress-nat".into(),
        }
    }
}

/// An interface address in `ip/prefix` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceAddress {
    pub address: IpAddr,
    pub prefix_len: u8,
}

impl InterfaceAddress {
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, CoreError> {
        let max = if address.is_ipv4() { 32 } else { 128 };
        if prefix_len > max {
            return Err(CoreError::InvalidInput {
                message: format!("prefix length {prefix_len} out of range for {address}"),
            });
        }
        Ok(Self {
            address,
            prefix_len,
        })
    }

    /// Combine a fixed IP with the prefix length of its subnet CIDR.
    pub fn from_subnet(address: IpAddr, cidr: &str) -> Result<Self, CoreError> {
        let prefix = cidr
            .split_once('/')
            .and_then(|(_, len)| len.parse::<u8>().ok())
            .ok_or_else(|| CoreError::InvalidInput {
                message: format!("invalid subnet CIDR: {cidr}"),
            })?;
        Self::new(address, prefix)
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for InterfaceAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, _) = s.split_once('/').ok_or_else(|| CoreError::InvalidInput {
            message: format!("expected ip/prefix, got {s}"),
        })?;
        let address = ip.parse().map_err(|_| CoreError::InvalidInput {
            message: format!("invalid IP address: {ip}"),
        })?;
        Self::from_subnet(address, s)
    }
}
