// Configuration xpaths written by the connector.
//
// Everything below the managed device lives under the
// `localhost.localdomain` device entry; device tags and device-group
// membership live on the management node. Every name placed in a
// predicate goes through `literal`.

use crate::config::ConnectorSettings;

const DEVICE: &str = "/config/devices/entry[@name='localhost.localdomain']";
const MANAGED_DEVICES: &str = "/config/mgt-config/devices";

/// XPath string literal for `value`. XPath 1.0 has no escape sequences,
/// so a value holding both quote kinds is built with `concat()`.
fn literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

fn named(value: &str) -> String {
    format!("entry[@name={}]", literal(value))
}

fn member(value: &str) -> String {
    format!("member[text()={}]", literal(value))
}

pub(crate) fn managed_devices() -> &'static str {
    MANAGED_DEVICES
}

pub(crate) fn device_group_members(s: &ConnectorSettings) -> String {
    format!("{DEVICE}/device-group/{}/devices", named(&s.device_group))
}

pub(crate) fn device_tag(s: &ConnectorSettings, serial: &str, tag: &str) -> String {
    format!(
        "{MANAGED_DEVICES}/{}/vsys/{}/tags/{}",
        named(serial),
        named(&s.vsys),
        member(tag)
    )
}

// ── vsys ─────────────────────────────────────────────────────────────

fn vsys(s: &ConnectorSettings) -> String {
    format!("{DEVICE}/vsys/{}", named(&s.vsys))
}

pub(crate) fn zone(s: &ConnectorSettings, zone: &str) -> String {
    format!("{}/zone/{}", vsys(s), named(zone))
}

pub(crate) fn zone_interfaces(s: &ConnectorSettings, zone_name: &str) -> String {
    format!("{}/network/layer3", zone(s, zone_name))
}

pub(crate) fn zone_interface(s: &ConnectorSettings, zone_name: &str, iface: &str) -> String {
    format!("{}/{}", zone_interfaces(s, zone_name), member(iface))
}

pub(crate) fn nat_rules(s: &ConnectorSettings) -> String {
    format!("{}/rulebase/nat/rules", vsys(s))
}

pub(crate) fn nat_rule(s: &ConnectorSettings) -> String {
    format!("{}/{}", nat_rules(s), named(&s.nat_rule_name))
}

// ── Virtual router ───────────────────────────────────────────────────

fn virtual_router(s: &ConnectorSettings) -> String {
    format!(
        "{DEVICE}/network/virtual-router/{}",
        named(&s.virtual_router)
    )
}

pub(crate) fn router_interfaces(s: &ConnectorSettings) -> String {
    format!("{}/interface", virtual_router(s))
}

pub(crate) fn router_interface(s: &ConnectorSettings, iface: &str) -> String {
    format!("{}/{}", router_interfaces(s), member(iface))
}

pub(crate) fn static_routes(s: &ConnectorSettings) -> String {
    format!("{}/routing-table/ip/static-route", virtual_router(s))
}

pub(crate) fn default_route(s: &ConnectorSettings) -> String {
    format!("{}/{}", static_routes(s), named("default"))
}

// ── Interfaces ───────────────────────────────────────────────────────

pub(crate) fn layer3(iface: &str) -> String {
    format!("{DEVICE}/network/interface/ethernet/{}/layer3", named(iface))
}

pub(crate) fn layer3_addresses(iface: &str) -> String {
    format!("{}/ip", layer3(iface))
}

pub(crate) fn layer3_address_entries(iface: &str) -> String {
    format!("{}/entry", layer3_addresses(iface))
}

pub(crate) fn management_profile(iface: &str) -> String {
    format!("{}/interface-management-profile", layer3(iface))
}

pub(crate) fn vlan_units(s: &ConnectorSettings) -> String {
    format!("{}/units", layer3(&s.vlan_parent_interface))
}

pub(crate) fn vlan_unit(s: &ConnectorSettings, name: &str) -> String {
    format!("{}/{}", vlan_units(s), named(name))
}
