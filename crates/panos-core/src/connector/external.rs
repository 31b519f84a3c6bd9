// External interface and source NAT.
//
// Attaching an external address is a fixed sequence of writes; detaching
// deletes the node each write created, in reverse order.

use panos_api::xml::escape;
use tracing::debug;

use super::{PanoramaConnector, paths};
use crate::config::InterfaceAddress;
use crate::error::CoreError;

/// One write of the external-address sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalStep {
    /// Address on the external interface.
    Address,
    /// External interface joined to the virtual router.
    RouterInterface,
    /// Default route via the configured next hop. Optional.
    DefaultRoute,
    /// External interface joined to the external zone.
    SecurityZone,
    /// Interface management profile. Optional.
    ManagementProfile,
}

impl PanoramaConnector {
    /// Steps of the external-address sequence under the current settings.
    pub fn external_steps(&self) -> Vec<ExternalStep> {
        let s = self.settings();
        let mut steps = vec![ExternalStep::Address, ExternalStep::RouterInterface];
        if s.default_route_next_hop.is_some() {
            steps.push(ExternalStep::DefaultRoute);
        }
        steps.push(ExternalStep::SecurityZone);
        if s.management_profile.is_some() {
            steps.push(ExternalStep::ManagementProfile);
        }
        steps
    }

    /// Xpath and element written by `step`.
    pub fn external_write(&self, step: ExternalStep, address: &InterfaceAddress) -> (String, String) {
        let s = self.settings();
        let iface = s.external_interface.as_str();
        match step {
            ExternalStep::Address => (
                paths::layer3_addresses(iface),
                format!("<entry name='{address}'/>"),
            ),
            ExternalStep::RouterInterface => (
                paths::router_interfaces(s),
                format!("<member>{}</member>", escape(iface)),
            ),
            ExternalStep::DefaultRoute => (
                paths::static_routes(s),
                format!(
                    "<entry name='default'><nexthop><ip-address>{}</ip-address></nexthop>\
                     <metric>10</metric><destination>0.0.0.0/0</destination></entry>",
                    escape(s.default_route_next_hop.as_deref().unwrap_or_default())
                ),
            ),
            ExternalStep::SecurityZone => (
                paths::zone_interfaces(s, &s.external_zone),
                format!("<member>{}</member>", escape(iface)),
            ),
            ExternalStep::ManagementProfile => (
                paths::layer3(iface),
                format!(
                    "<interface-management-profile>{}</interface-management-profile>",
                    escape(s.management_profile.as_deref().unwrap_or_default())
                ),
            ),
        }
    }

    /// Xpath of the node that `step` creates, deleted on detach.
    pub fn external_node(&self, step: ExternalStep) -> String {
        let s = self.settings();
        let iface = s.external_interface.as_str();
        match step {
            ExternalStep::Address => paths::layer3_address_entries(iface),
            ExternalStep::RouterInterface => paths::router_interface(s, iface),
            ExternalStep::DefaultRoute => paths::default_route(s),
            ExternalStep::SecurityZone => paths::zone_interface(s, &s.external_zone, iface),
            ExternalStep::ManagementProfile => paths::management_profile(iface),
        }
    }

    /// Put `address` on the external interface and route through it.
    pub async fn add_external_ip(
        &self,
        serial: &str,
        address: &InterfaceAddress,
    ) -> Result<(), CoreError> {
        let api = self.session(Some(serial))?;
        for step in self.external_steps() {
            if step == ExternalStep::SecurityZone {
                self.ensure_zone(&api, &self.settings().external_zone).await?;
            }
            let (xpath, element) = self.external_write(step, address);
            debug!(serial, step = ?step, xpath = %xpath, "attaching external address");
            api.set(&xpath, &element).await?;
        }
        Ok(())
    }

    /// Undo [`add_external_ip`](Self::add_external_ip).
    pub async fn remove_external_ip(&self, serial: &str) -> Result<(), CoreError> {
        let api = self.session(Some(serial))?;
        for step in self.external_steps().into_iter().rev() {
            let xpath = self.external_node(step);
            debug!(serial, step = ?step, xpath = %xpath, "detaching external address");
            api.delete(&xpath).await?;
        }
        Ok(())
    }

    /// Source-NAT everything from the internal zone behind `address`.
    pub async fn add_external_nat(
        &self,
        serial: &str,
        address: &InterfaceAddress,
    ) -> Result<(), CoreError> {
        let s = self.settings();
        let api = self.session(Some(serial))?;
        self.ensure_zone(&api, &s.internal_zone).await?;

        let element = format!(
            "<entry name='{name}'><source-translation><dynamic-ip-and-port><interface-address>\
             <ip>{address}</ip><interface>{iface}</interface>\
             </interface-address></dynamic-ip-and-port></source-translation>\
             <to><member>{to}</member></to><from><member>{from}</member></from>\
             <source><member>any</member></source><destination><member>any</member></destination>\
             <service>any</service><nat-type>ipv4</nat-type></entry>",
            name = escape(&s.nat_rule_name),
            iface = escape(&s.external_interface),
            to = escape(&s.external_zone),
            from = escape(&s.internal_zone),
        );
        let xpath = paths::nat_rules(s);
        debug!(serial, xpath = %xpath, "adding source NAT rule");
        api.set(&xpath, &element).await?;
        Ok(())
    }

    pub async fn remove_external_nat(&self, serial: &str) -> Result<(), CoreError> {
        let api = self.session(Some(serial))?;
        let xpath = paths::nat_rule(self.settings());
        debug!(serial, xpath = %xpath, "removing source NAT rule");
        api.delete(&xpath).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use panos_api::SessionConfig;
    use secrecy::SecretString;

    use super::*;
    use crate::config::ConnectorSettings;

    fn connector(settings: ConnectorSettings) -> PanoramaConnector {
        let session = SessionConfig::builder("panorama.example")
            .api_key(SecretString::from("k".to_string()))
            .build()
            .unwrap();
        PanoramaConnector::new(session, settings)
    }

    #[test]
    fn optional_steps_follow_settings() {
        let minimal = connector(ConnectorSettings::default());
        assert_eq!(
            minimal.external_steps(),
            vec![
                ExternalStep::Address,
                ExternalStep::RouterInterface,
                ExternalStep::SecurityZone
            ]
        );

        let full = connector(ConnectorSettings {
            management_profile: Some("allow-ping".into()),
            default_route_next_hop: Some("203.0.113.1".into()),
            ..ConnectorSettings::default()
        });
        assert_eq!(full.external_steps().len(), 5);
    }

    #[test]
    fn every_deleted_node_lives_under_its_write() {
        let c = connector(ConnectorSettings {
            management_profile: Some("allow-ping".into()),
            default_route_next_hop: Some("203.0.113.1".into()),
            ..ConnectorSettings::default()
        });
        let address: InterfaceAddress = "203.0.113.10/24".parse().unwrap();
        for step in c.external_steps() {
            let (xpath, _) = c.external_write(step, &address);
            let node = c.external_node(step);
            assert!(node.starts_with(&xpath), "{step:?}: {node} !< {xpath}");
            assert_ne!(node, xpath);
        }
    }

    #[test]
    fn address_element_uses_prefix_form() {
        let c = connector(ConnectorSettings::default());
        let address: InterfaceAddress = "203.0.113.10/24".parse().unwrap();
        let (_, element) = c.external_write(ExternalStep::Address, &address);
        assert_eq!(element, "<entry name='203.0.113.10/24'/>");
    }
}
