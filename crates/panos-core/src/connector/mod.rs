// ── Device command facade ──
//
// `PanoramaConnector` turns router lifecycle intents into XML API calls.
// Every public operation opens its own session, scoped to a device serial
// (proxied through the management node) or to the management node itself.
// The connector holds no per-device state and does no locking; callers
// serialize mutating calls per device.

mod external;
mod interfaces;
mod paths;

use panos_api::{CommitRequest, JobPolling, Semantic, SessionConfig, XapiClient, xml::escape};
use tracing::{debug, info};

use crate::config::ConnectorSettings;
use crate::error::CoreError;

pub use external::ExternalStep;
pub use interfaces::VlanInterface;

/// Facade over the XML API for one management endpoint.
#[derive(Debug, Clone)]
pub struct PanoramaConnector {
    session: SessionConfig,
    settings: ConnectorSettings,
}

impl PanoramaConnector {
    /// `session` addresses the management node; per-device sessions are
    /// derived from it.
    pub fn new(session: SessionConfig, settings: ConnectorSettings) -> Self {
        Self { session, settings }
    }

    pub fn settings(&self) -> &ConnectorSettings {
        &self.settings
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    /// Open a session against `serial`, or the management node when `None`.
    pub fn session(&self, serial: Option<&str>) -> Result<XapiClient, CoreError> {
        let config = match serial {
            Some(sn) => self.session.with_serial(sn),
            None => self.session.clone(),
        };
        Ok(XapiClient::new(config)?)
    }

    // ── Device group ─────────────────────────────────────────────────

    /// Serials of the devices in the configured device group.
    pub async fn list_devices(&self) -> Result<Vec<String>, CoreError> {
        let api = self.session(None)?;
        let xpath = paths::device_group_members(&self.settings);
        debug!(xpath = %xpath, "listing device group members");
        api.show(&xpath).await?;

        let tree = api.raw_config_tree(false).ok_or_else(|| CoreError::Protocol {
            message: "empty device group response".into(),
            code: None,
        })?;
        let entries = tree
            .path(&["response", "result", "devices", "entry"])
            .and_then(Semantic::as_list)
            .unwrap_or_default();

        Ok(entries
            .iter()
            .filter_map(|e| e.get("name").and_then(Semantic::as_str))
            .map(str::to_owned)
            .collect())
    }

    // ── Device tags ──────────────────────────────────────────────────

    /// Label a managed device with `tags` on the management node.
    pub async fn add_device_tags(&self, serial: &str, tags: &[String]) -> Result<(), CoreError> {
        let api = self.session(None)?;
        for tag in tags {
            let element = format!(
                "<entry name='{}'><vsys><entry name='{}'><tags><member>{}</member></tags></entry></vsys></entry>",
                escape(serial),
                escape(&self.settings.vsys),
                escape(tag)
            );
            debug!(serial, tag = %tag, "adding device tag");
            api.set(paths::managed_devices(), &element).await?;
        }
        Ok(())
    }

    pub async fn remove_device_tags(&self, serial: &str, tags: &[String]) -> Result<(), CoreError> {
        let api = self.session(None)?;
        for tag in tags {
            debug!(serial, tag = %tag, "removing device tag");
            api.delete(&paths::device_tag(&self.settings, serial, tag))
                .await?;
        }
        Ok(())
    }

    // ── Dynamic address registration ─────────────────────────────────

    /// Register `address` with `tags` for dynamic address groups on the
    /// device. Already-registered pairs count as success.
    pub async fn register_ip_address(
        &self,
        serial: &str,
        address: &str,
        tags: &[String],
    ) -> Result<(), CoreError> {
        let mut sorted: Vec<&String> = tags.iter().collect();
        sorted.sort();
        let members: String = sorted
            .iter()
            .map(|t| format!("<member>{}</member>", escape(t)))
            .collect();
        let cmd = format!(
            "<uid-message><version>2.0</version><type>update</type><payload><register>\
             <entry ip=\"{}\"><tag>{members}</tag></entry>\
             </register></payload></uid-message>",
            escape(address)
        );

        let api = self.session(Some(serial))?;
        debug!(serial, address, tags = sorted.len(), "registering address");
        api.user_id(&cmd, None).await?;
        Ok(())
    }

    pub async fn unregister_ip_address(&self, serial: &str, address: &str) -> Result<(), CoreError> {
        let cmd = format!(
            "<uid-message><version>2.0</version><type>update</type><payload><unregister>\
             <entry ip=\"{}\"></entry>\
             </unregister></payload></uid-message>",
            escape(address)
        );

        let api = self.session(Some(serial))?;
        debug!(serial, address, "unregistering address");
        api.user_id(&cmd, None).await?;
        Ok(())
    }

    // ── Commit ───────────────────────────────────────────────────────

    /// Commit the candidate configuration of `serial`, or of the management
    /// node when `None`, and wait for the job to finish.
    pub async fn commit_configuration(&self, serial: Option<&str>) -> Result<(), CoreError> {
        let config = match serial {
            Some(sn) => self.session.with_serial(sn).with_get(),
            None => self.session.with_get(),
        };
        let api = XapiClient::new(config)?;
        let cmd = CommitRequest::new().render();
        api.commit(&cmd, None, JobPolling::sync()).await?;
        info!(serial = ?serial, "configuration committed");
        Ok(())
    }

    // ── Shared steps ─────────────────────────────────────────────────

    /// Create `zone` with an empty layer3 network if it does not exist.
    pub(crate) async fn ensure_zone(&self, api: &XapiClient, zone: &str) -> Result<(), CoreError> {
        let xpath = paths::zone(&self.settings, zone);
        match api.show(&xpath).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_no_such_node() => {
                debug!(zone, "creating missing security zone");
                api.set(&xpath, "<network><layer3/></network>").await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) async fn set_router_interface(
        &self,
        api: &XapiClient,
        iface: &str,
    ) -> Result<(), CoreError> {
        api.set(
            &paths::router_interfaces(&self.settings),
            &format!("<member>{}</member>", escape(iface)),
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn set_zone_interface(
        &self,
        api: &XapiClient,
        zone: &str,
        iface: &str,
    ) -> Result<(), CoreError> {
        self.ensure_zone(api, zone).await?;
        api.set(
            &paths::zone_interfaces(&self.settings, zone),
            &format!("<member>{}</member>", escape(iface)),
        )
        .await?;
        Ok(())
    }
}
