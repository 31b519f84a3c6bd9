#![allow(clippy::unwrap_used)]
// Integration tests for `PanoramaConnector` and `RouterDriver` using wiremock.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use url::Url;
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use panos_api::{Scheme, SessionConfig};
use panos_core::{
    ConnectorSettings, CoreError, DriverKind, GatewayChange, InMemoryReservationStore,
    InterfaceAddress, PanoramaConnector, ReservationStore, RouterDriver, RouterInfo,
    RouterInterface,
};

// ── Helpers ─────────────────────────────────────────────────────────

const XML: &str = "application/xml; charset=utf-8";

/// Request parameters from the query string and the form body.
fn params(request: &Request) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = request
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    out.extend(
        url::form_urlencoded::parse(&request.body).map(|(k, v)| (k.into_owned(), v.into_owned())),
    );
    out
}

fn param(request: &Request, key: &str) -> Option<String> {
    params(request)
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

/// Matches when parameter `key` contains `needle`.
struct Param(&'static str, &'static str);

impl Match for Param {
    fn matches(&self, request: &Request) -> bool {
        param(request, self.0).is_some_and(|v| v.contains(self.1))
    }
}

fn success(inner: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<response status=\"success\">{inner}</response>"),
        XML,
    )
}

fn no_such_node() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        "<response status=\"error\" code=\"7\"><msg><line>No such node</line></msg></response>",
        XML,
    )
}

async fn catch_all(server: &MockServer) {
    Mock::given(wiremock::matchers::any())
        .respond_with(success("<result/>"))
        .mount(server)
        .await;
}

fn settings() -> ConnectorSettings {
    ConnectorSettings {
        management_profile: Some("allow-ping".into()),
        default_route_next_hop: Some("203.0.113.1".into()),
        ..ConnectorSettings::default()
    }
}

fn connector(server: &MockServer, settings: ConnectorSettings) -> PanoramaConnector {
    let uri = Url::parse(&server.uri()).unwrap();
    let session = SessionConfig::builder(uri.host_str().unwrap())
        .port(i64::from(uri.port().unwrap()))
        .scheme(Scheme::Http)
        .api_key(SecretString::from("SECRETKEY".to_string()))
        .build()
        .unwrap();
    PanoramaConnector::new(session, settings)
}

/// `(action, xpath)` of every config request, in order.
async fn config_calls(server: &MockServer) -> Vec<(String, String)> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| param(r, "type").as_deref() == Some("config"))
        .map(|r| {
            (
                param(r, "action").unwrap_or_default(),
                param(r, "xpath").unwrap_or_default(),
            )
        })
        .collect()
}

fn router() -> RouterInfo {
    RouterInfo {
        id: "router-1".into(),
        tenant_id: "5f2c9a1b7d3e4f60".into(),
        name: "edge".into(),
    }
}

// ── Device group ────────────────────────────────────────────────────

#[tokio::test]
async fn list_devices_reads_member_names() {
    let server = MockServer::start().await;
    Mock::given(Param("action", "show"))
        .and(Param("xpath", "/device-group/entry[@name='default']/devices"))
        .respond_with(success(
            "<result><devices><entry name=\"001801000001\"/><entry name=\"001801000002\"/></devices></result>",
        ))
        .mount(&server)
        .await;

    let devices = connector(&server, settings()).list_devices().await.unwrap();
    assert_eq!(devices, vec!["001801000001", "001801000002"]);
}

#[tokio::test]
async fn list_devices_with_single_member() {
    let server = MockServer::start().await;
    Mock::given(Param("action", "show"))
        .respond_with(success(
            "<result><devices><entry name=\"001801000001\"/></devices></result>",
        ))
        .mount(&server)
        .await;

    let devices = connector(&server, settings()).list_devices().await.unwrap();
    assert_eq!(devices, vec!["001801000001"]);
}

#[tokio::test]
async fn missing_device_group_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(Param("action", "show"))
        .respond_with(no_such_node())
        .mount(&server)
        .await;

    let err = connector(&server, settings()).list_devices().await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string().trim(), "No such node");
}

// ── External address ────────────────────────────────────────────────

#[tokio::test]
async fn external_ip_detach_deletes_what_attach_wrote() {
    let server = MockServer::start().await;
    catch_all(&server).await;
    let c = connector(&server, settings());
    let address: InterfaceAddress = "203.0.113.10/24".parse().unwrap();

    c.add_external_ip("SN1", &address).await.unwrap();
    c.remove_external_ip("SN1").await.unwrap();

    let calls = config_calls(&server).await;
    let sets: Vec<&String> = calls
        .iter()
        .filter(|(a, _)| a == "set")
        .map(|(_, x)| x)
        .collect();
    let deletes: Vec<&String> = calls
        .iter()
        .filter(|(a, _)| a == "delete")
        .map(|(_, x)| x)
        .collect();

    assert_eq!(sets.len(), 5);
    assert_eq!(deletes.len(), 5);
    for (set, delete) in sets.iter().zip(deletes.iter().rev()) {
        assert!(delete.starts_with(set.as_str()), "{delete} is not under {set}");
    }
}

#[tokio::test]
async fn external_ip_requests_are_proxied_to_the_device() {
    let server = MockServer::start().await;
    catch_all(&server).await;
    let c = connector(&server, ConnectorSettings::default());

    c.remove_external_ip("SN1").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(!requests.is_empty());
    for r in &requests {
        assert_eq!(param(r, "target").as_deref(), Some("SN1"));
        assert_eq!(param(r, "key").as_deref(), Some("SECRETKEY"));
    }
}

#[tokio::test]
async fn missing_zone_is_created_before_joining_it() {
    let server = MockServer::start().await;
    Mock::given(Param("action", "show"))
        .and(Param("xpath", "/zone/entry[@name='external']"))
        .respond_with(no_such_node())
        .mount(&server)
        .await;
    catch_all(&server).await;
    let c = connector(&server, ConnectorSettings::default());
    let address: InterfaceAddress = "203.0.113.10/24".parse().unwrap();

    c.add_external_ip("SN1", &address).await.unwrap();

    let calls = config_calls(&server).await;
    let zone_create = calls
        .iter()
        .position(|(a, x)| a == "set" && x.ends_with("/zone/entry[@name='external']"))
        .expect("zone created");
    let zone_join = calls
        .iter()
        .position(|(a, x)| a == "set" && x.ends_with("/zone/entry[@name='external']/network/layer3"))
        .expect("interface joined");
    assert!(zone_create < zone_join);
}

#[tokio::test]
async fn other_zone_errors_abort_the_sequence() {
    let server = MockServer::start().await;
    Mock::given(Param("action", "show"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<response status=\"error\" code=\"403\"><msg><line>Unauthorized</line></msg></response>",
            XML,
        ))
        .mount(&server)
        .await;
    catch_all(&server).await;
    let c = connector(&server, ConnectorSettings::default());
    let address: InterfaceAddress = "203.0.113.10/24".parse().unwrap();

    let err = c.add_external_ip("SN1", &address).await.unwrap_err();
    assert!(matches!(err, CoreError::Protocol { ref message, .. } if message == "Unauthorized"));
}

// ── VLAN interfaces ─────────────────────────────────────────────────

#[tokio::test]
async fn vlan_interface_takes_next_unit_index() {
    let server = MockServer::start().await;
    Mock::given(Param("action", "show"))
        .and(Param("xpath", "/layer3/units"))
        .respond_with(success(
            "<result><units>\
             <entry name=\"ethernet1/2.1\"><comment>port_id=aaa</comment></entry>\
             <entry name=\"ethernet1/2.4\"><comment>port_id=bbb</comment></entry>\
             </units></result>",
        ))
        .mount(&server)
        .await;
    catch_all(&server).await;
    let c = connector(&server, ConnectorSettings::default());
    let address: InterfaceAddress = "10.0.0.1/24".parse().unwrap();

    let name = c
        .add_vlan_interface("SN1", "ccc", &address, 101)
        .await
        .unwrap();
    assert_eq!(name, "ethernet1/2.5");

    let requests = server.received_requests().await.unwrap();
    let unit_set = requests
        .iter()
        .find(|r| {
            param(r, "action").as_deref() == Some("set")
                && param(r, "xpath").is_some_and(|x| x.ends_with("units/entry[@name='ethernet1/2.5']"))
        })
        .expect("unit written");
    let element = param(unit_set, "element").unwrap();
    assert!(element.contains("<tag>101</tag>"));
    assert!(element.contains("<comment>port_id=ccc</comment>"));
    assert!(element.contains("<entry name='10.0.0.1/24'/>"));
}

#[tokio::test]
async fn vlan_interface_removal_finds_unit_by_port() {
    let server = MockServer::start().await;
    Mock::given(Param("action", "show"))
        .and(Param("xpath", "/layer3/units"))
        .respond_with(success(
            "<result><units>\
             <entry name=\"ethernet1/2.1\"><comment>port_id=aaa</comment></entry>\
             <entry name=\"ethernet1/2.2\"><comment>port_id=bbb</comment></entry>\
             </units></result>",
        ))
        .mount(&server)
        .await;
    catch_all(&server).await;
    let c = connector(&server, ConnectorSettings::default());

    let removed = c.remove_vlan_interface("SN1", "bbb").await.unwrap();
    assert_eq!(removed.as_deref(), Some("ethernet1/2.2"));

    let deletes: Vec<String> = config_calls(&server)
        .await
        .into_iter()
        .filter(|(a, _)| a == "delete")
        .map(|(_, x)| x)
        .collect();
    assert_eq!(deletes.len(), 3);
    assert!(deletes.iter().all(|x| x.contains("ethernet1/2.2")));
    assert!(deletes[2].ends_with("units/entry[@name='ethernet1/2.2']"));

    assert_eq!(c.remove_vlan_interface("SN1", "zzz").await.unwrap(), None);
}

#[tokio::test]
async fn missing_units_node_means_no_interfaces() {
    let server = MockServer::start().await;
    Mock::given(Param("action", "show"))
        .respond_with(no_such_node())
        .mount(&server)
        .await;
    let c = connector(&server, ConnectorSettings::default());

    assert!(c.list_vlan_interfaces("SN1").await.unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_units_abort_vlan_changes() {
    let server = MockServer::start().await;
    Mock::given(Param("action", "show"))
        .and(Param("xpath", "/layer3/units"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<response status=\"error\" code=\"403\"><msg><line>Unauthorized</line></msg></response>",
            XML,
        ))
        .mount(&server)
        .await;
    catch_all(&server).await;
    let c = connector(&server, ConnectorSettings::default());
    let address: InterfaceAddress = "10.0.0.1/24".parse().unwrap();

    let unauthorized =
        |err: &CoreError| matches!(err, CoreError::Protocol { message, .. } if message == "Unauthorized");

    let err = c.list_vlan_interfaces("SN1").await.unwrap_err();
    assert!(unauthorized(&err));
    let err = c
        .add_vlan_interface("SN1", "ccc", &address, 101)
        .await
        .unwrap_err();
    assert!(unauthorized(&err));
    let err = c.remove_vlan_interface("SN1", "bbb").await.unwrap_err();
    assert!(unauthorized(&err));

    let writes = config_calls(&server)
        .await
        .into_iter()
        .filter(|(a, _)| a != "show")
        .count();
    assert_eq!(writes, 0);
}

// ── Address registration ────────────────────────────────────────────

#[tokio::test]
async fn registration_tolerates_existing_entries() {
    let server = MockServer::start().await;
    Mock::given(Param("type", "user-id"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<response status=\"error\"><msg><line><uid-response><version>2.0</version>\
             <payload><register><entry ip=\"10.0.0.5\" message=\"tag already exists, ignore\"/>\
             </register></payload></uid-response></line></msg></response>",
            XML,
        ))
        .mount(&server)
        .await;
    let c = connector(&server, ConnectorSettings::default());

    c.register_ip_address("SN1", "10.0.0.5", &["web".into(), "app".into()])
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let cmd = param(&requests[0], "cmd").unwrap();
    assert!(cmd.contains("<member>app</member><member>web</member>"));
    assert!(cmd.contains("<entry ip=\"10.0.0.5\">"));
}

// ── Router driver ───────────────────────────────────────────────────

fn device_driver(server: &MockServer, store: Arc<InMemoryReservationStore>) -> RouterDriver {
    RouterDriver::from_kind(DriverKind::Device, connector(server, settings()), store)
}

async fn mount_devices(server: &MockServer, serials: &[&str]) {
    let entries: String = serials
        .iter()
        .map(|s| format!("<entry name=\"{s}\"/>"))
        .collect();
    Mock::given(Param("action", "show"))
        .and(Param("xpath", "/device-group/"))
        .respond_with(success(&format!(
            "<result><devices>{entries}</devices></result>"
        )))
        .mount(server)
        .await;
}

#[tokio::test]
async fn create_router_reserves_a_free_device() {
    let server = MockServer::start().await;
    mount_devices(&server, &["SN1", "SN2"]).await;
    catch_all(&server).await;

    let store = Arc::new(InMemoryReservationStore::new());
    store.reserve("other-router", "SN1").await.unwrap();
    let driver = device_driver(&server, store.clone());

    let pending = driver.create_router_precommit(&router()).await.unwrap();
    assert_eq!(store.get("router-1").await.unwrap().device_sn, "SN2");
    assert_eq!(pending.targets(), &[panos_core::CommitTarget::Panorama]);

    let tags: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| param(r, "action").as_deref() == Some("set"))
        .map(|r| param(r, "element").unwrap())
        .collect();
    assert_eq!(tags.len(), 2);
    assert!(tags[0].contains("<entry name='SN2'>"));
    assert!(tags[0].contains("<member>tenant_5f2c9a1b</member>"));
    assert!(tags[1].contains("<member>router_edge</member>"));

    driver.postcommit(pending).await.unwrap();
    let last = server.received_requests().await.unwrap().pop().unwrap();
    assert_eq!(param(&last, "type").as_deref(), Some("commit"));
    assert_eq!(param(&last, "target"), None);
}

#[tokio::test]
async fn create_router_fails_when_group_is_exhausted() {
    let server = MockServer::start().await;
    mount_devices(&server, &["SN1"]).await;

    let store = Arc::new(InMemoryReservationStore::new());
    store.reserve("other-router", "SN1").await.unwrap();
    let driver = device_driver(&server, store.clone());

    let err = driver.create_router_precommit(&router()).await.unwrap_err();
    assert!(
        matches!(err, CoreError::AllocationExhausted { ref device_group } if device_group == "default")
    );
    assert_eq!(store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_tagging_releases_the_reservation() {
    let server = MockServer::start().await;
    mount_devices(&server, &["SN1"]).await;
    Mock::given(Param("action", "set"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryReservationStore::new());
    let driver = device_driver(&server, store.clone());

    let err = driver.create_router_precommit(&router()).await.unwrap_err();
    assert!(matches!(err, CoreError::Transport { .. }));
    assert!(store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn gateway_update_targets_the_router_device() {
    let server = MockServer::start().await;
    catch_all(&server).await;
    let store = Arc::new(InMemoryReservationStore::new());
    store.reserve("router-1", "SN7").await.unwrap();
    let driver = device_driver(&server, store);

    let unchanged = driver
        .update_router_precommit("router-1", GatewayChange::Unchanged)
        .await
        .unwrap();
    assert!(unchanged.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());

    let address: InterfaceAddress = "203.0.113.10/24".parse().unwrap();
    let pending = driver
        .update_router_precommit("router-1", GatewayChange::Set(address))
        .await
        .unwrap();
    assert_eq!(
        pending.targets(),
        &[panos_core::CommitTarget::Device("SN7".into())]
    );

    let nat = config_calls(&server)
        .await
        .into_iter()
        .any(|(a, x)| a == "set" && x.ends_with("/rulebase/nat/rules"));
    assert!(nat);
}

#[tokio::test]
async fn interface_hooks_need_a_reservation() {
    let server = MockServer::start().await;
    catch_all(&server).await;
    let driver = device_driver(&server, Arc::new(InMemoryReservationStore::new()));

    let iface = RouterInterface {
        router_id: "ghost".into(),
        port_id: "p1".into(),
        address: "10.0.0.1/24".parse().unwrap(),
        segmentation_id: 42,
    };
    let err = driver.add_interface_precommit(&iface).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_router_releases_and_untags() {
    let server = MockServer::start().await;
    catch_all(&server).await;
    let store = Arc::new(InMemoryReservationStore::new());
    store.reserve("router-1", "SN3").await.unwrap();
    let driver = device_driver(&server, store.clone());

    let pending = driver.delete_router_precommit(&router()).await.unwrap();
    assert_eq!(pending.targets(), &[panos_core::CommitTarget::Panorama]);
    assert!(store.list_all().await.unwrap().is_empty());

    let deletes: Vec<String> = config_calls(&server)
        .await
        .into_iter()
        .filter(|(a, _)| a == "delete")
        .map(|(_, x)| x)
        .collect();
    assert_eq!(deletes.len(), 2);
    assert!(deletes[0].contains("entry[@name='SN3']"));
    assert!(deletes[0].ends_with("member[text()='tenant_5f2c9a1b']"));
}

#[tokio::test]
async fn failed_untag_keeps_the_reservation() {
    let server = MockServer::start().await;
    Mock::given(Param("action", "delete"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<response status=\"error\"><msg><line>commit lock held</line></msg></response>",
            XML,
        ))
        .mount(&server)
        .await;
    let store = Arc::new(InMemoryReservationStore::new());
    store.reserve("router-1", "SN3").await.unwrap();
    let driver = device_driver(&server, store.clone());

    let err = driver.delete_router_precommit(&router()).await.unwrap_err();
    assert!(matches!(err, CoreError::Protocol { .. }));
    assert_eq!(store.get("router-1").await.unwrap().device_sn, "SN3");
}

#[tokio::test]
async fn instance_address_spans_router_devices() {
    let server = MockServer::start().await;
    catch_all(&server).await;
    let store = Arc::new(InMemoryReservationStore::new());
    store.reserve("router-1", "SN1").await.unwrap();
    store.reserve("router-2", "SN2").await.unwrap();
    let driver = device_driver(&server, store);
    let routers = vec!["router-1".to_string(), "router-2".to_string()];

    driver
        .register_instance_address("10.0.0.5", &["web".into()], &routers)
        .await
        .unwrap();
    let commits: Vec<Option<String>> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| param(r, "type").as_deref() == Some("commit"))
        .map(|r| param(r, "target"))
        .collect();
    assert_eq!(commits, vec![Some("SN1".into()), Some("SN2".into())]);

    let pending = driver
        .unregister_instance_address_precommit("10.0.0.5", &routers)
        .await
        .unwrap();
    assert_eq!(pending.targets().len(), 2);
}
