// panos-api: Async Rust client for the PAN-OS / Panorama XML API

pub mod auth;
pub mod codec;
pub mod commit;
pub mod error;
pub mod transport;
pub mod xapi;
pub mod xml;

pub use auth::Credentials;
pub use codec::{ConfigTree, DEFAULT_FORCE_LIST, Semantic};
pub use commit::{CommitRequest, PartialPart};
pub use error::Error;
pub use transport::{Scheme, SessionConfig, SessionConfigBuilder, TlsMode};
pub use xapi::{ApiResponse, Attachment, JobPolling, MovePosition, XapiClient, cmd_xml};
pub use xml::XmlElement;
