// XML API session client
//
// `client` holds transport mechanics; request families live in `config`
// (type=config) and `ops` (op, user-id, commit, log, export).

pub mod client;
pub mod config;
pub mod ops;
pub mod response;

pub use client::XapiClient;
pub use config::MovePosition;
pub use ops::{JobPolling, cmd_xml};
pub use response::{ApiResponse, Attachment};
