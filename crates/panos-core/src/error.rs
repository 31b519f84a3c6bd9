// ── Core error types ──
//
// Errors surfaced by the facade, the reservation store and the router
// driver. The `From<panos_api::Error>` impl keeps the device's status
// detail verbatim so operators see what the device said.

use std::time::Duration;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("{message}")]
    Transport { message: String },

    #[error("{message}")]
    Protocol {
        message: String,
        code: Option<String>,
    },

    #[error("Timed out after {}s waiting for job {job_id}", waited.as_secs())]
    Timeout { job_id: String, waited: Duration },

    // ── Lookup errors ────────────────────────────────────────────────
    /// The device reported that an addressed configuration node is absent.
    #[error("{message}")]
    NodeNotFound { message: String },

    #[error("Device reservation for router {router_id} could not be found")]
    ReservationNotFound { router_id: String },

    // ── Allocation errors ────────────────────────────────────────────
    #[error("Device {device_sn} is already reserved by router {router_id}")]
    ReservationConflict { router_id: String, device_sn: String },

    #[error("No more free devices in device group {device_group}")]
    AllocationExhausted { device_group: String },

    // ── Input errors ─────────────────────────────────────────────────
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl CoreError {
    /// Returns `true` for the not-found family (reservations and nodes).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound { .. } | Self::ReservationNotFound { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<panos_api::Error> for CoreError {
    fn from(err: panos_api::Error) -> Self {
        if err.is_no_such_node() {
            return CoreError::NodeNotFound {
                message: err.to_string(),
            };
        }
        match err {
            panos_api::Error::Configuration { message } => CoreError::Configuration { message },
            panos_api::Error::InvalidUrl(e) => CoreError::Configuration {
                message: format!("Invalid URL: {e}"),
            },
            panos_api::Error::Tls(msg) => CoreError::Configuration {
                message: format!("TLS error: {msg}"),
            },
            panos_api::Error::Transport { message, .. } => CoreError::Transport { message },
            panos_api::Error::Protocol { message, code } => CoreError::Protocol { message, code },
            panos_api::Error::Timeout { job_id, waited } => CoreError::Timeout { job_id, waited },
            panos_api::Error::Codec { message } => CoreError::Protocol {
                message,
                code: None,
            },
        }
    }
}
