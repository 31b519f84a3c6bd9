use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `panos-api` crate.
///
/// Covers every failure mode of a single XML API session: construction,
/// transport, response classification, job polling and tree decoding.
/// `panos-core` maps these into its own domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Construction ────────────────────────────────────────────────
    /// Invalid session parameters (port, timeout, hostname, credentials).
    #[error("{message}")]
    Configuration { message: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS trust material could not be loaded.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Transport ───────────────────────────────────────────────────
    /// Network-level failure. The message always starts with `URLError:`.
    #[error("{message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    // ── Protocol ────────────────────────────────────────────────────
    /// The device answered, but the response was not `status="success"`
    /// or could not be classified. `message` is the extracted status detail.
    #[error("{message}")]
    Protocol {
        message: String,
        code: Option<String>,
    },

    // ── Jobs ────────────────────────────────────────────────────────
    /// A commit or log job did not reach `FIN` before the deadline.
    #[error("timeout waiting for job {job_id} completion")]
    Timeout { job_id: String, waited: Duration },

    // ── Data ────────────────────────────────────────────────────────
    /// Input to the tree codec was not a tree nor well-formed markup.
    #[error("config codec error: {message}")]
    Codec { message: String },
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            code: None,
        }
    }

    /// Returns `true` if the device reported that the addressed node does
    /// not exist.
    pub fn is_no_such_node(&self) -> bool {
        match self {
            Self::Protocol { message, .. } => message.trim().eq_ignore_ascii_case("no such node"),
            _ => false,
        }
    }

    /// Returns `true` if a user-id registration failed only because the
    /// address/tag pair is already present on the device.
    pub fn is_already_registered(&self) -> bool {
        match self {
            Self::Protocol { message, .. } => message
                .to_lowercase()
                .contains("already exists, ignore"),
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    ///
    /// Nothing in this crate retries on its own; callers decide.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport {
                source: Some(e), ..
            } => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// The numeric status code attribute of the response, if any.
    pub fn status_code(&self) -> Option<&str> {
        match self {
            Self::Protocol { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}
