// Session configuration and reqwest::Client construction.
//
// A `SessionConfig` is the validated, immutable description of one XML API
// endpoint: host, port, scheme, credentials, optional target serial, and
// TLS/timeout settings. Validation happens once in the builder.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::auth::Credentials;
use crate::error::Error;

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed management interfaces).
    DangerAcceptInvalid,
}

/// URL scheme used to reach the `/api/` endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl Scheme {
    fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Validated configuration for one XML API session.
///
/// Cheap to clone; the façade derives per-device configs from a
/// management-node config with [`with_serial`](Self::with_serial).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    hostname: String,
    port: Option<u16>,
    credentials: Credentials,
    serial: Option<String>,
    scheme: Scheme,
    use_get: bool,
    timeout: Option<Duration>,
    tls: TlsMode,
}

impl SessionConfig {
    /// Start building a config for the given management hostname.
    pub fn builder(hostname: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder {
            hostname: Some(hostname.into()),
            ..SessionConfigBuilder::default()
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Target device serial. `None` means the management node itself.
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn use_get(&self) -> bool {
        self.use_get
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Same endpoint, proxied to the managed device with this serial.
    pub fn with_serial(&self, serial: impl Into<String>) -> Self {
        Self {
            serial: Some(serial.into()),
            ..self.clone()
        }
    }

    /// Same endpoint, sending requests as GET query strings.
    pub fn with_get(&self) -> Self {
        Self {
            use_get: true,
            ..self.clone()
        }
    }

    /// `<scheme>://<host>[:<port>]/api/`
    pub fn api_url(&self) -> Result<Url, Error> {
        let mut uri = format!("{}://{}", self.scheme.as_str(), self.hostname);
        if let Some(port) = self.port {
            uri.push_str(&format!(":{port}"));
        }
        uri.push_str("/api/");
        Ok(Url::parse(&uri)?)
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder().user_agent("panos-api/0.1.0");

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

/// Unvalidated session parameters.
///
/// Port and timeout are taken as wide integers so out-of-range input is
/// rejected by [`build`](Self::build) rather than by the type system.
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    hostname: Option<String>,
    port: Option<i64>,
    api_key: Option<SecretString>,
    username: Option<String>,
    password: Option<SecretString>,
    serial: Option<String>,
    scheme: Scheme,
    use_get: bool,
    timeout_secs: Option<i64>,
    tls: TlsMode,
}

impl SessionConfigBuilder {
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn port(mut self, port: i64) -> Self {
        self.port = Some(port);
        self
    }

    pub fn api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: SecretString) -> Self {
        self.password = Some(password);
        self
    }

    pub fn serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn use_get(mut self, use_get: bool) -> Self {
        self.use_get = use_get;
        self
    }

    /// Per-request timeout in seconds. Must be positive.
    pub fn timeout_secs(mut self, secs: i64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    pub fn build(self) -> Result<SessionConfig, Error> {
        let port = match self.port {
            Some(p) => Some(
                u16::try_from(p)
                    .ok()
                    .filter(|p| *p >= 1)
                    .ok_or_else(|| Error::config(format!("Invalid port: {p}")))?,
            ),
            None => None,
        };

        let timeout = match self.timeout_secs {
            Some(t) if t > 0 => Some(Duration::from_secs(t.unsigned_abs())),
            Some(t) => return Err(Error::config(format!("Invalid timeout: {t}"))),
            None => None,
        };

        let hostname = self
            .hostname
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::config("hostname argument required"))?;

        let credentials = match (self.api_key, self.username, self.password) {
            (Some(key), _, _) => Credentials::ApiKey(key),
            (None, Some(username), Some(password)) => Credentials::Password { username, password },
            _ => {
                return Err(Error::config(
                    "api_key or api_username and api_password arguments required",
                ));
            }
        };

        Ok(SessionConfig {
            hostname,
            port,
            credentials,
            serial: self.serial,
            scheme: self.scheme,
            use_get: self.use_get,
            timeout,
            tls: self.tls,
        })
    }
}
