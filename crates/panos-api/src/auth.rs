use secrecy::SecretString;

/// Credentials for authenticating with a PAN-OS or Panorama endpoint.
///
/// Each variant carries the secret material needed for its auth flow.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Pre-generated API key, sent as the `key` request parameter.
    ApiKey(SecretString),

    /// Administrator login. Exchanged for an API key (`type=keygen`) on
    /// the first request of a session that needs one.
    Password {
        username: String,
        password: SecretString,
    },
}

impl Credentials {
    /// Username/password pair, when these credentials can run a keygen.
    pub fn login(&self) -> Option<(&str, &SecretString)> {
        match self {
            Self::Password { username, password } => Some((username, password)),
            Self::ApiKey(_) => None,
        }
    }

    /// The static API key, if one was configured.
    pub fn api_key(&self) -> Option<&SecretString> {
        match self {
            Self::ApiKey(key) => Some(key),
            Self::Password { .. } => None,
        }
    }
}
