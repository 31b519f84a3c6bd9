// XML API HTTP client
//
// Wraps `reqwest::Client` with `/api/` request encoding, response
// classification, API key acquisition and last-response bookkeeping.
// Request families (config actions, operational commands, jobs) are
// implemented as inherent methods in sibling files.

use std::sync::{PoisonError, RwLock};

use bytes::{Bytes, BytesMut};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, trace};
use url::Url;

use crate::codec::{ConfigTree, Semantic};
use crate::error::Error;
use crate::transport::SessionConfig;
use crate::xapi::response::{ApiResponse, MAX_XML_BODY, classify, is_xml};

/// Query parameters of one request, in insertion order.
pub(crate) type Params = Vec<(&'static str, String)>;

/// Client for one XML API session.
///
/// A session is bound to one endpoint and, optionally, one target device
/// serial proxied through the management node. The API key is derived
/// lazily from username/password when no key was configured, then reused
/// for the rest of the session.
pub struct XapiClient {
    http: reqwest::Client,
    config: SessionConfig,
    url: Url,
    api_key: RwLock<Option<SecretString>>,
    last: RwLock<Option<ApiResponse>>,
}

impl XapiClient {
    /// Create a client, building a `reqwest::Client` from the config.
    pub fn new(config: SessionConfig) -> Result<Self, Error> {
        let http = config.build_client()?;
        Self::with_client(http, config)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, config: SessionConfig) -> Result<Self, Error> {
        let url = config.api_url()?;
        let api_key = config.credentials().api_key().cloned();
        Ok(Self {
            http,
            config,
            url,
            api_key: RwLock::new(api_key),
            last: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Target device serial, if this session is proxied to a device.
    pub fn serial(&self) -> Option<&str> {
        self.config.serial()
    }

    /// The `/api/` endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    // ── Last response ────────────────────────────────────────────────

    /// The most recently classified response, successful or not.
    pub fn last_response(&self) -> Option<ApiResponse> {
        self.last
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Markup of the last response root.
    pub fn xml_root(&self) -> Option<String> {
        self.last_response().and_then(|r| r.xml_root())
    }

    /// Markup of the children of the last response's `<result>`.
    pub fn xml_result(&self) -> Option<String> {
        self.last_response().and_then(|r| r.xml_result())
    }

    /// Semantic tree of the last response: the whole root, or only the
    /// first child of `<result>` when `from_result_only` is set.
    pub fn raw_config_tree(&self, from_result_only: bool) -> Option<Semantic> {
        let last = self.last_response()?;
        let root = last.root?;
        let elem = if from_result_only {
            root.find("result")?.children.first()?.clone()
        } else {
            root
        };
        Some(ConfigTree::from(elem).to_semantic())
    }

    fn store(&self, response: Option<ApiResponse>) {
        *self.last.write().unwrap_or_else(PoisonError::into_inner) = response;
    }

    // ── API key ──────────────────────────────────────────────────────

    /// Exchange username/password for an API key (`type=keygen`).
    ///
    /// The key is cached for every later request of this session.
    pub async fn keygen(&self) -> Result<SecretString, Error> {
        let Some((username, password)) = self.config.credentials().login() else {
            return Err(Error::config(
                "api_username and api_password arguments required",
            ));
        };

        let mut params: Params = vec![
            ("type", "keygen".into()),
            ("user", username.to_owned()),
            ("password", password.expose_secret().to_owned()),
        ];
        if let Some(serial) = self.serial() {
            params.push(("target", serial.to_owned()));
        }

        debug!(user = username, serial = ?self.serial(), "generating API key");
        let response = self.send(&params, None).await?;

        let result = response
            .result()
            .ok_or_else(|| Error::protocol("keygen(): result element not found"))?;
        let key = result
            .find("key")
            .ok_or_else(|| Error::protocol("keygen(): key element not found"))?;
        let key = SecretString::from(key.text.clone().unwrap_or_default());

        *self.api_key.write().unwrap_or_else(PoisonError::into_inner) = Some(key.clone());
        Ok(key)
    }

    /// The session API key, generating one on first use if needed.
    pub(crate) async fn api_key(&self) -> Result<SecretString, Error> {
        let cached = self
            .api_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match cached {
            Some(key) => Ok(key),
            None => self.keygen().await,
        }
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Form-encode `params`, appending the key last and verbatim.
    pub(crate) fn encode_query(params: &[(&str, String)], key: Option<&SecretString>) -> String {
        let mut data = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .finish();
        if let Some(key) = key {
            if !data.is_empty() {
                data.push('&');
            }
            data.push_str("key=");
            data.push_str(key.expose_secret());
        }
        data
    }

    /// Send a keyed request. `target` is appended when `with_target` is set
    /// and the session has a serial.
    pub(crate) async fn keyed(
        &self,
        mut params: Params,
        with_target: bool,
    ) -> Result<ApiResponse, Error> {
        let key = self.api_key().await?;
        if with_target {
            if let Some(serial) = self.serial() {
                params.push(("target", serial.to_owned()));
            }
        }
        self.send(&params, Some(&key)).await
    }

    /// Send one request and classify the response.
    ///
    /// The classified response is recorded as the last response; a
    /// non-success classification is returned as [`Error::Protocol`]
    /// carrying the status detail.
    pub(crate) async fn send(
        &self,
        params: &[(&str, String)],
        key: Option<&SecretString>,
    ) -> Result<ApiResponse, Error> {
        self.store(None);
        let data = Self::encode_query(params, key);
        let req_type = params
            .iter()
            .find(|(k, _)| *k == "type")
            .map_or("", |(_, v)| v.as_str());

        let request = if self.config.use_get() {
            let mut url = self.url.clone();
            url.set_query(Some(&data));
            debug!(req_type, serial = ?self.serial(), "GET {}", self.url);
            self.http.get(url)
        } else {
            debug!(req_type, serial = ?self.serial(), "POST {}", self.url);
            self.http
                .post(self.url.clone())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(data)
        };

        let resp = request.send().await.map_err(|e| Error::Transport {
            message: format!("URLError: reason: {e}"),
            source: Some(e),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Transport {
                message: format!(
                    "URLError: code: {} reason: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("unknown")
                ),
                source: None,
            });
        }

        let content_type = header_string(resp.headers(), CONTENT_TYPE);
        let disposition = header_string(resp.headers(), CONTENT_DISPOSITION);
        let limit = is_xml(content_type.as_deref()).then_some(MAX_XML_BODY);
        let response = match read_body(resp, limit).await? {
            Some(body) => {
                trace!(bytes = body.len(), "response body received");
                classify(content_type.as_deref(), disposition.as_deref(), body)
            }
            None => ApiResponse::too_large(MAX_XML_BODY),
        };
        self.store(Some(response.clone()));

        if response.is_success() {
            Ok(response)
        } else {
            debug!(status = ?response.status, code = ?response.code, "request failed");
            Err(Error::Protocol {
                message: response.detail.clone().unwrap_or_default(),
                code: response.code.clone(),
            })
        }
    }
}

/// Read the body, giving up with `None` once it exceeds `limit` bytes.
async fn read_body(
    mut resp: reqwest::Response,
    limit: Option<usize>,
) -> Result<Option<Bytes>, Error> {
    let Some(limit) = limit else {
        return resp.bytes().await.map(Some).map_err(body_error);
    };
    let declared = resp
        .content_length()
        .and_then(|n| usize::try_from(n).ok());
    if declared.is_some_and(|n| n > limit) {
        debug!(limit, declared = ?declared, "response body over limit");
        return Ok(None);
    }

    let mut body = BytesMut::with_capacity(declared.unwrap_or_default());
    while let Some(chunk) = resp.chunk().await.map_err(body_error)? {
        if body.len() + chunk.len() > limit {
            debug!(limit, "response body over limit");
            return Ok(None);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(Some(body.freeze()))
}

fn body_error(e: reqwest::Error) -> Error {
    Error::Transport {
        message: format!("URLError: reason: {e}"),
        source: Some(e),
    }
}

fn header_string(
    headers: &reqwest::header::HeaderMap,
    name: reqwest::header::HeaderName,
) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn key_is_appended_last_and_verbatim() {
        let params: Params = vec![
            ("type", "config".into()),
            ("xpath", "/config/devices/entry[@name='x']".into()),
        ];
        let key = SecretString::from("LUFRPT1a%2Bb==".to_string());
        let data = XapiClient::encode_query(&params, Some(&key));
        assert_eq!(
            data,
            "type=config&xpath=%2Fconfig%2Fdevices%2Fentry%5B%40name%3D%27x%27%5D&key=LUFRPT1a%2Bb=="
        );
    }

    #[test]
    fn encode_without_key() {
        let params: Params = vec![("type", "keygen".into()), ("user", "a b".into())];
        assert_eq!(XapiClient::encode_query(&params, None), "type=keygen&user=a+b");
    }

    async fn serve(body: Vec<u8>) -> (wiremock::MockServer, reqwest::Response) {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;
        let resp = reqwest::get(server.uri()).await.unwrap();
        (server, resp)
    }

    #[tokio::test]
    async fn body_over_limit_is_not_buffered() {
        let (_server, resp) = serve(vec![b'x'; 2048]).await;
        assert_eq!(read_body(resp, Some(1024)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn body_within_limit_is_read_whole() {
        let (_server, resp) = serve(vec![b'x'; 2048]).await;
        let body = read_body(resp, Some(2048)).await.unwrap().unwrap();
        assert_eq!(body.len(), 2048);

        let (_server, resp) = serve(vec![b'x'; 2048]).await;
        let body = read_body(resp, None).await.unwrap().unwrap();
        assert_eq!(body.len(), 2048);
    }
}
