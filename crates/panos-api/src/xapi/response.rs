// Response classification and status-detail extraction.
//
// The XML API answers with either an XML document carrying a
// `status` attribute on its root, or a binary attachment. Classification
// never fails outright: anything unexpected yields a non-success
// `ApiResponse` whose `detail` says why.

use std::sync::LazyLock;

use bytes::Bytes;
use regex::Regex;
use tracing::{debug, trace};

use crate::xml::XmlElement;

/// Largest XML body that will be parsed.
pub const MAX_XML_BODY: usize = 64 * 1024 * 1024;

static FILENAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^filename=([-\w]+)$").ok());

/// A file returned by `type=export`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Name from `content-disposition`, when it matched the expected form.
    pub filename: Option<String>,
    pub content: Bytes,
    /// Export category echoed back from the request.
    pub category: Option<String>,
}

/// Classified result of one request.
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    /// Value of the root `status` attribute; `success` for attachments.
    pub status: Option<String>,
    /// Value of the root `code` attribute.
    pub code: Option<String>,
    /// Human-readable status detail.
    pub detail: Option<String>,
    /// Raw XML document text, kept even when parsing failed.
    pub document: Option<String>,
    pub root: Option<XmlElement>,
    pub attachment: Option<Attachment>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }

    /// The `<result>` child of the root, if any.
    pub fn result(&self) -> Option<&XmlElement> {
        self.root.as_ref().and_then(|r| r.find("result"))
    }

    /// Trimmed text at `path` relative to the root.
    pub fn find_text(&self, path: &str) -> Option<&str> {
        self.root.as_ref().and_then(|r| r.find_text(path))
    }

    /// Markup of the whole response; the raw document when parsing failed.
    pub fn xml_root(&self) -> Option<String> {
        match &self.root {
            Some(root) => Some(root.to_xml_string()),
            None => self.document.clone(),
        }
    }

    /// Concatenated markup of the children of `<result>`.
    pub fn xml_result(&self) -> Option<String> {
        let result = self.result()?;
        let out: String = result.children.iter().map(XmlElement::to_xml_string).collect();
        if out.is_empty() { None } else { Some(out) }
    }

    /// Non-success response for an XML body over `limit` bytes. None of
    /// the body is kept.
    pub(crate) fn too_large(limit: usize) -> Self {
        Self::failed(format!("XML body too large: over {limit} bytes"))
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::default()
        }
    }
}

/// Header value split on `;`, lowercased and trimmed.
pub(crate) fn header_tokens(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(';')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Whether the content type is one `classify` parses as XML.
pub(crate) fn is_xml(content_type: Option<&str>) -> bool {
    let types = header_tokens(content_type);
    types.iter().any(|t| t == "application/xml") && types.iter().any(|t| t == "charset=utf-8")
}

/// Classify a response from its content headers and body.
pub(crate) fn classify(
    content_type: Option<&str>,
    content_disposition: Option<&str>,
    body: Bytes,
) -> ApiResponse {
    let types = header_tokens(content_type);
    trace!(content_type = ?types, "classifying response");

    if types.is_empty() {
        return ApiResponse::failed("no content-type response header");
    }
    if types.iter().any(|t| t == "application/octet-stream") {
        return classify_stream(content_disposition, body);
    }
    if is_xml(content_type) {
        return classify_xml(&body);
    }
    ApiResponse::failed(format!("no handler for content-type: {}", types.join("; ")))
}

fn classify_stream(content_disposition: Option<&str>, body: Bytes) -> ApiResponse {
    let disposition = header_tokens(content_disposition);
    if disposition.is_empty() {
        return ApiResponse::failed("no content-disposition response header");
    }
    if !disposition.iter().any(|t| t == "attachment") {
        return ApiResponse::failed(format!(
            "no handler for content-disposition: {}",
            disposition.join("; ")
        ));
    }

    let filename = FILENAME_RE.as_ref().and_then(|re| {
        disposition.iter().find_map(|t| {
            re.captures(t)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_owned())
        })
    });
    debug!(filename = ?filename, bytes = body.len(), "attachment response");

    ApiResponse {
        status: Some("success".into()),
        attachment: Some(Attachment {
            filename,
            content: body,
            category: None,
        }),
        ..ApiResponse::default()
    }
}

fn classify_xml(body: &[u8]) -> ApiResponse {
    if body.len() > MAX_XML_BODY {
        return ApiResponse::too_large(MAX_XML_BODY);
    }
    let document = String::from_utf8_lossy(body).into_owned();

    let root = match XmlElement::parse(&document) {
        Ok(root) => root,
        Err(e) => {
            return ApiResponse {
                detail: Some(e.to_string()),
                document: Some(document),
                ..ApiResponse::default()
            };
        }
    };

    if root.attributes.is_empty() {
        return ApiResponse {
            detail: Some("no response element status attribute".into()),
            document: Some(document),
            root: Some(root),
            ..ApiResponse::default()
        };
    }

    let status = root.attribute("status").map(str::to_owned);
    let code = root.attribute("code").map(str::to_owned);
    let detail = status_detail(&root);
    debug!(status = ?status, code = ?code, "xml response");

    ApiResponse {
        status,
        code,
        detail,
        document: Some(document),
        root: Some(root),
        attachment: None,
    }
}

fn joined(lines: Vec<String>) -> Option<String> {
    if lines.is_empty() { None } else { Some(lines.join("\n")) }
}

/// Probe the known message locations in priority order.
pub(crate) fn status_detail(root: &XmlElement) -> Option<String> {
    // user-id register/unregister results
    let entries = root.find_all("msg/line/uid-response/payload/*/entry");
    if !entries.is_empty() {
        let lines = entries
            .iter()
            .filter_map(|entry| {
                let msg: String = entry
                    .attributes
                    .iter()
                    .map(|(k, v)| format!("{k}: {v} "))
                    .collect();
                let msg = msg.trim_end();
                (!msg.is_empty()).then(|| msg.to_owned())
            })
            .collect();
        return joined(lines);
    }

    let lines = root.find_all("msg/line");
    if !lines.is_empty() {
        let lines = lines
            .iter()
            .filter_map(|line| match &line.text {
                Some(text) if line.children.is_empty() || !text.trim().is_empty() => {
                    Some(text.clone())
                }
                _ => line.find("line").and_then(|l| l.text.clone()),
            })
            .collect();
        return joined(lines);
    }

    let lines = root.find_all("result/msg/line");
    if !lines.is_empty() {
        return joined(lines.iter().filter_map(|l| l.text.clone()).collect());
    }

    if let Some(msg) = root.find("result/msg") {
        return msg.text.clone();
    }

    if let Some(msg) = root.find("msg") {
        return msg.text.clone();
    }

    // `show jobs id N` responses
    let lines = root.find_all("result/job/details/line");
    if !lines.is_empty() {
        let lines = lines
            .iter()
            .filter_map(|line| match &line.text {
                Some(text) if !text.trim().is_empty() => Some(text.clone()),
                _ => line.find("newjob/newmsg").and_then(|m| m.text.clone()),
            })
            .collect();
        return joined(lines);
    }

    None
}
