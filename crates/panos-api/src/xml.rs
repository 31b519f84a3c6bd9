// ── Owned XML element tree ──
//
// Wire responses are parsed with `roxmltree` and copied into an owned
// `XmlElement` so the last response can outlive the body buffer. Only
// element structure, attributes (in document order) and the leading text
// of each element are kept; that is all the XML API ever puts on the wire.

use std::fmt::Write as _;

use crate::error::Error;

/// One element of a parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    /// Text before the first child element, as received.
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Parse a document and return its root element.
    pub fn parse(document: &str) -> Result<Self, Error> {
        let doc = roxmltree::Document::parse(document).map_err(|e| Error::Codec {
            message: format!("XML parse error: {e}"),
        })?;
        Ok(Self::from_node(doc.root_element()))
    }

    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        Self {
            tag: node.tag_name().name().to_owned(),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_owned(), a.value().to_owned()))
                .collect(),
            text: node.text().map(str::to_owned),
            children: node
                .children()
                .filter(roxmltree::Node::is_element)
                .map(Self::from_node)
                .collect(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Text with surrounding whitespace removed; `None` when blank.
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn is_empty_leaf(&self) -> bool {
        self.children.is_empty() && self.trimmed_text().is_none() && self.attributes.is_empty()
    }

    /// All descendants matching a relative path.
    ///
    /// Steps are separated by `/`. A step is a tag name, `*`, or
    /// `tag[@attr='value']`. A leading `./` is accepted.
    pub fn find_all<'a>(&'a self, path: &str) -> Vec<&'a XmlElement> {
        let mut current: Vec<&'a XmlElement> = vec![self];
        for raw in split_path(path) {
            if raw == "." {
                continue;
            }
            let step = Step::parse(raw);
            let mut next = Vec::new();
            for elem in current {
                for child in &elem.children {
                    if step.matches(child) {
                        next.push(child);
                    }
                }
            }
            current = next;
        }
        current
    }

    /// First descendant matching a relative path.
    pub fn find<'a>(&'a self, path: &str) -> Option<&'a XmlElement> {
        self.find_all(path).into_iter().next()
    }

    /// Trimmed text of the first descendant matching `path`.
    pub fn find_text(&self, path: &str) -> Option<&str> {
        self.find(path).and_then(XmlElement::trimmed_text)
    }

    /// Serialize back to markup.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (k, v) in &self.attributes {
            let _ = write!(out, " {k}=\"{}\"", escape(v));
        }
        if self.children.is_empty() && self.text.is_none() {
            out.push_str(" />");
            return;
        }
        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&escape(text));
        }
        for child in &self.children {
            child.write_xml(out);
        }
        let _ = write!(out, "</{}>", self.tag);
    }
}

/// Escape text for inclusion in element content or a quoted attribute.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// Split on `/` outside of `[...]` predicates; values like `ethernet1/1`
// live inside predicates.
fn split_path(path: &str) -> Vec<&str> {
    let path = path.strip_prefix("./").unwrap_or(path);
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in path.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => {
                if i > start {
                    parts.push(&path[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < path.len() {
        parts.push(&path[start..]);
    }
    parts
}

struct Step<'p> {
    tag: &'p str,
    predicate: Option<(&'p str, &'p str)>,
}

impl<'p> Step<'p> {
    fn parse(raw: &'p str) -> Self {
        let Some((tag, rest)) = raw.split_once('[') else {
            return Self {
                tag: raw,
                predicate: None,
            };
        };
        let predicate = rest
            .strip_suffix(']')
            .and_then(|p| p.strip_prefix('@'))
            .and_then(|p| p.split_once('='))
            .map(|(name, value)| (name, value.trim_matches(|c| c == '\'' || c == '"')));
        Self { tag, predicate }
    }

    fn matches(&self, elem: &XmlElement) -> bool {
        if self.tag != "*" && self.tag != elem.tag {
            return false;
        }
        match self.predicate {
            Some((name, value)) => elem.attribute(name) == Some(value),
            None => true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const DOC: &str = r#"<config version="10.1.0">
  <devices>
    <entry name="localhost.localdomain">
      <network>
        <interface><ethernet>
          <entry name="ethernet1/1"><layer3><ip><entry name="10.0.0.1/24"/></ip></layer3></entry>
          <entry name="ethernet1/2"><layer3/></entry>
        </ethernet></interface>
      </network>
    </entry>
  </devices>
</config>"#;

    #[test]
    fn parse_keeps_attributes_and_children() {
        let root = XmlElement::parse(DOC).unwrap();
        assert_eq!(root.tag, "config");
        assert_eq!(root.attribute("version"), Some("10.1.0"));
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn find_all_follows_predicates_with_slashes() {
        let root = XmlElement::parse(DOC).unwrap();
        let ip = root.find_all(
            "./devices/entry[@name='localhost.localdomain']/network/interface/ethernet/entry[@name='ethernet1/1']/layer3/ip/entry",
        );
        assert_eq!(ip.len(), 1);
        assert_eq!(ip[0].attribute("name"), Some("10.0.0.1/24"));
    }

    #[test]
    fn find_all_wildcard() {
        let root = XmlElement::parse(DOC).unwrap();
        let all = root.find_all("devices/*/network/interface/ethernet/*");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn parse_rejects_malformed_markup() {
        let err = XmlElement::parse("<response><unclosed></response>").unwrap_err();
        assert!(matches!(err, Error::Codec { .. }));
    }

    #[test]
    fn serializes_with_escaping() {
        let elem = XmlElement::new("tag")
            .with_attribute("name", "a&b")
            .with_child(XmlElement::new("member").with_text("x<y"))
            .with_child(XmlElement::new("empty"));
        assert_eq!(
            elem.to_xml_string(),
            r#"<tag name="a&amp;b"><member>x&lt;y</member><empty /></tag>"#
        );
    }
}
