// ── Configuration tree codec ──
//
// Converts a wire tree into a semantic value tree (mappings, sequences,
// booleans) and renders linearized views of it: `path="value"` leaves and
// `set`-style command lines.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::trace;

use crate::error::Error;
use crate::xml::XmlElement;

/// Tags that always become sequences, regardless of cardinality.
pub const DEFAULT_FORCE_LIST: [&str; 2] = ["entry", "member"];

/// Semantic view of a configuration subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Semantic {
    /// Empty element: no children, no text, no attributes.
    Null,
    /// Leaf text of exactly `yes` / `no`.
    Bool(bool),
    Text(String),
    Map(IndexMap<String, Semantic>),
    List(Vec<Semantic>),
}

impl Semantic {
    pub fn get(&self, key: &str) -> Option<&Semantic> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Walk a chain of mapping keys.
    pub fn path<'a>(&'a self, keys: &[&str]) -> Option<&'a Semantic> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Semantic]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// A configuration subtree plus the force-list used to decode it.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    root: XmlElement,
    force_list: BTreeSet<String>,
}

impl From<XmlElement> for ConfigTree {
    fn from(root: XmlElement) -> Self {
        Self {
            root,
            force_list: DEFAULT_FORCE_LIST.iter().map(|t| (*t).to_owned()).collect(),
        }
    }
}

impl ConfigTree {
    /// Parse markup text into a tree.
    pub fn parse(markup: &str) -> Result<Self, Error> {
        XmlElement::parse(markup).map(Self::from)
    }

    /// Replace the force-list.
    pub fn with_force_list<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force_list = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    // ── Semantic conversion ──────────────────────────────────────────

    /// `{root_tag: value}` for the whole tree.
    pub fn to_semantic(&self) -> Semantic {
        let mut top = IndexMap::new();
        self.insert_node(&self.root, &mut top, false);
        Semantic::Map(top)
    }

    /// Semantic view of every node matching `path`; one `{tag: value}`
    /// mapping when a single node matches, `{tag: {tag: value}}` per node
    /// otherwise. `None` when nothing matches.
    pub fn to_semantic_at(&self, path: &str) -> Option<Semantic> {
        let nodes = self.root.find_all(path);
        match nodes.as_slice() {
            [] => None,
            [single] => {
                let mut top = IndexMap::new();
                self.insert_node(single, &mut top, false);
                Some(Semantic::Map(top))
            }
            many => {
                let mut top = IndexMap::new();
                for node in many {
                    let mut inner = IndexMap::new();
                    self.insert_node(node, &mut inner, false);
                    top.insert(node.tag.clone(), Semantic::Map(inner));
                }
                Some(Semantic::Map(top))
            }
        }
    }

    fn insert_node(&self, elem: &XmlElement, obj: &mut IndexMap<String, Semantic>, listed: bool) {
        trace!(tag = %elem.tag, listed, "decoding node");
        let text = elem.trimmed_text();
        let is_leaf = elem.children.is_empty() && elem.attributes.is_empty();

        if listed {
            let slot = obj.entry(elem.tag.clone()).or_insert_with(|| Semantic::List(Vec::new()));
            if !matches!(slot, Semantic::List(_)) {
                let previous = std::mem::replace(slot, Semantic::List(Vec::new()));
                if let Semantic::List(items) = slot {
                    items.push(previous);
                }
            }
            let value = match (is_leaf, text) {
                (true, None) => Semantic::Null,
                (true, Some(_)) => Semantic::Text(elem.text.clone().unwrap_or_default()),
                (false, _) => Semantic::Map(self.build_map(elem)),
            };
            if let Semantic::List(items) = slot {
                items.push(value);
            }
            return;
        }

        let value = match (is_leaf, text) {
            (true, None) => Semantic::Null,
            (true, Some("yes")) => Semantic::Bool(true),
            (true, Some("no")) => Semantic::Bool(false),
            (true, Some(_)) => Semantic::Text(elem.text.clone().unwrap_or_default()),
            (false, _) => Semantic::Map(self.build_map(elem)),
        };
        obj.insert(elem.tag.clone(), value);
    }

    fn build_map(&self, elem: &XmlElement) -> IndexMap<String, Semantic> {
        let mut map = IndexMap::new();
        for (k, v) in &elem.attributes {
            map.insert(k.clone(), Semantic::Text(v.clone()));
        }
        if elem.trimmed_text().is_some() {
            map.insert(
                elem.tag.clone(),
                Semantic::Text(elem.text.clone().unwrap_or_default()),
            );
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for child in &elem.children {
            *counts.entry(child.tag.as_str()).or_default() += 1;
        }
        for child in &elem.children {
            let listed = self.force_list.contains(&child.tag)
                || counts.get(child.tag.as_str()).copied().unwrap_or(0) > 1;
            self.insert_node(child, &mut map, listed);
        }
        map
    }

    // ── Flat leaf view ───────────────────────────────────────────────

    /// One entry per node: bare path for text-less nodes, `path="text"`
    /// for text, `path[n]="line"` per line of multi-line text, and the
    /// path extended with `[@k='v']` for each attribute.
    pub fn flatten(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        flatten_node(&self.root, format!("{prefix}{}", self.root.tag), &mut out);
        out
    }

    // ── set-command view ─────────────────────────────────────────────

    /// Command-style lines. `name` attributes extend the path (quoted when
    /// they contain a space); with `collapse_members`, a node with more than
    /// one `<member>` child renders as `path [ a b c ]`.
    pub fn to_command_lines(&self, prefix: &str, collapse_members: bool) -> Vec<String> {
        let mut out = Vec::new();
        command_node(
            &self.root,
            format!("{prefix}{}", self.root.tag),
            &mut out,
            collapse_members,
        );
        out
    }

    // ── Config inspection ────────────────────────────────────────────

    /// `version` attribute of a `<config>` root.
    pub fn config_version(&self) -> Option<&str> {
        if self.root.tag != "config" {
            return None;
        }
        self.root.attribute("version")
    }

    /// Whether a `<config>` root is a Panorama configuration.
    pub fn is_panorama(&self) -> bool {
        self.root.tag == "config"
            && (self.root.find("panorama").is_some()
                || self
                    .root
                    .find("devices/entry[@name='localhost.localdomain']/device-group")
                    .is_some())
    }

    /// Whether a `<config>` root defines more than one vsys.
    pub fn is_multi_vsys(&self) -> bool {
        self.root.tag == "config"
            && self
                .root
                .find_all("devices/entry[@name='localhost.localdomain']/vsys/entry")
                .len()
                > 1
    }
}

fn flatten_node(elem: &XmlElement, mut path: String, out: &mut Vec<String>) {
    match (elem.trimmed_text(), elem.text.as_deref()) {
        (Some(_), Some(text)) => {
            let lines: Vec<&str> = text.lines().collect();
            if lines.len() > 1 {
                for (n, line) in lines.iter().enumerate() {
                    out.push(format!("{path}[{}]=\"{line}\"", n + 1));
                }
            } else {
                out.push(format!("{path}=\"{text}\""));
            }
        }
        _ => out.push(path.clone()),
    }

    for (k, v) in &elem.attributes {
        path.push_str(&format!("[@{k}='{v}']"));
        out.push(path.clone());
    }

    for child in &elem.children {
        flatten_node(child, format!("{path}/{}", child.tag), out);
    }
}

fn quote_space(s: &str) -> String {
    if s.contains(' ') {
        format!("\"{s}\"")
    } else {
        s.to_owned()
    }
}

fn command_node(elem: &XmlElement, mut path: String, out: &mut Vec<String>, collapse: bool) {
    if let Some(name) = elem.attribute("name") {
        path.push(' ');
        path.push_str(&quote_space(name));
    }

    if collapse {
        let members: Vec<&XmlElement> = elem.children.iter().filter(|c| c.tag == "member").collect();
        if members.len() > 1 {
            let rendered: Vec<String> = members
                .iter()
                .map(|m| quote_space(m.text.as_deref().unwrap_or_default()))
                .collect();
            out.push(format!("{path} [ {} ]", rendered.join(" ")));
            return;
        }
    }

    if elem.children.is_empty() {
        if elem.trimmed_text().is_some() {
            path.push(' ');
            path.push_str(&quote_space(elem.text.as_deref().unwrap_or_default()));
        }
        out.push(path.clone());
    }

    for child in &elem.children {
        let child_path = if DEFAULT_FORCE_LIST.contains(&child.tag.as_str()) {
            path.clone()
        } else {
            format!("{path} {}", child.tag)
        };
        command_node(child, child_path, out, collapse);
    }
}
