// Commit command builder.
//
// Accumulates commit flags and renders the `cmd` element for a
// `type=commit` request: `<commit>` for a single device or the management
// node, `<commit-all><shared-policy>` for a whole device group.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use strum::{Display, EnumIter, EnumString};
use tracing::warn;

use crate::xml::escape;

/// Configuration areas a partial commit can exclude or restrict to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum PartialPart {
    DeviceAndNetworkExcluded,
    PolicyAndObjectsExcluded,
    SharedObjectExcluded,
    NoVsys,
    Vsys,
}

impl PartialPart {
    fn render(self, vsys: &BTreeSet<String>, out: &mut String) {
        match self {
            Self::DeviceAndNetworkExcluded => {
                out.push_str("<device-and-network>excluded</device-and-network>");
            }
            Self::PolicyAndObjectsExcluded => {
                out.push_str("<policy-and-objects>excluded</policy-and-objects>");
            }
            Self::SharedObjectExcluded => {
                out.push_str("<shared-object>excluded</shared-object>");
            }
            Self::NoVsys => out.push_str("<no-vsys></no-vsys>"),
            Self::Vsys => {
                out.push_str("<vsys>");
                for name in vsys {
                    let _ = write!(out, "<member>{}</member>", escape(name));
                }
                out.push_str("</vsys>");
            }
        }
    }
}

/// Builder for a commit command.
///
/// ```
/// use panos_api::{CommitRequest, PartialPart};
///
/// let cmd = CommitRequest::new()
///     .partial(PartialPart::SharedObjectExcluded)
///     .render();
/// assert_eq!(
///     cmd,
///     "<commit><partial><shared-object>excluded</shared-object></partial></commit>"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitRequest {
    force: bool,
    commit_all: bool,
    merge_with_candidate: bool,
    partial: BTreeSet<PartialPart>,
    vsys: BTreeSet<String>,
    device: Option<String>,
    device_group: Option<String>,
}

impl CommitRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Switch to whole-device-group mode (`commit-all`).
    pub fn commit_all(mut self, commit_all: bool) -> Self {
        self.commit_all = commit_all;
        self
    }

    pub fn merge_with_candidate(mut self, merge: bool) -> Self {
        self.merge_with_candidate = merge;
        self
    }

    /// Add a partial-commit part. Ignored in `commit-all` mode.
    pub fn partial(mut self, part: PartialPart) -> Self {
        self.partial.insert(part);
        self
    }

    /// Restrict the commit to a vsys. In targeted mode this also adds the
    /// [`PartialPart::Vsys`] part.
    pub fn vsys(mut self, name: impl Into<String>) -> Self {
        self.vsys.insert(name.into());
        if !self.commit_all {
            self.partial.insert(PartialPart::Vsys);
        }
        self
    }

    pub fn device(mut self, serial: impl Into<String>) -> Self {
        self.device = Some(serial.into());
        self
    }

    pub fn device_group(mut self, name: impl Into<String>) -> Self {
        self.device_group = Some(name.into());
        self
    }

    pub fn is_commit_all(&self) -> bool {
        self.commit_all
    }

    /// Render the `cmd` element.
    pub fn render(&self) -> String {
        if self.commit_all {
            self.render_commit_all()
        } else {
            self.render_targeted()
        }
    }

    fn render_commit_all(&self) -> String {
        let mut out = String::from("<commit-all><shared-policy>");
        if let Some(device) = &self.device {
            let _ = write!(out, "<device>{}</device>", escape(device));
        }
        if let Some(group) = &self.device_group {
            let _ = write!(out, "<device-group>{}</device-group>", escape(group));
        }
        let merge = if self.merge_with_candidate { "yes" } else { "no" };
        let _ = write!(
            out,
            "<merge-with-candidate-cfg>{merge}</merge-with-candidate-cfg>"
        );
        // commit-all accepts a single vsys; the lowest name wins.
        if let Some(first) = self.vsys.first() {
            if self.vsys.len() > 1 {
                warn!(
                    vsys = %first,
                    dropped = self.vsys.len() - 1,
                    "commit-all renders only one vsys"
                );
            }
            let _ = write!(out, "<vsys>{}</vsys>", escape(first));
        }
        out.push_str("</shared-policy></commit-all>");
        out
    }

    fn render_targeted(&self) -> String {
        let mut out = String::from("<commit>");
        if self.force {
            out.push_str("<force>");
        }
        if !self.partial.is_empty() {
            out.push_str("<partial>");
            for part in &self.partial {
                part.render(&self.vsys, &mut out);
            }
            out.push_str("</partial>");
        }
        if self.force {
            out.push_str("</force>");
        }
        out.push_str("</commit>");
        out
    }
}
