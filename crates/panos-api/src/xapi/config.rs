// XML API configuration actions
//
// `type=config` requests: read (`show`, `get`) and write (`set`, `edit`,
// `delete`, `move`, `rename`, `clone`) against an xpath.

use tracing::debug;

use crate::error::Error;
use crate::xapi::client::{Params, XapiClient};
use crate::xapi::response::ApiResponse;

/// Destination of a `move` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovePosition {
    Top,
    Bottom,
    Before(String),
    After(String),
}

impl MovePosition {
    fn params(&self) -> Params {
        match self {
            Self::Top => vec![("where", "top".into())],
            Self::Bottom => vec![("where", "bottom".into())],
            Self::Before(dst) => vec![("where", "before".into()), ("dst", dst.clone())],
            Self::After(dst) => vec![("where", "after".into()), ("dst", dst.clone())],
        }
    }
}

impl XapiClient {
    /// Active (running) configuration at `xpath`.
    pub async fn show(&self, xpath: &str) -> Result<ApiResponse, Error> {
        self.type_config("show", xpath, Vec::new()).await
    }

    /// Candidate configuration at `xpath`.
    pub async fn get(&self, xpath: &str) -> Result<ApiResponse, Error> {
        self.type_config("get", xpath, Vec::new()).await
    }

    /// Merge `element` into the node at `xpath`.
    pub async fn set(&self, xpath: &str, element: &str) -> Result<ApiResponse, Error> {
        self.type_config("set", xpath, vec![("element", element.to_owned())])
            .await
    }

    /// Replace the node at `xpath` with `element`.
    pub async fn edit(&self, xpath: &str, element: &str) -> Result<ApiResponse, Error> {
        self.type_config("edit", xpath, vec![("element", element.to_owned())])
            .await
    }

    pub async fn delete(&self, xpath: &str) -> Result<ApiResponse, Error> {
        self.type_config("delete", xpath, Vec::new()).await
    }

    /// Reorder the entry at `xpath` (`action=move`).
    pub async fn move_node(
        &self,
        xpath: &str,
        position: &MovePosition,
    ) -> Result<ApiResponse, Error> {
        self.type_config("move", xpath, position.params()).await
    }

    pub async fn rename(&self, xpath: &str, new_name: &str) -> Result<ApiResponse, Error> {
        self.type_config("rename", xpath, vec![("newname", new_name.to_owned())])
            .await
    }

    /// Copy the node at `from` to `xpath` as `new_name` (`action=clone`).
    pub async fn clone_node(
        &self,
        xpath: &str,
        from: &str,
        new_name: &str,
    ) -> Result<ApiResponse, Error> {
        self.type_config(
            "clone",
            xpath,
            vec![("from", from.to_owned()), ("newname", new_name.to_owned())],
        )
        .await
    }

    async fn type_config(
        &self,
        action: &'static str,
        xpath: &str,
        extra: Params,
    ) -> Result<ApiResponse, Error> {
        debug!(action, xpath, serial = ?self.serial(), "config request");
        let mut params: Params = vec![("type", "config".into()), ("action", action.into())];
        params.push(("xpath", xpath.to_owned()));
        params.extend(extra);
        self.keyed(params, true).await
    }
}
