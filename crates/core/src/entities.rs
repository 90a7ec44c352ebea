//! The three entity documents and their on-disk JSON shape.
//!
//! Field names are the fixed on-disk schema (PascalCase); serde renames
//! map them onto idiomatic Rust fields. Every document carries a
//! `Version` field, the integer schema-generation marker.

use crate::ids::{ProjectId, WorkspaceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Earliest schema generation the migration engine understands.
pub const GENERATION_4: u32 = 4;
/// Workspace documents live at the account root from this generation on.
pub const GENERATION_5: u32 = 5;
/// Project documents live at the account root from this generation on.
pub const GENERATION_6: u32 = 6;
/// One workspace per account is enforced from this generation on.
pub const GENERATION_7: u32 = 7;
/// The generation every document carries after migration.
pub const CURRENT_GENERATION: u32 = GENERATION_7;

/// Workspace name used when the platform creates one on a user's behalf,
/// and the survivor name preferred by multi-workspace consolidation.
pub const DEFAULT_WORKSPACE_NAME: &str = "Workspace";

/// Version marker for the access-rights sub-structure.
pub const ACCESS_RIGHTS_VERSION: &str = "3";

/// Name of the account document inside an account's root folder.
pub const ACCOUNT_DOCUMENT: &str = "user";

/// Name of the per-workspace document used by legacy layouts that nested
/// it inside the workspace folder.
pub const NESTED_WORKSPACE_DOCUMENT: &str = "workspace";

/// On-disk field holding the schema generation.
pub const FIELD_VERSION: &str = "Version";
/// On-disk field holding an entity's unique id.
pub const FIELD_UNIQUE_ID: &str = "UniqueId";
/// On-disk field holding an entity's display name.
pub const FIELD_FULL_NAME: &str = "FullName";
/// On-disk field holding an account's workspace-id set.
pub const FIELD_WORKSPACE_IDS: &str = "WorkspaceIds";
/// On-disk field holding a workspace's project-name set.
pub const FIELD_PROJECT_NAMES: &str = "ProjectNames";
/// On-disk field holding a project's owning workspace id.
pub const FIELD_WORKSPACE_ID: &str = "WorkspaceId";
/// On-disk field holding a project's encoded content location.
pub const FIELD_CONTENT_LOCATION: &str = "ContentLocation";

/// Method mask granting full access in an [`AccessRight`].
pub const ACCESS_ALL: u32 = 15;

/// A single access-rights grant inside an account's property bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccessRight {
    /// Bit mask of permitted methods.
    pub method: u32,
    /// The URI the grant applies to.
    pub uri: String,
}

/// Open property bag attached to every entity.
///
/// The known keys are typed; everything else is preserved verbatim in
/// `extra` so documents written by newer schema generations survive a
/// read-modify-write cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    /// Version of the access-rights structure, when present.
    #[serde(rename = "UserRightsVersion", skip_serializing_if = "Option::is_none")]
    pub user_rights_version: Option<String>,
    /// Access-rights grants, when present.
    #[serde(rename = "UserRights", skip_serializing_if = "Option::is_none")]
    pub user_rights: Option<Vec<AccessRight>>,
    /// Unknown keys, preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Properties {
    /// Grant the standard rights over an account's own user record.
    pub fn grant_account_rights(&mut self, account_id: &str) {
        self.user_rights_version = Some(ACCESS_RIGHTS_VERSION.to_string());
        let rights = self.user_rights.get_or_insert_with(Vec::new);
        rights.push(AccessRight {
            method: ACCESS_ALL,
            uri: format!("/users/{account_id}"),
        });
    }

    /// Grant the standard rights over a workspace and its file tree.
    pub fn grant_workspace_rights(&mut self, workspace_id: &WorkspaceId) {
        self.user_rights_version = Some(ACCESS_RIGHTS_VERSION.to_string());
        let rights = self.user_rights.get_or_insert_with(Vec::new);
        for uri in [
            format!("/workspace/{workspace_id}"),
            format!("/workspace/{workspace_id}/*"),
            format!("/file/{workspace_id}"),
            format!("/file/{workspace_id}/*"),
        ] {
            rights.push(AccessRight {
                method: ACCESS_ALL,
                uri,
            });
        }
    }

    /// Drop every grant that mentions the given workspace id.
    pub fn revoke_workspace_rights(&mut self, workspace_id: &WorkspaceId) {
        if let Some(rights) = self.user_rights.as_mut() {
            let prefix = format!("/workspace/{workspace_id}");
            let file_prefix = format!("/file/{workspace_id}");
            rights.retain(|r| !r.uri.starts_with(&prefix) && !r.uri.starts_with(&file_prefix));
        }
    }
}

/// Top-level owner entity: an end user of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Account {
    /// Schema generation this document was written at.
    pub version: u32,
    /// Unique id; also the login name.
    pub unique_id: String,
    /// Login name.
    pub user_name: String,
    /// Display name.
    pub full_name: String,
    /// Credential material. Opaque to this layer.
    #[serde(default)]
    pub credential: String,
    /// Ordered set of workspace ids this account owns.
    pub workspace_ids: Vec<WorkspaceId>,
    /// Open property bag, including the access-rights sub-structure.
    #[serde(default)]
    pub properties: Properties,
}

impl Account {
    /// Create a fresh account at the current generation with the standard
    /// rights over its own record.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let mut properties = Properties::default();
        properties.grant_account_rights(&id);
        Account {
            version: CURRENT_GENERATION,
            unique_id: id.clone(),
            user_name: id.clone(),
            full_name: id,
            credential: String::new(),
            workspace_ids: Vec::new(),
            properties,
        }
    }
}

/// A named container of projects, owned by exactly one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Workspace {
    /// Schema generation this document was written at.
    pub version: u32,
    /// Identifier derived from `(account id, workspace name)`.
    pub unique_id: WorkspaceId,
    /// Owning account id.
    pub user_id: String,
    /// Display name.
    pub full_name: String,
    /// Ordered set of project names this workspace contains.
    pub project_names: Vec<String>,
    /// Open property bag.
    #[serde(default)]
    pub properties: Properties,
}

impl Workspace {
    /// Create a fresh workspace at the current generation.
    pub fn new(id: WorkspaceId, account_id: impl Into<String>, name: impl Into<String>) -> Self {
        Workspace {
            version: CURRENT_GENERATION,
            unique_id: id,
            user_id: account_id.into(),
            full_name: name.into(),
            project_names: Vec::new(),
            properties: Properties::default(),
        }
    }
}

/// A named unit with its own file-tree root, owned by exactly one workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Project {
    /// Schema generation this document was written at.
    pub version: u32,
    /// Identifier derived from the project name.
    pub unique_id: ProjectId,
    /// Owning workspace id.
    pub workspace_id: WorkspaceId,
    /// Display name.
    pub full_name: String,
    /// Encoded reference to the working-tree root directory.
    pub content_location: String,
    /// Open property bag.
    #[serde(default)]
    pub properties: Properties,
}

impl Project {
    /// Create a fresh project at the current generation.
    pub fn new(
        id: ProjectId,
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        content_location: impl Into<String>,
    ) -> Self {
        Project {
            version: CURRENT_GENERATION,
            unique_id: id,
            workspace_id,
            full_name: name.into(),
            content_location: content_location.into(),
            properties: Properties::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids;

    #[test]
    fn account_document_shape() {
        let account = Account::new("alice");
        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["Version"], CURRENT_GENERATION);
        assert_eq!(json["UniqueId"], "alice");
        assert_eq!(json["UserName"], "alice");
        assert!(json["WorkspaceIds"].as_array().unwrap().is_empty());
        let rights = &json["Properties"]["UserRights"];
        assert_eq!(rights[0]["Uri"], "/users/alice");
        assert_eq!(rights[0]["Method"], ACCESS_ALL);
    }

    #[test]
    fn workspace_document_shape() {
        let id = ids::encode_workspace_id("alice", DEFAULT_WORKSPACE_NAME);
        let ws = Workspace::new(id.clone(), "alice", DEFAULT_WORKSPACE_NAME);
        let json = serde_json::to_value(&ws).unwrap();
        assert_eq!(json["UniqueId"], id.as_str());
        assert_eq!(json["UserId"], "alice");
        assert_eq!(json["FullName"], DEFAULT_WORKSPACE_NAME);
        assert_eq!(json["ProjectNames"], serde_json::json!([]));
    }

    #[test]
    fn unknown_property_keys_survive_round_trip() {
        let raw = serde_json::json!({
            "Version": CURRENT_GENERATION,
            "UniqueId": "alice",
            "UserName": "alice",
            "FullName": "Alice",
            "WorkspaceIds": [],
            "Properties": {
                "UserRightsVersion": "3",
                "UserRights": [{"Method": 15, "Uri": "/users/alice"}],
                "SiteConfigurations": {"site1": {"Name": "demo"}}
            }
        });
        let account: Account = serde_json::from_value(raw.clone()).unwrap();
        assert!(account.properties.extra.contains_key("SiteConfigurations"));
        let back = serde_json::to_value(&account).unwrap();
        assert_eq!(back["Properties"]["SiteConfigurations"], raw["Properties"]["SiteConfigurations"]);
    }

    #[test]
    fn revoking_workspace_rights_keeps_account_rights() {
        let mut props = Properties::default();
        props.grant_account_rights("alice");
        let ws = ids::encode_workspace_id("alice", "Sandbox");
        props.grant_workspace_rights(&ws);
        assert_eq!(props.user_rights.as_ref().unwrap().len(), 5);
        props.revoke_workspace_rights(&ws);
        let rights = props.user_rights.unwrap();
        assert_eq!(rights.len(), 1);
        assert_eq!(rights[0].uri, "/users/alice");
    }
}
