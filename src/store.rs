//! The metadata store facade.

use crate::error::{Error, Result};
use dashmap::DashMap;
use metafs_core::entities::{
    Account, Project, Workspace, ACCOUNT_DOCUMENT, CURRENT_GENERATION, DEFAULT_WORKSPACE_NAME,
};
use metafs_core::ids::{self, ProjectId, WorkspaceId};
use metafs_migration::MigrationEngine;
use metafs_storage::DocStore;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error};

/// The metadata store.
///
/// Entry point for all account/workspace/project operations. Every
/// operation touching an account first brings that account's documents up
/// to the current schema generation, under a lock private to the account:
/// exactly one migration run executes per stale account, and requests for
/// different accounts proceed fully in parallel.
///
/// # Example
///
/// ```ignore
/// use metafs::prelude::*;
///
/// let store = MetaStore::open("./serverworkspace")?;
/// let account = store.create_account("alice")?;
/// let workspace = store.create_workspace("alice", "Workspace")?;
/// ```
#[derive(Debug)]
pub struct MetaStore {
    docs: Arc<DocStore>,
    engine: MigrationEngine,
    /// Arena of per-account locks. Entries are created on first touch and
    /// never removed, so one account id always maps to one mutex even
    /// across delete-and-recreate; the arena grows only with the set of
    /// account ids ever touched.
    locks: DashMap<String, Arc<Mutex<()>>>,
    default_workspace_name: String,
}

impl MetaStore {
    /// Open a store rooted at `path`, creating the directory if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().path(path).open()
    }

    /// Create a builder for store configuration.
    pub fn builder() -> MetaStoreBuilder {
        MetaStoreBuilder::new()
    }

    /// The root directory of the store.
    pub fn path(&self) -> &Path {
        self.docs.root()
    }

    /// The workspace name used when the platform creates one on a user's
    /// behalf, and preferred by consolidation.
    pub fn default_workspace_name(&self) -> &str {
        &self.default_workspace_name
    }

    // ---- accounts ----------------------------------------------------

    /// Create a new account.
    ///
    /// Fails with [`Error::AlreadyExists`] if the account's folder exists.
    pub fn create_account(&self, account_id: &str) -> Result<Account> {
        validate_name("account id", account_id)?;
        let lock = self.account_lock(account_id);
        let _guard = lock.lock();

        let folder = self.account_folder(account_id);
        if self.docs.folder_exists(&folder) {
            return Err(Error::AlreadyExists(format!("account {account_id}")));
        }
        self.docs.create_folder(&folder)?;
        let account = Account::new(account_id);
        self.write_entity(&folder, ACCOUNT_DOCUMENT, &account)?;
        debug!(account = %account_id, "account created");
        Ok(account)
    }

    /// Read an account.
    pub fn read_account(&self, account_id: &str) -> Result<Account> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock();
        let folder = self.migrate(account_id)?;
        self.read_entity(&folder, ACCOUNT_DOCUMENT, || format!("account {account_id}"))
    }

    /// Replace an account's document with `account`.
    ///
    /// Whole-document replace: callers read, modify and write the full
    /// entity. The stored version tag is always the current generation.
    pub fn update_account(&self, account: &Account) -> Result<()> {
        let account_id = account.unique_id.clone();
        let lock = self.account_lock(&account_id);
        let _guard = lock.lock();
        let folder = self.migrate(&account_id)?;
        if !self.docs.is_document(&folder, ACCOUNT_DOCUMENT) {
            return Err(Error::NotFound(format!("account {account_id}")));
        }
        let mut stamped = account.clone();
        stamped.version = CURRENT_GENERATION;
        self.write_entity(&folder, ACCOUNT_DOCUMENT, &stamped)
    }

    /// Delete an account and all metadata beneath its root.
    ///
    /// Content bytes under the account root go with it; this is the one
    /// operation that removes a whole subtree.
    pub fn delete_account(&self, account_id: &str) -> Result<()> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock();
        let folder = self.account_folder(account_id);
        if !self.docs.folder_exists(&folder) {
            return Err(Error::NotFound(format!("account {account_id}")));
        }
        self.docs.delete_folder(&folder)?;
        debug!(account = %account_id, "account deleted");
        Ok(())
    }

    // ---- workspaces --------------------------------------------------

    /// Create a workspace under an account.
    ///
    /// The current generation allows one workspace per account; a second
    /// create fails with [`Error::LimitExceeded`].
    pub fn create_workspace(&self, account_id: &str, name: &str) -> Result<Workspace> {
        validate_name("workspace name", name)?;
        let lock = self.account_lock(account_id);
        let _guard = lock.lock();
        let folder = self.migrate(account_id)?;

        let mut account: Account =
            self.read_entity(&folder, ACCOUNT_DOCUMENT, || format!("account {account_id}"))?;
        if !account.workspace_ids.is_empty() {
            return Err(Error::LimitExceeded(format!(
                "account {account_id} already owns a workspace"
            )));
        }
        let id = ids::encode_workspace_id(account_id, name);
        if self.docs.is_document(&folder, id.as_str()) {
            return Err(Error::AlreadyExists(format!("workspace {id}")));
        }
        self.docs
            .create_folder(&folder.join(ids::workspace_folder_name(name)))?;
        let workspace = Workspace::new(id.clone(), account_id, name);
        self.write_entity(&folder, id.as_str(), &workspace)?;

        account.workspace_ids.push(id.clone());
        account.properties.grant_workspace_rights(&id);
        account.version = CURRENT_GENERATION;
        self.write_entity(&folder, ACCOUNT_DOCUMENT, &account)?;
        debug!(account = %account_id, workspace = %id, "workspace created");
        Ok(workspace)
    }

    /// Read a workspace by id.
    pub fn read_workspace(&self, id: &WorkspaceId) -> Result<Workspace> {
        let account_id = ids::decode_workspace_account(id)?;
        let lock = self.account_lock(&account_id);
        let _guard = lock.lock();
        let folder = self.migrate(&account_id)?;
        self.read_entity(&folder, id.as_str(), || format!("workspace {id}"))
    }

    /// Replace a workspace's document with `workspace`.
    pub fn update_workspace(&self, workspace: &Workspace) -> Result<()> {
        let account_id = ids::decode_workspace_account(&workspace.unique_id)?;
        let lock = self.account_lock(&account_id);
        let _guard = lock.lock();
        let folder = self.migrate(&account_id)?;
        if !self.docs.is_document(&folder, workspace.unique_id.as_str()) {
            return Err(Error::NotFound(format!("workspace {}", workspace.unique_id)));
        }
        let mut stamped = workspace.clone();
        stamped.version = CURRENT_GENERATION;
        self.write_entity(&folder, workspace.unique_id.as_str(), &stamped)
    }

    /// Delete a workspace, its project metadata documents, and its link
    /// from the owning account. Project content folders are left alone.
    pub fn delete_workspace(&self, id: &WorkspaceId) -> Result<()> {
        let account_id = ids::decode_workspace_account(id)?;
        let lock = self.account_lock(&account_id);
        let _guard = lock.lock();
        let folder = self.migrate(&account_id)?;

        let workspace: Workspace =
            self.read_entity(&folder, id.as_str(), || format!("workspace {id}"))?;
        for project_name in &workspace.project_names {
            let project_id = ids::encode_project_id(project_name);
            self.docs.delete_document(&folder, project_id.as_str())?;
        }
        self.docs.delete_document(&folder, id.as_str())?;

        let mut account: Account =
            self.read_entity(&folder, ACCOUNT_DOCUMENT, || format!("account {account_id}"))?;
        account.workspace_ids.retain(|ws| ws != id);
        account.properties.revoke_workspace_rights(id);
        account.version = CURRENT_GENERATION;
        self.write_entity(&folder, ACCOUNT_DOCUMENT, &account)?;

        // The folder stays if content folders remain beneath it.
        self.docs
            .delete_folder_if_empty(&folder.join(ids::workspace_folder_name(&workspace.full_name)))?;
        debug!(workspace = %id, "workspace deleted");
        Ok(())
    }

    // ---- projects ----------------------------------------------------

    /// Create a project in a workspace.
    ///
    /// When `content_location` is `None` the project's working tree is
    /// created at the default spot beneath the workspace folder. The
    /// content folder exists whenever the metadata document does.
    pub fn create_project(
        &self,
        workspace_id: &WorkspaceId,
        name: &str,
        content_location: Option<&Path>,
    ) -> Result<Project> {
        validate_name("project name", name)?;
        let account_id = ids::decode_workspace_account(workspace_id)?;
        let lock = self.account_lock(&account_id);
        let _guard = lock.lock();
        let folder = self.migrate(&account_id)?;

        let mut workspace: Workspace =
            self.read_entity(&folder, workspace_id.as_str(), || {
                format!("workspace {workspace_id}")
            })?;
        let project_id = ids::encode_project_id(name);
        if self.docs.is_document(&folder, project_id.as_str()) {
            return Err(Error::AlreadyExists(format!("project {name}")));
        }
        let content = match content_location {
            Some(path) => path.to_path_buf(),
            None => folder
                .join(ids::workspace_folder_name(&workspace.full_name))
                .join(project_id.as_str()),
        };
        self.docs.create_folder(&content)?;
        let stored = ids::encode_content_location(self.docs.root(), &content);
        let project = Project::new(project_id.clone(), workspace_id.clone(), name, stored);
        self.write_entity(&folder, project_id.as_str(), &project)?;

        workspace.project_names.push(name.to_string());
        workspace.version = CURRENT_GENERATION;
        self.write_entity(&folder, workspace_id.as_str(), &workspace)?;
        debug!(workspace = %workspace_id, project = %project_id, "project created");
        Ok(project)
    }

    /// Read a project by owning workspace and project id.
    pub fn read_project(&self, workspace_id: &WorkspaceId, id: &ProjectId) -> Result<Project> {
        let account_id = ids::decode_workspace_account(workspace_id)?;
        let lock = self.account_lock(&account_id);
        let _guard = lock.lock();
        let folder = self.migrate(&account_id)?;
        let project: Project =
            self.read_entity(&folder, id.as_str(), || format!("project {id}"))?;
        if project.workspace_id != *workspace_id {
            return Err(Error::NotFound(format!(
                "project {id} in workspace {workspace_id}"
            )));
        }
        Ok(project)
    }

    /// Replace a project's document with `project`.
    pub fn update_project(&self, project: &Project) -> Result<()> {
        let account_id = ids::decode_workspace_account(&project.workspace_id)?;
        let lock = self.account_lock(&account_id);
        let _guard = lock.lock();
        let folder = self.migrate(&account_id)?;
        if !self.docs.is_document(&folder, project.unique_id.as_str()) {
            return Err(Error::NotFound(format!("project {}", project.unique_id)));
        }
        let mut stamped = project.clone();
        stamped.version = CURRENT_GENERATION;
        self.write_entity(&folder, project.unique_id.as_str(), &stamped)
    }

    /// Delete a project's metadata document and its entry in the owning
    /// workspace. The content folder's file bytes are a collaborator
    /// concern and are not touched.
    pub fn delete_project(&self, workspace_id: &WorkspaceId, id: &ProjectId) -> Result<()> {
        let account_id = ids::decode_workspace_account(workspace_id)?;
        let lock = self.account_lock(&account_id);
        let _guard = lock.lock();
        let folder = self.migrate(&account_id)?;

        let project: Project =
            self.read_entity(&folder, id.as_str(), || format!("project {id}"))?;
        self.docs.delete_document(&folder, id.as_str())?;

        let mut workspace: Workspace =
            self.read_entity(&folder, workspace_id.as_str(), || {
                format!("workspace {workspace_id}")
            })?;
        workspace.project_names.retain(|n| *n != project.full_name);
        workspace.version = CURRENT_GENERATION;
        self.write_entity(&folder, workspace_id.as_str(), &workspace)?;
        debug!(project = %id, "project deleted");
        Ok(())
    }

    /// Resolve a project's content location to an absolute path for the
    /// file-content collaborator.
    pub fn project_content_path(&self, project: &Project) -> PathBuf {
        ids::decode_content_location(self.docs.root(), &project.content_location)
    }

    // ---- internals ---------------------------------------------------

    fn account_folder(&self, account_id: &str) -> PathBuf {
        self.docs.root().join(ids::account_folder_name(account_id))
    }

    fn account_lock(&self, account_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Bring the account current. Must be called with the account lock
    /// held. Returns the account's root folder.
    fn migrate(&self, account_id: &str) -> Result<PathBuf> {
        let folder = self.account_folder(account_id);
        if let Err(e) = self.engine.migrate_account(&folder, account_id) {
            error!(account = %account_id, error = %e, "account migration failed");
            return Err(e.into());
        }
        Ok(folder)
    }

    fn read_entity<T: DeserializeOwned>(
        &self,
        folder: &Path,
        name: &str,
        what: impl Fn() -> String,
    ) -> Result<T> {
        match self.docs.read_document(folder, name)? {
            Some(doc) => Ok(serde_json::from_value(doc)?),
            None => Err(Error::NotFound(what())),
        }
    }

    fn write_entity<T: Serialize>(&self, folder: &Path, name: &str, entity: &T) -> Result<()> {
        let value = serde_json::to_value(entity)?;
        self.docs.write_document(folder, name, &value)?;
        Ok(())
    }
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::MalformedIdentifier(format!("{kind} is empty")));
    }
    Ok(())
}

/// Builder for [`MetaStore`] configuration.
///
/// # Example
///
/// ```ignore
/// let store = MetaStore::builder()
///     .path("./serverworkspace")
///     .default_workspace_name("Workspace")
///     .open()?;
/// ```
pub struct MetaStoreBuilder {
    path: Option<PathBuf>,
    default_workspace_name: String,
}

impl MetaStoreBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        MetaStoreBuilder {
            path: None,
            default_workspace_name: DEFAULT_WORKSPACE_NAME.to_string(),
        }
    }

    /// Directory that roots the store. Created on open if absent.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Workspace name used for platform-created workspaces and preferred
    /// by multi-workspace consolidation.
    pub fn default_workspace_name(mut self, name: impl Into<String>) -> Self {
        self.default_workspace_name = name.into();
        self
    }

    /// Open the store.
    pub fn open(self) -> Result<MetaStore> {
        let path = self.path.ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "store path not set",
            ))
        })?;
        fs::create_dir_all(&path)?;
        let docs = Arc::new(DocStore::new(path));
        let engine = MigrationEngine::new(docs.clone(), self.default_workspace_name.clone());
        Ok(MetaStore {
            docs,
            engine,
            locks: DashMap::new(),
            default_workspace_name: self.default_workspace_name,
        })
    }
}

impl Default for MetaStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
