//! # metafs
//!
//! A hierarchical, file-system-backed metadata store. Three linked entity
//! kinds (account, workspace, project) persist as small JSON documents in
//! a directory layout, and documents written by earlier schema generations
//! are upgraded transparently the first time the owning account is touched.
//!
//! ## Quick Start
//!
//! ```ignore
//! use metafs::prelude::*;
//!
//! let store = MetaStore::open("./serverworkspace")?;
//!
//! let account = store.create_account("alice")?;
//! let workspace = store.create_workspace("alice", "Workspace")?;
//! let project = store.create_project(&workspace.unique_id, "My Project", None)?;
//!
//! // Collaborators resolve the project's working tree through the store.
//! let tree = store.project_content_path(&project);
//! ```
//!
//! ## Lazy migration
//!
//! Every entry point first brings the touched account up to the current
//! schema generation, under a per-account lock. Two concurrent requests
//! for the same stale account never observe a mixed-generation layout;
//! requests for different accounts never contend.

#![warn(missing_docs)]

mod error;
mod store;

pub mod prelude;

pub use error::{Error, Result};
pub use store::{MetaStore, MetaStoreBuilder};

// Re-export the entity types and identifier codec callers interact with.
pub use metafs_core::entities::{
    AccessRight, Account, Project, Properties, Workspace, CURRENT_GENERATION,
    DEFAULT_WORKSPACE_NAME,
};
pub use metafs_core::ids::{self, ProjectId, WorkspaceId};
