//! Convenience re-exports for callers of the store.

pub use crate::error::{Error, Result};
pub use crate::store::{MetaStore, MetaStoreBuilder};
pub use metafs_core::entities::{Account, Project, Workspace};
pub use metafs_core::ids::{ProjectId, WorkspaceId};
