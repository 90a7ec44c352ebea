//! Core types for the metafs metadata store
//!
//! This crate defines the pieces shared by every layer:
//! - [`error`]: the error taxonomy for store operations
//! - [`ids`]: the reversible identifier codec (names <-> path segments)
//! - [`entities`]: the account/workspace/project documents and the
//!   schema-generation constants

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entities;
pub mod error;
pub mod ids;

pub use entities::{
    AccessRight, Account, Project, Properties, Workspace, CURRENT_GENERATION,
    DEFAULT_WORKSPACE_NAME,
};
pub use error::{Error, Result};
pub use ids::{ProjectId, WorkspaceId};
