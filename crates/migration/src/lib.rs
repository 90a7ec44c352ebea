//! Schema migration engine for metafs
//!
//! Accounts written by earlier schema generations are upgraded in place,
//! lazily, the first time they are touched. The engine is a state machine
//! over the integer generation carried by every document:
//!
//! - generation 4: workspace and project documents nested inside each
//!   workspace's own folder
//! - generation 5: workspace documents relocated to the account root
//! - generation 6: project documents relocated to the account root
//! - generation 7 (current): at most one workspace per account
//!
//! Transforms apply strictly in order and are idempotent; a rerun against
//! a half-applied layout resumes forward. The caller serializes migration
//! per account — the engine itself takes no locks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod layout;
pub mod transforms;

pub use engine::MigrationEngine;
pub use layout::AccountLayout;
pub use transforms::Transform;
