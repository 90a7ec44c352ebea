//! Document access layer for metafs
//!
//! This crate implements the on-disk primitives every schema generation
//! shares:
//! - whole-document JSON read/write with atomic replace (temp + rename)
//! - folder existence/creation/listing
//!
//! The layer carries no notion of entity or schema version; callers
//! address documents by a `(folder, name)` pair.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod docs;

pub use docs::DocStore;
