//! Atomic JSON document storage over a directory tree.

use metafs_core::error::Result;
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Extension carried by every document on disk.
const DOC_EXTENSION: &str = "json";

/// Suffix of the temporary file a write goes through before the rename.
const TMP_SUFFIX: &str = ".tmp";

/// Document store rooted at a directory.
///
/// All primitives operate on a `(folder, name)` pair, where `folder` is an
/// absolute path (normally derived from [`DocStore::root`]) and `name` is a
/// bare document name without extension.
///
/// # Atomicity
///
/// [`DocStore::write_document`] writes to a temporary name in the target
/// folder and renames over the document, so a concurrent reader observes
/// either the old document or the new one, never a torn write. Writes that
/// span multiple documents still need caller-side locking.
#[derive(Debug, Clone)]
pub struct DocStore {
    root: PathBuf,
}

impl DocStore {
    /// Create a store rooted at `root`. The directory is not created here;
    /// callers decide when the root comes into existence.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DocStore { root: root.into() }
    }

    /// The root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(folder: &Path, name: &str) -> PathBuf {
        folder.join(format!("{name}.{DOC_EXTENSION}"))
    }

    /// Create a folder, including missing parents. A no-op if it exists.
    pub fn create_folder(&self, folder: &Path) -> Result<()> {
        fs::create_dir_all(folder)?;
        Ok(())
    }

    /// Check whether `folder` exists and is a directory. Never errors on
    /// absence.
    pub fn folder_exists(&self, folder: &Path) -> bool {
        folder.is_dir()
    }

    /// Check whether the named document exists in `folder`.
    pub fn is_document(&self, folder: &Path, name: &str) -> bool {
        Self::document_path(folder, name).is_file()
    }

    /// Check whether the named entry in `folder` is a sub-folder.
    pub fn is_folder(&self, folder: &Path, name: &str) -> bool {
        folder.join(name).is_dir()
    }

    /// Read a whole document. `Ok(None)` if the document does not exist.
    pub fn read_document(&self, folder: &Path, name: &str) -> Result<Option<Value>> {
        let path = Self::document_path(folder, name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_slice(&bytes)?;
        Ok(Some(value))
    }

    /// Replace a whole document atomically.
    ///
    /// The value is serialized to a temporary file in the same folder,
    /// flushed, and renamed over the target.
    pub fn write_document(&self, folder: &Path, name: &str, value: &Value) -> Result<()> {
        let path = Self::document_path(folder, name);
        let tmp = folder.join(format!("{name}.{DOC_EXTENSION}{TMP_SUFFIX}"));
        let bytes = serde_json::to_vec_pretty(value)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &path) {
            // Leave no temp file behind on a failed rename.
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        trace!(path = %path.display(), "document written");
        Ok(())
    }

    /// Delete a document. Returns `false` if it was already absent.
    pub fn delete_document(&self, folder: &Path, name: &str) -> Result<bool> {
        match fs::remove_file(Self::document_path(folder, name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List the names of sub-folders of `parent`, sorted. An absent parent
    /// lists as empty.
    pub fn list_folders(&self, parent: &Path) -> Result<Vec<String>> {
        self.list_entries(parent, |entry| entry.path().is_dir(), |name| {
            Some(name.to_string())
        })
    }

    /// List the names of documents in `parent` (without extension), sorted.
    /// Temporary files from in-flight writes are skipped.
    pub fn list_documents(&self, parent: &Path) -> Result<Vec<String>> {
        self.list_entries(
            parent,
            |entry| entry.path().is_file(),
            |name| {
                name.strip_suffix(&format!(".{DOC_EXTENSION}"))
                    .map(str::to_string)
            },
        )
    }

    fn list_entries(
        &self,
        parent: &Path,
        keep: impl Fn(&fs::DirEntry) -> bool,
        map: impl Fn(&str) -> Option<String>,
    ) -> Result<Vec<String>> {
        let entries = match fs::read_dir(parent) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !keep(&entry) {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }
            if let Some(mapped) = map(&name) {
                names.push(mapped);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Delete `folder` if it contains no entries. Returns whether it was
    /// removed. Absence counts as removed.
    ///
    /// Callers hold the per-account lock, so the emptiness check cannot
    /// race with a concurrent write under the same account.
    pub fn delete_folder_if_empty(&self, folder: &Path) -> Result<bool> {
        match fs::read_dir(folder) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    return Ok(false);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        }
        match fs::remove_dir(folder) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a folder and everything beneath it to a new location on the
    /// same filesystem. The rename is atomic; the destination must not
    /// already exist.
    pub fn rename_folder(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to)?;
        Ok(())
    }

    /// Delete a folder and everything beneath it. A no-op if absent.
    pub fn delete_folder(&self, folder: &Path) -> Result<()> {
        match fs::remove_dir_all(folder) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
