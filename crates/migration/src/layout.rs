//! Scanned snapshot of an account's on-disk layout.

use metafs_core::entities::{ACCOUNT_DOCUMENT, FIELD_VERSION};
use metafs_core::error::{Error, Result};
use metafs_storage::DocStore;
use std::path::{Path, PathBuf};

/// What the engine found under one account root.
///
/// Transforms take a layout descriptor instead of probing the filesystem
/// ad hoc, which keeps each transform testable against synthetic fixtures.
/// The descriptor is a snapshot; the engine rescans after every transform.
#[derive(Debug, Clone)]
pub struct AccountLayout {
    /// Absolute path of the account's root folder.
    pub account_folder: PathBuf,
    /// Generation read from the account document. `None` when no account
    /// document exists at all (a brand-new account: nothing to migrate).
    pub generation: Option<u32>,
    /// Names of folders directly under the account root. In legacy
    /// generations these are the per-workspace folders.
    pub folders: Vec<String>,
    /// Names of documents directly under the account root, excluding the
    /// account document itself.
    pub root_documents: Vec<String>,
}

impl AccountLayout {
    /// Scan the layout of the account rooted at `account_folder`.
    pub fn scan(store: &DocStore, account_folder: &Path) -> Result<Self> {
        let generation = match store.read_document(account_folder, ACCOUNT_DOCUMENT)? {
            None => None,
            Some(doc) => Some(read_generation(&doc)?),
        };
        let folders = store.list_folders(account_folder)?;
        let root_documents = store
            .list_documents(account_folder)?
            .into_iter()
            .filter(|name| name != ACCOUNT_DOCUMENT)
            .collect();
        Ok(AccountLayout {
            account_folder: account_folder.to_path_buf(),
            generation,
            folders,
            root_documents,
        })
    }
}

/// Extract the generation tag from a document.
pub(crate) fn read_generation(doc: &serde_json::Value) -> Result<u32> {
    doc.get(FIELD_VERSION)
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
        .ok_or_else(|| Error::Serialization("document has no version tag".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn scan_of_empty_folder_has_no_generation() {
        let dir = TempDir::new().unwrap();
        let store = DocStore::new(dir.path());
        let layout = AccountLayout::scan(&store, dir.path()).unwrap();
        assert_eq!(layout.generation, None);
        assert!(layout.folders.is_empty());
        assert!(layout.root_documents.is_empty());
    }

    #[test]
    fn scan_reads_generation_and_sorts_entries() {
        let dir = TempDir::new().unwrap();
        let store = DocStore::new(dir.path());
        let root = dir.path();
        store
            .write_document(root, ACCOUNT_DOCUMENT, &json!({"Version": 4}))
            .unwrap();
        store.write_document(root, "proj", &json!({"Version": 4})).unwrap();
        store.create_folder(&root.join("Sandbox")).unwrap();

        let layout = AccountLayout::scan(&store, root).unwrap();
        assert_eq!(layout.generation, Some(4));
        assert_eq!(layout.folders, vec!["Sandbox"]);
        assert_eq!(layout.root_documents, vec!["proj"]);
    }

    #[test]
    fn missing_version_tag_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = DocStore::new(dir.path());
        store
            .write_document(dir.path(), ACCOUNT_DOCUMENT, &json!({"UniqueId": "x"}))
            .unwrap();
        assert!(AccountLayout::scan(&store, dir.path()).is_err());
    }
}
