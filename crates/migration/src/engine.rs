//! Drives the transform chain for one account at a time.

use crate::layout::AccountLayout;
use crate::transforms::Transform;
use metafs_core::entities::CURRENT_GENERATION;
use metafs_core::error::{Error, Result};
use metafs_storage::DocStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// The schema migration engine.
///
/// Given an account root at an unknown generation, detects the generation
/// and applies transforms in increasing order until the layout is current.
/// A no-op when the account is already current or does not exist yet.
///
/// The engine takes no locks; the facade serializes calls per account.
#[derive(Debug)]
pub struct MigrationEngine {
    store: Arc<DocStore>,
    default_workspace_name: String,
}

impl MigrationEngine {
    /// Create an engine over `store`. `default_workspace_name` selects the
    /// consolidation survivor.
    pub fn new(store: Arc<DocStore>, default_workspace_name: impl Into<String>) -> Self {
        MigrationEngine {
            store,
            default_workspace_name: default_workspace_name.into(),
        }
    }

    /// Bring the account rooted at `account_folder` up to the current
    /// generation. Idempotent and re-entrant: an interrupted run resumes
    /// forward from the generation it reached.
    pub fn migrate_account(&self, account_folder: &Path, account_id: &str) -> Result<()> {
        let fail = |e: Error| match e {
            e @ Error::MigrationFailed { .. } => e,
            other => Error::MigrationFailed {
                account: account_id.to_string(),
                reason: other.to_string(),
            },
        };

        let mut layout = AccountLayout::scan(&self.store, account_folder).map_err(fail)?;
        let starting = match layout.generation {
            // No account document at all: a new account, nothing to migrate.
            None => return Ok(()),
            Some(generation) if generation == CURRENT_GENERATION => return Ok(()),
            Some(generation) => generation,
        };
        if starting > CURRENT_GENERATION {
            return Err(Error::MigrationFailed {
                account: account_id.to_string(),
                reason: format!(
                    "document generation {starting} is newer than this build's {CURRENT_GENERATION}"
                ),
            });
        }
        info!(
            account = %account_id,
            from = starting,
            to = CURRENT_GENERATION,
            "migrating account metadata"
        );

        while let Some(generation) = layout.generation {
            if generation == CURRENT_GENERATION {
                break;
            }
            let transform = Transform::for_generation(generation).ok_or_else(|| {
                Error::MigrationFailed {
                    account: account_id.to_string(),
                    reason: format!("no transform for generation {generation}"),
                }
            })?;
            transform
                .apply(&self.store, &layout, &self.default_workspace_name)
                .map_err(fail)?;
            layout = AccountLayout::scan(&self.store, account_folder).map_err(fail)?;
            // A transform that does not advance the generation would loop
            // forever; treat it as a failed migration.
            match layout.generation {
                Some(reached) if reached > generation => {
                    debug!(account = %account_id, reached, "transform complete");
                }
                reached => {
                    return Err(Error::MigrationFailed {
                        account: account_id.to_string(),
                        reason: format!(
                            "transform from generation {generation} left layout at {reached:?}"
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metafs_core::entities::{
        ACCOUNT_DOCUMENT, DEFAULT_WORKSPACE_NAME, GENERATION_4, NESTED_WORKSPACE_DOCUMENT,
    };
    use metafs_core::ids;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn engine() -> (TempDir, Arc<DocStore>, MigrationEngine) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DocStore::new(dir.path()));
        let engine = MigrationEngine::new(store.clone(), DEFAULT_WORKSPACE_NAME);
        (dir, store, engine)
    }

    /// Collect every file under a folder as (relative path, bytes).
    fn snapshot(folder: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        fn walk(base: &Path, dir: &Path, out: &mut Vec<(PathBuf, Vec<u8>)>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(base, &path, out);
                } else {
                    out.push((
                        path.strip_prefix(base).unwrap().to_path_buf(),
                        std::fs::read(&path).unwrap(),
                    ));
                }
            }
        }
        let mut out = Vec::new();
        walk(folder, folder, &mut out);
        out.sort();
        out
    }

    fn gen4_account(store: &DocStore, root: &Path) -> PathBuf {
        let account = root.join("alice");
        let ws_id = ids::encode_workspace_id("alice", "Sandbox");
        store.create_folder(&account).unwrap();
        store
            .write_document(
                &account,
                ACCOUNT_DOCUMENT,
                &json!({
                    "Version": GENERATION_4,
                    "UniqueId": "alice",
                    "UserName": "alice",
                    "FullName": "alice",
                    "WorkspaceIds": [ws_id.as_str()],
                    "Properties": {}
                }),
            )
            .unwrap();
        let ws_folder = account.join("Sandbox");
        store.create_folder(&ws_folder).unwrap();
        store
            .write_document(
                &ws_folder,
                NESTED_WORKSPACE_DOCUMENT,
                &json!({
                    "Version": GENERATION_4,
                    "UniqueId": ws_id.as_str(),
                    "UserId": "alice",
                    "FullName": "Sandbox",
                    "ProjectNames": ["P"],
                    "Properties": {}
                }),
            )
            .unwrap();
        let project_id = ids::encode_project_id("P");
        store
            .write_document(
                &ws_folder,
                project_id.as_str(),
                &json!({
                    "Version": GENERATION_4,
                    "UniqueId": project_id.as_str(),
                    "WorkspaceId": ws_id.as_str(),
                    "FullName": "P",
                    "ContentLocation": ids::encode_content_location(
                        store.root(),
                        &ws_folder.join(project_id.as_str()),
                    ),
                    "Properties": {}
                }),
            )
            .unwrap();
        store.create_folder(&ws_folder.join(project_id.as_str())).unwrap();
        account
    }

    #[test]
    fn new_account_folder_is_a_no_op() {
        let (_dir, store, engine) = engine();
        let account = store.root().join("ghost");
        engine.migrate_account(&account, "ghost").unwrap();
        assert!(!store.folder_exists(&account));
    }

    #[test]
    fn gen4_account_migrates_to_current() {
        let (_dir, store, engine) = engine();
        let account = gen4_account(&store, store.root());
        engine.migrate_account(&account, "alice").unwrap();

        let layout = AccountLayout::scan(&store, &account).unwrap();
        assert_eq!(layout.generation, Some(CURRENT_GENERATION));
        // Workspace and project documents are siblings at the root now.
        let ws_id = ids::encode_workspace_id("alice", "Sandbox");
        let project_id = ids::encode_project_id("P");
        assert!(store.is_document(&account, ws_id.as_str()));
        assert!(store.is_document(&account, project_id.as_str()));
        // Every document carries the current generation.
        for name in store.list_documents(&account).unwrap() {
            let doc = store.read_document(&account, &name).unwrap().unwrap();
            assert_eq!(doc["Version"], CURRENT_GENERATION, "document {name}");
        }
    }

    #[test]
    fn migration_is_idempotent() {
        let (_dir, store, engine) = engine();
        let account = gen4_account(&store, store.root());
        engine.migrate_account(&account, "alice").unwrap();
        let first = snapshot(&account);
        engine.migrate_account(&account, "alice").unwrap();
        assert_eq!(first, snapshot(&account), "second run must change nothing");
    }

    #[test]
    fn migration_resumes_from_intermediate_generation() {
        let (_dir, store, engine) = engine();
        let account = gen4_account(&store, store.root());
        // Apply only the first transform, as if the process died after it.
        let layout = AccountLayout::scan(&store, &account).unwrap();
        Transform::WorkspaceDocsToRoot
            .apply(&store, &layout, DEFAULT_WORKSPACE_NAME)
            .unwrap();

        engine.migrate_account(&account, "alice").unwrap();
        let layout = AccountLayout::scan(&store, &account).unwrap();
        assert_eq!(layout.generation, Some(CURRENT_GENERATION));
    }

    #[test]
    fn future_generation_is_rejected() {
        let (_dir, store, engine) = engine();
        let account = store.root().join("bob");
        store.create_folder(&account).unwrap();
        store
            .write_document(
                &account,
                ACCOUNT_DOCUMENT,
                &json!({"Version": CURRENT_GENERATION + 1, "UniqueId": "bob"}),
            )
            .unwrap();
        let err = engine.migrate_account(&account, "bob").unwrap_err();
        assert!(matches!(err, Error::MigrationFailed { .. }));
    }

    #[test]
    fn corrupt_account_document_fails_without_touching_layout() {
        let (_dir, store, engine) = engine();
        let account = store.root().join("mallory");
        store.create_folder(&account).unwrap();
        std::fs::write(account.join("user.json"), b"{torn").unwrap();

        let err = engine.migrate_account(&account, "mallory").unwrap_err();
        assert!(matches!(err, Error::MigrationFailed { .. }));
        assert_eq!(std::fs::read(account.join("user.json")).unwrap(), b"{torn");
    }
}
