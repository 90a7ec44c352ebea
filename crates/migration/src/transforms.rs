//! The generation-to-generation transforms.
//!
//! Each transform moves the layout from its source generation to the next
//! one. Structural moves write the destination before deleting the source,
//! so an interrupted transform leaves a readable, if outdated, layout; the
//! account document is stamped last, which is what makes a rerun resume
//! instead of skipping work.

use crate::layout::{read_generation, AccountLayout};
use metafs_core::entities::{
    ACCOUNT_DOCUMENT, FIELD_CONTENT_LOCATION, FIELD_FULL_NAME, FIELD_PROJECT_NAMES,
    FIELD_UNIQUE_ID, FIELD_VERSION, FIELD_WORKSPACE_ID, FIELD_WORKSPACE_IDS,
    GENERATION_4, GENERATION_5, GENERATION_6, GENERATION_7, NESTED_WORKSPACE_DOCUMENT,
};
use metafs_core::error::{Error, Result};
use metafs_core::ids;
use metafs_storage::DocStore;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// One step of the migration chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Generation 4 -> 5: relocate each workspace's document from the
    /// workspace folder to the account root, named by the workspace id.
    WorkspaceDocsToRoot,
    /// Generation 5 -> 6: relocate each project's document from the owning
    /// workspace folder to the account root, named by the project id. The
    /// project's content folder stays where it is.
    ProjectDocsToRoot,
    /// Generation 6 -> 7: merge every workspace's projects into a single
    /// retained workspace and drop the rest.
    ConsolidateWorkspaces,
}

impl Transform {
    /// The transform that advances a layout at `generation`, if one exists.
    pub fn for_generation(generation: u32) -> Option<Transform> {
        match generation {
            GENERATION_4 => Some(Transform::WorkspaceDocsToRoot),
            GENERATION_5 => Some(Transform::ProjectDocsToRoot),
            GENERATION_6 => Some(Transform::ConsolidateWorkspaces),
            _ => None,
        }
    }

    /// Generation this transform applies to.
    pub fn source_generation(&self) -> u32 {
        match self {
            Transform::WorkspaceDocsToRoot => GENERATION_4,
            Transform::ProjectDocsToRoot => GENERATION_5,
            Transform::ConsolidateWorkspaces => GENERATION_6,
        }
    }

    /// Generation the layout carries after this transform succeeds.
    pub fn target_generation(&self) -> u32 {
        self.source_generation() + 1
    }

    /// Apply this transform to the scanned layout.
    ///
    /// `default_workspace_name` decides the consolidation survivor when an
    /// account holds a workspace with that name.
    pub fn apply(
        &self,
        store: &DocStore,
        layout: &AccountLayout,
        default_workspace_name: &str,
    ) -> Result<()> {
        debug!(
            account = %layout.account_folder.display(),
            transform = ?self,
            "applying schema transform"
        );
        match self {
            Transform::WorkspaceDocsToRoot => workspace_docs_to_root(store, layout),
            Transform::ProjectDocsToRoot => project_docs_to_root(store, layout),
            Transform::ConsolidateWorkspaces => {
                consolidate_workspaces(store, layout, default_workspace_name)
            }
        }?;
        stamp_generation(store, &layout.account_folder, self.target_generation())
    }
}

/// Generation 4 -> 5.
fn workspace_docs_to_root(store: &DocStore, layout: &AccountLayout) -> Result<()> {
    for folder_name in &layout.folders {
        let workspace_folder = layout.account_folder.join(folder_name);
        let Some(mut doc) = store.read_document(&workspace_folder, NESTED_WORKSPACE_DOCUMENT)?
        else {
            continue;
        };
        let id = doc
            .get(FIELD_UNIQUE_ID)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Serialization(format!(
                    "workspace document in {folder_name} has no {FIELD_UNIQUE_ID}"
                ))
            })?;
        doc[FIELD_VERSION] = GENERATION_5.into();
        store.write_document(&layout.account_folder, &id, &doc)?;
        store.delete_document(&workspace_folder, NESTED_WORKSPACE_DOCUMENT)?;
    }
    Ok(())
}

/// Generation 5 -> 6.
fn project_docs_to_root(store: &DocStore, layout: &AccountLayout) -> Result<()> {
    // Two workspaces may each hold a project with the same name; their
    // documents would land on the same sibling name at the account root.
    // A document carrying a fixed name (written by a foreign encoder)
    // would land on the account document itself.
    let mut sources: HashMap<String, usize> = HashMap::new();
    for folder_name in &layout.folders {
        let workspace_folder = layout.account_folder.join(folder_name);
        for doc_name in store.list_documents(&workspace_folder)? {
            if ids::is_reserved_document_name(&doc_name) {
                return Err(Error::MigrationFailed {
                    account: layout.account_folder.display().to_string(),
                    reason: format!(
                        "document {doc_name} in workspace folder {folder_name} \
                         would collide with a fixed account document"
                    ),
                });
            }
            *sources.entry(doc_name).or_insert(0) += 1;
        }
    }
    if let Some((name, _)) = sources.iter().find(|(_, count)| **count > 1) {
        return Err(Error::MigrationFailed {
            account: layout.account_folder.display().to_string(),
            reason: format!("project document {name} exists in more than one workspace"),
        });
    }

    for folder_name in &layout.folders {
        let workspace_folder = layout.account_folder.join(folder_name);
        for doc_name in store.list_documents(&workspace_folder)? {
            let Some(mut doc) = store.read_document(&workspace_folder, &doc_name)? else {
                continue;
            };
            doc[FIELD_VERSION] = GENERATION_6.into();
            store.write_document(&layout.account_folder, &doc_name, &doc)?;
            store.delete_document(&workspace_folder, &doc_name)?;
        }
    }
    Ok(())
}

/// Generation 6 -> 7.
fn consolidate_workspaces(
    store: &DocStore,
    layout: &AccountLayout,
    default_workspace_name: &str,
) -> Result<()> {
    let root = &layout.account_folder;
    let Some(mut account) = store.read_document(root, ACCOUNT_DOCUMENT)? else {
        return Ok(());
    };
    let listed_ids: Vec<String> = account
        .get(FIELD_WORKSPACE_IDS)
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    // Only workspaces whose documents actually exist take part.
    let mut workspaces: Vec<(String, Value)> = Vec::new();
    for id in &listed_ids {
        match store.read_document(root, id)? {
            Some(doc) => workspaces.push((id.clone(), doc)),
            None => warn!(workspace = %id, "workspace listed in account document has no document"),
        }
    }

    if workspaces.len() != listed_ids.len() || workspaces.len() > 1 {
        let survivor_idx = workspaces
            .iter()
            .position(|(_, doc)| {
                doc.get(FIELD_FULL_NAME).and_then(Value::as_str) == Some(default_workspace_name)
            })
            .unwrap_or(0);
        if workspaces.is_empty() {
            account[FIELD_WORKSPACE_IDS] = Value::Array(Vec::new());
            store.write_document(root, ACCOUNT_DOCUMENT, &account)?;
            return Ok(());
        }
        let (survivor_id, mut survivor_doc) = workspaces.remove(survivor_idx);
        merge_into_survivor(store, root, &survivor_id, &mut survivor_doc, workspaces)?;
        account[FIELD_WORKSPACE_IDS] = Value::Array(vec![Value::String(survivor_id)]);
        store.write_document(root, ACCOUNT_DOCUMENT, &account)?;
    }
    Ok(())
}

fn merge_into_survivor(
    store: &DocStore,
    root: &Path,
    survivor_id: &str,
    survivor_doc: &mut Value,
    losers: Vec<(String, Value)>,
) -> Result<()> {
    let survivor_name = workspace_name(survivor_doc, survivor_id)?;
    let survivor_folder = root.join(ids::workspace_folder_name(&survivor_name));
    let mut survivor_projects = project_names(survivor_doc);

    for (loser_id, loser_doc) in losers {
        let loser_name = workspace_name(&loser_doc, &loser_id)?;
        let loser_folder = root.join(ids::workspace_folder_name(&loser_name));

        for project_name in project_names(&loser_doc) {
            let project_id = ids::encode_project_id(&project_name);
            let already_merged = survivor_projects.contains(&project_name);

            // Relocate the content folder first; the rename is atomic and
            // a rerun simply finds the source gone.
            let src = loser_folder.join(project_id.as_str());
            let dst = survivor_folder.join(project_id.as_str());
            if store.folder_exists(&src) {
                if store.folder_exists(&dst) {
                    return Err(Error::MigrationFailed {
                        account: root.display().to_string(),
                        reason: format!(
                            "content folder for project {project_name} already exists in the retained workspace"
                        ),
                    });
                }
                store.create_folder(&survivor_folder)?;
                store.rename_folder(&src, &dst)?;
            }

            let Some(mut project_doc) = store.read_document(root, project_id.as_str())? else {
                warn!(project = %project_name, "project listed in workspace has no document");
                continue;
            };
            if already_merged {
                let owner = project_doc.get(FIELD_WORKSPACE_ID).and_then(Value::as_str);
                if owner == Some(survivor_id) {
                    // A previous, interrupted run already merged this one.
                    continue;
                }
                return Err(Error::MigrationFailed {
                    account: root.display().to_string(),
                    reason: format!(
                        "project name {project_name} exists in more than one workspace"
                    ),
                });
            }

            project_doc[FIELD_WORKSPACE_ID] = Value::String(survivor_id.to_string());
            rewrite_content_location(store, &mut project_doc, &loser_folder, &survivor_folder);
            store.write_document(root, project_id.as_str(), &project_doc)?;
            survivor_projects.push(project_name);
        }

        survivor_doc[FIELD_PROJECT_NAMES] = survivor_projects
            .iter()
            .cloned()
            .map(Value::String)
            .collect::<Vec<_>>()
            .into();
        store.write_document(root, survivor_id, survivor_doc)?;
        store.delete_document(root, &loser_id)?;
        if !store.delete_folder_if_empty(&loser_folder)? {
            warn!(
                folder = %loser_folder.display(),
                "merged workspace folder not empty, leaving in place"
            );
        }
    }
    Ok(())
}

fn workspace_name(doc: &Value, id: &str) -> Result<String> {
    doc.get(FIELD_FULL_NAME)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Serialization(format!("workspace document {id} has no {FIELD_FULL_NAME}"))
        })
}

fn project_names(doc: &Value) -> Vec<String> {
    doc.get(FIELD_PROJECT_NAMES)
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Re-encode a project's content location when it pointed beneath a merged
/// workspace folder. Locations outside the store root are untouched.
fn rewrite_content_location(
    store: &DocStore,
    project_doc: &mut Value,
    old_folder: &Path,
    new_folder: &Path,
) {
    let Some(stored) = project_doc.get(FIELD_CONTENT_LOCATION).and_then(Value::as_str) else {
        return;
    };
    let decoded = ids::decode_content_location(store.root(), stored);
    if let Ok(rest) = decoded.strip_prefix(old_folder) {
        let relocated = new_folder.join(rest);
        project_doc[FIELD_CONTENT_LOCATION] =
            Value::String(ids::encode_content_location(store.root(), &relocated));
    }
}

/// Rewrite the version tag of every document under the account root to
/// `target`. Documents a transform's structural change did not touch are
/// advanced too; the account document goes last so an interrupted stamp
/// reruns the whole transform instead of losing it.
pub(crate) fn stamp_generation(store: &DocStore, account_folder: &Path, target: u32) -> Result<()> {
    for folder_name in store.list_folders(account_folder)? {
        let folder = account_folder.join(folder_name);
        for doc_name in store.list_documents(&folder)? {
            bump_document(store, &folder, &doc_name, target)?;
        }
    }
    for doc_name in store.list_documents(account_folder)? {
        if doc_name != ACCOUNT_DOCUMENT {
            bump_document(store, account_folder, &doc_name, target)?;
        }
    }
    bump_document(store, account_folder, ACCOUNT_DOCUMENT, target)
}

fn bump_document(store: &DocStore, folder: &Path, name: &str, target: u32) -> Result<()> {
    let Some(mut doc) = store.read_document(folder, name)? else {
        return Ok(());
    };
    if read_generation(&doc).ok() == Some(target) {
        return Ok(());
    }
    doc[FIELD_VERSION] = target.into();
    store.write_document(folder, name, &doc)
}
