//! Concurrency tests: per-account serialization of lazy migration and
//! independence of unrelated accounts.

use metafs::prelude::*;
use metafs::{ids, CURRENT_GENERATION};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn store() -> (TempDir, Arc<MetaStore>) {
    let dir = TempDir::new().unwrap();
    let store = MetaStore::open(dir.path().join("serverworkspace")).unwrap();
    (dir, Arc::new(store))
}

fn gen4_account(root: &Path, account_id: &str) {
    let folder = root.join(ids::account_folder_name(account_id));
    let ws_id = ids::encode_workspace_id(account_id, "Workspace");
    fs::create_dir_all(&folder).unwrap();
    fs::write(
        folder.join("user.json"),
        serde_json::to_vec(&json!({
            "Version": 4,
            "UniqueId": account_id,
            "UserName": account_id,
            "FullName": account_id,
            "WorkspaceIds": [ws_id.as_str()],
            "Properties": {}
        }))
        .unwrap(),
    )
    .unwrap();
    let ws_folder = folder.join("Workspace");
    fs::create_dir_all(&ws_folder).unwrap();
    fs::write(
        ws_folder.join("workspace.json"),
        serde_json::to_vec(&json!({
            "Version": 4,
            "UniqueId": ws_id.as_str(),
            "UserId": account_id,
            "FullName": "Workspace",
            "ProjectNames": [],
            "Properties": {}
        }))
        .unwrap(),
    )
    .unwrap();
}

#[test]
fn concurrent_first_touches_of_a_stale_account_all_succeed() {
    let (_dir, store) = store();
    gen4_account(store.path(), "anthony");

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                store.read_account("anthony").unwrap()
            })
        })
        .collect();

    let accounts: Vec<Account> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for account in &accounts {
        assert_eq!(account.version, CURRENT_GENERATION);
        assert_eq!(account, &accounts[0], "every reader sees the same document");
    }
    // The nested workspace document was relocated exactly once.
    let ws_id = ids::encode_workspace_id("anthony", "Workspace");
    let ws = store.read_workspace(&ws_id).unwrap();
    assert_eq!(ws.version, CURRENT_GENERATION);
}

#[test]
fn independent_accounts_do_not_interfere() {
    let (_dir, store) = store();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                let id = format!("user{i}");
                store.create_account(&id).unwrap();
                let ws = store.create_workspace(&id, "Workspace").unwrap();
                store.create_project(&ws.unique_id, "P", None).unwrap();
                id
            })
        })
        .collect();

    for handle in handles {
        let id = handle.join().unwrap();
        let account = store.read_account(&id).unwrap();
        assert_eq!(account.workspace_ids.len(), 1);
        let ws = store.read_workspace(&account.workspace_ids[0]).unwrap();
        assert_eq!(ws.project_names, vec!["P".to_string()]);
    }
}

#[test]
fn one_broken_account_does_not_poison_the_others() {
    let (_dir, store) = store();
    // mallory's account document is torn; alice's is fine.
    let mallory = store.path().join("mallory");
    fs::create_dir_all(&mallory).unwrap();
    fs::write(mallory.join("user.json"), b"{torn").unwrap();
    gen4_account(store.path(), "alice");

    let err = store.read_account("mallory").unwrap_err();
    assert!(err.is_fatal());

    let account = store.read_account("alice").unwrap();
    assert_eq!(account.version, CURRENT_GENERATION);

    // The broken account keeps failing the same way, without blocking.
    assert!(store.read_account("mallory").unwrap_err().is_fatal());
}

#[test]
fn recreated_account_serializes_like_a_fresh_one() {
    let (_dir, store) = store();
    store.create_account("alice").unwrap();
    store.delete_account("alice").unwrap();
    store.create_account("alice").unwrap();
    let ws = store.create_workspace("alice", "Workspace").unwrap();

    // Writers racing right after the delete-and-recreate must still go
    // through one lock per account id: no lost updates.
    let handles: Vec<_> = (0..6)
        .map(|i| {
            let store = store.clone();
            let ws_id = ws.unique_id.clone();
            thread::spawn(move || {
                store
                    .create_project(&ws_id, &format!("project {i}"), None)
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let ws = store.read_workspace(&ws.unique_id).unwrap();
    assert_eq!(ws.project_names.len(), 6);
}

#[test]
fn interleaved_writes_to_one_account_serialize_cleanly() {
    let (_dir, store) = store();
    store.create_account("alice").unwrap();
    let ws = store.create_workspace("alice", "Workspace").unwrap();

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let store = store.clone();
            let ws_id = ws.unique_id.clone();
            thread::spawn(move || {
                store
                    .create_project(&ws_id, &format!("project {i}"), None)
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let ws = store.read_workspace(&ws.unique_id).unwrap();
    assert_eq!(ws.project_names.len(), 6, "no lost updates");
    for i in 0..6 {
        assert!(ws.project_names.contains(&format!("project {i}")));
    }
}
