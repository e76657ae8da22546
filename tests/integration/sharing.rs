use dedupfs::audit::audit_root;
use dedupfs::config::{LayoutConfig, RootLayout};
use dedupfs::store::hasher::digest_bytes;
use dedupfs::{ApiError, OpenOptions, VirtualFileSystem};

use crate::integration::support::{entity_files, fresh_session, names, root_of};

#[test]
fn identical_content_across_users_is_stored_once() {
    let (temp_dir, mut alice) = fresh_session("alice");
    let root = root_of(&temp_dir);
    let shared = digest_bytes(b"shared report");

    alice.import_bytes("/report.pdf", b"shared report", false).unwrap();
    alice.commit().unwrap();

    let mut bob = VirtualFileSystem::open(&root, "bob", &OpenOptions::default()).unwrap();
    assert!(bob.list("/").unwrap().is_empty());
    assert!(bob.has_entity(&shared).unwrap());
    bob.import_bytes("/copy-of-report.pdf", b"shared report", false).unwrap();
    assert_eq!(bob.refcounts().unwrap().get(&shared), 2);
    bob.commit().unwrap();

    assert_eq!(entity_files(&root), vec![shared.to_hex()]);

    let alice = VirtualFileSystem::open(&root, "alice", &OpenOptions::default()).unwrap();
    assert_eq!(names(&alice, "/"), vec!["report.pdf"]);
    drop(alice);
}

#[test]
fn entity_survives_until_last_user_removes_it() {
    let (temp_dir, mut alice) = fresh_session("alice");
    let root = root_of(&temp_dir);
    let digest = alice.import_bytes("/a", b"payload", false).unwrap();
    alice.commit().unwrap();

    VirtualFileSystem::scoped(&root, "bob", &OpenOptions::default(), |vfs| {
        vfs.add_file_by_digest("/b", &digest, false)
    })
    .unwrap();

    let outcome = VirtualFileSystem::scoped(&root, "alice", &OpenOptions::default(), |vfs| {
        vfs.remove("/a", false)
    })
    .unwrap();
    assert_eq!(outcome.files, 1);
    assert_eq!(outcome.reclaimed, 0);
    assert_eq!(entity_files(&root).len(), 1);

    let outcome = VirtualFileSystem::scoped(&root, "bob", &OpenOptions::default(), |vfs| {
        assert_eq!(vfs.read("/b")?, b"payload");
        vfs.remove("/b", false)
    })
    .unwrap();
    assert_eq!(outcome.reclaimed, 1);
    assert!(entity_files(&root).is_empty());
}

#[test]
fn adding_unknown_digest_is_rejected() {
    let (_temp_dir, mut vfs) = fresh_session("alice");
    let unknown = digest_bytes(b"never stored");
    let err = vfs.add_file_by_digest("/ghost", &unknown, false).unwrap_err();
    assert!(matches!(err, ApiError::StorageError(_)));
    assert!(!vfs.exists("/ghost").unwrap());
    assert!(vfs.refcounts().unwrap().is_empty());
    vfs.abandon().unwrap();
}

#[test]
fn move_keeps_counts_and_copy_adds_references() {
    let (_temp_dir, mut vfs) = fresh_session("alice");
    vfs.import_bytes("/docs/a.txt", b"A", true).unwrap();
    vfs.import_bytes("/docs/sub/b.txt", b"B", true).unwrap();
    let a = digest_bytes(b"A");
    let b = digest_bytes(b"B");

    vfs.move_node("/docs", "/archive").unwrap();
    assert_eq!(vfs.refcounts().unwrap().get(&a), 1);
    assert_eq!(vfs.refcounts().unwrap().get(&b), 1);
    assert!(!vfs.exists("/docs").unwrap());
    assert_eq!(vfs.read("/archive/sub/b.txt").unwrap(), b"B");

    assert_eq!(vfs.copy("/archive", "/backup").unwrap(), 2);
    assert_eq!(vfs.refcounts().unwrap().get(&a), 2);
    assert_eq!(vfs.refcounts().unwrap().get(&b), 2);

    let outcome = vfs.remove("/archive", true).unwrap();
    assert_eq!(outcome.files, 2);
    assert_eq!(outcome.reclaimed, 0);
    assert_eq!(vfs.read("/backup/a.txt").unwrap(), b"A");
    vfs.commit().unwrap();
}

#[test]
fn refcount_document_is_versioned_json() {
    let (temp_dir, mut vfs) = fresh_session("alice");
    let root = root_of(&temp_dir);
    let digest = vfs.import_bytes("/x", b"x", false).unwrap();
    vfs.import_bytes("/y", b"x", false).unwrap();
    vfs.commit().unwrap();

    let raw = std::fs::read_to_string(root.join("refcounts.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["format_version"], 1);
    assert_eq!(doc["counts"][digest.to_hex()], 2);

    let tree_raw = std::fs::read_to_string(root.join("Users/alice/dirTree.json")).unwrap();
    let tree: serde_json::Value = serde_json::from_str(&tree_raw).unwrap();
    assert_eq!(tree["format_version"], 1);
    assert_eq!(tree["root"]["children"]["x"]["kind"], "file");
    assert_eq!(tree["root"]["children"]["x"]["digest"], digest.to_hex());
}

#[test]
fn invalid_user_ids_are_rejected() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    for user in ["", "..", "a/b"] {
        let err = VirtualFileSystem::open(temp_dir.path(), user, &OpenOptions::init()).unwrap_err();
        assert!(matches!(err, ApiError::InvalidUserId(_)), "{:?}", user);
    }
}

#[test]
fn undeletable_blob_leaves_an_orphan_not_a_stale_count() {
    let (temp_dir, mut vfs) = fresh_session("alice");
    let root = root_of(&temp_dir);
    let a = vfs.import_bytes("/d/a", b"first", true).unwrap();
    let b = vfs.import_bytes("/d/b", b"second", true).unwrap();
    vfs.commit().unwrap();

    // A non-empty directory where the blob should be cannot be unlinked.
    let blob = root.join("EntityFiles").join(a.to_hex());
    std::fs::remove_file(&blob).unwrap();
    std::fs::create_dir(&blob).unwrap();
    std::fs::write(blob.join("stuck"), b"x").unwrap();

    let outcome = VirtualFileSystem::scoped(&root, "alice", &OpenOptions::default(), |vfs| {
        vfs.remove("/d", true)
    })
    .unwrap();
    assert_eq!(outcome.files, 2);
    assert_eq!(outcome.reclaimed, 1);
    assert_eq!(outcome.orphaned, 1);

    let vfs = VirtualFileSystem::open(&root, "alice", &OpenOptions::default()).unwrap();
    assert!(!vfs.exists("/d").unwrap());
    assert_eq!(vfs.refcounts().unwrap().get(&a), 0);
    assert_eq!(vfs.refcounts().unwrap().get(&b), 0);
    assert!(!vfs.has_entity(&b).unwrap());
    drop(vfs);

    let report = audit_root(&RootLayout::new(&root, LayoutConfig::default())).unwrap();
    assert!(report.is_consistent(), "{:?}", report);
    assert_eq!(report.orphans, vec![a]);
}
