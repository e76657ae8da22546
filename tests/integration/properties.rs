use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use dedupfs::audit::audit_root;
use dedupfs::config::{LayoutConfig, RootLayout};
use dedupfs::store::hasher::digest_bytes;
use dedupfs::tree::{DirTree, DirectoryNode, FileNode, Node, NodeMetadata};
use dedupfs::{OpenOptions, VirtualFileSystem};
use proptest::prelude::*;

use crate::integration::support::{entity_files, fresh_session, root_of};

#[derive(Debug, Clone)]
enum Op {
    Import { slot: u8, content: u8 },
    Remove { slot: u8 },
    Copy { from: u8, to: u8 },
    Move { from: u8, to: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6, 0u8..3).prop_map(|(slot, content)| Op::Import { slot, content }),
        (0u8..6).prop_map(|slot| Op::Remove { slot }),
        (0u8..6, 0u8..6).prop_map(|(from, to)| Op::Copy { from, to }),
        (0u8..6, 0u8..6).prop_map(|(from, to)| Op::Move { from, to }),
    ]
}

fn slot(n: u8) -> String {
    format!("/f{}", n)
}

fn apply(vfs: &mut VirtualFileSystem, op: &Op) {
    // Most random operations hit an occupied or missing slot; those errors are
    // expected and must leave state unchanged.
    let result = match op {
        Op::Import { slot: s, content } => vfs
            .import_bytes(&slot(*s), &[*content; 8], false)
            .map(|_| ()),
        Op::Remove { slot: s } => vfs.remove(&slot(*s), false).map(|_| ()),
        Op::Copy { from, to } => vfs.copy(&slot(*from), &slot(*to)).map(|_| ()),
        Op::Move { from, to } => vfs.move_node(&slot(*from), &slot(*to)),
    };
    if let Err(err) = result {
        assert!(!err.is_fatal(), "unexpected fatal error {err}");
    }
}

fn assert_counts_match_tree(vfs: &VirtualFileSystem) {
    let mut expected: BTreeMap<_, u64> = BTreeMap::new();
    for digest in vfs.tree().unwrap().all_digests() {
        *expected.entry(digest).or_insert(0) += 1;
    }
    let table: BTreeMap<_, u64> = vfs
        .refcounts()
        .unwrap()
        .iter()
        .map(|(d, n)| (*d, n))
        .collect();
    assert_eq!(table, expected);

    for content in 0u8..3 {
        let digest = digest_bytes(&[content; 8]);
        assert_eq!(
            vfs.has_entity(&digest).unwrap(),
            vfs.refcounts().unwrap().get(&digest) > 0,
            "entity presence disagrees with count for content {content}"
        );
    }
}

fn tree_strategy() -> impl Strategy<Value = DirectoryNode> {
    let leaf = (any::<u8>(), 0u64..4096).prop_map(|(b, size)| {
        Node::File(FileNode {
            digest: digest_bytes(&[b]),
            size,
            metadata: fixed_metadata(),
        })
    });
    let node = leaf.prop_recursive(3, 24, 4, |inner| {
        prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(|children| {
            Node::Directory(DirectoryNode {
                metadata: fixed_metadata(),
                children,
            })
        })
    });
    prop::collection::btree_map("[a-z]{1,6}", node, 0..5).prop_map(|children| DirectoryNode {
        metadata: fixed_metadata(),
        children,
    })
}

fn fixed_metadata() -> NodeMetadata {
    let at = Utc
        .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    NodeMetadata::at(at)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn counts_track_leaves_under_random_operations(
        ops in prop::collection::vec(op_strategy(), 1..40)
    ) {
        let (temp_dir, mut vfs) = fresh_session("p");
        for op in &ops {
            apply(&mut vfs, op);
            assert_counts_match_tree(&vfs);
        }
        vfs.commit().unwrap();

        let report = audit_root(&RootLayout::new(root_of(&temp_dir), LayoutConfig::default())).unwrap();
        prop_assert!(report.is_consistent());
        prop_assert!(report.orphans.is_empty());
        prop_assert_eq!(entity_files(&root_of(&temp_dir)).len(), report.digests);
    }

    #[test]
    fn two_users_stay_consistent(
        first in prop::collection::vec(op_strategy(), 1..20),
        second in prop::collection::vec(op_strategy(), 1..20)
    ) {
        let (temp_dir, mut vfs) = fresh_session("one");
        let root = root_of(&temp_dir);
        for op in &first {
            apply(&mut vfs, op);
        }
        vfs.commit().unwrap();

        let mut vfs = VirtualFileSystem::open(&root, "two", &OpenOptions::default()).unwrap();
        for op in &second {
            apply(&mut vfs, op);
        }
        vfs.commit().unwrap();

        let report = audit_root(&RootLayout::new(&root, LayoutConfig::default())).unwrap();
        prop_assert!(report.is_consistent(), "{:?}", report);
        prop_assert!(report.orphans.is_empty());
        prop_assert_eq!(report.users, 2);
    }

    #[test]
    fn tree_documents_reload_identically(root in tree_strategy()) {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("dirTree.json");
        let tree = DirTree::from_root(root);
        tree.save(&path, false).unwrap();
        let loaded = DirTree::load(&path).unwrap();
        prop_assert_eq!(loaded, tree);
    }
}
