//! Root audit
//!
//! Recomputes every reference count from the committed user trees and checks
//! it against the refcount table and the entity directory. Reads committed
//! state only, so it must not run while a session is open on the same root.

use crate::config::RootLayout;
use crate::error::ApiError;
use crate::store::{EntityFile, EntityStore, RefCountTable};
use crate::tree::DirTree;
use crate::types::Digest;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info};

/// A digest whose recorded count differs from the number of leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountMismatch {
    pub digest: Digest,
    pub recorded: u64,
    pub expected: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub users: usize,
    pub digests: usize,
    pub entities: usize,
    pub mismatches: Vec<CountMismatch>,
    /// Referenced or counted, but no entity file.
    pub missing: Vec<Digest>,
    /// Entity files nothing counts or references.
    pub orphans: Vec<Digest>,
    /// Leftovers of interrupted writes.
    pub temporaries: Vec<PathBuf>,
    /// Files in the entity directory that are not named by a digest.
    pub foreign: Vec<PathBuf>,
}

impl AuditReport {
    /// Counts match the trees and every counted entity exists.
    ///
    /// Orphans and temporaries are tolerated slack, not inconsistency.
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty() && self.missing.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub entities: usize,
    pub temporaries: usize,
    pub bytes: u64,
}

/// Audit a root against its committed documents.
pub fn audit_root(layout: &RootLayout) -> Result<AuditReport, ApiError> {
    if !layout.is_initialized() {
        return Err(ApiError::RootInvalid(layout.root().to_path_buf()));
    }
    let table = RefCountTable::load(&layout.refcount_file())?;
    let users = layout.users()?;

    let mut expected: BTreeMap<Digest, u64> = BTreeMap::new();
    for user in &users {
        let tree = DirTree::load(&layout.tree_file(user))?;
        for digest in tree.all_digests() {
            *expected.entry(digest).or_insert(0) += 1;
        }
    }

    let store = EntityStore::new(layout.entities_dir());
    let mut on_disk = BTreeSet::new();
    let mut report = AuditReport {
        users: users.len(),
        digests: table.len(),
        ..AuditReport::default()
    };
    for file in store.scan()? {
        match file {
            EntityFile::Entity(digest) => {
                on_disk.insert(digest);
            }
            EntityFile::Temporary(path) => report.temporaries.push(path),
            EntityFile::Foreign(path) => report.foreign.push(path),
        }
    }
    report.entities = on_disk.len();

    let counted: BTreeSet<Digest> = table.iter().map(|(d, _)| *d).collect();
    let referenced: BTreeSet<Digest> = expected.keys().copied().collect();
    for digest in counted.union(&referenced) {
        let recorded = table.get(digest);
        let wanted = expected.get(digest).copied().unwrap_or(0);
        if recorded != wanted {
            report.mismatches.push(CountMismatch {
                digest: *digest,
                recorded,
                expected: wanted,
            });
        }
        if !on_disk.contains(digest) {
            report.missing.push(*digest);
        }
    }
    report.orphans = on_disk
        .iter()
        .filter(|d| !counted.contains(*d) && !referenced.contains(*d))
        .copied()
        .collect();
    report.temporaries.sort();
    report.foreign.sort();

    info!(
        root = %layout.root().display(),
        mismatches = report.mismatches.len(),
        missing = report.missing.len(),
        orphans = report.orphans.len(),
        "Audit finished"
    );
    Ok(report)
}

/// Delete orphan entities and stale temporary files.
pub fn sweep_orphans(layout: &RootLayout) -> Result<SweepReport, ApiError> {
    let report = audit_root(layout)?;
    let store = EntityStore::new(layout.entities_dir());
    let mut sweep = SweepReport::default();
    for digest in &report.orphans {
        sweep.bytes += store.size(digest).unwrap_or(0);
        store.delete(digest)?;
        sweep.entities += 1;
    }
    for path in &report.temporaries {
        sweep.bytes += std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        std::fs::remove_file(path)?;
        debug!(path = %path.display(), "Removed stale temporary file");
        sweep.temporaries += 1;
    }
    info!(
        entities = sweep.entities,
        temporaries = sweep.temporaries,
        bytes = sweep.bytes,
        "Sweep finished"
    );
    Ok(sweep)
}
