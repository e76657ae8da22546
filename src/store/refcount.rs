//! Reference count table
//!
//! Maps each digest to the number of tree leaves, across all users, that
//! point at it. Pure bookkeeping: the caller acts on `Reclaim` decisions by
//! deleting the entity, this module never touches entity files.

use crate::error::StorageError;
use crate::store::persistence;
use crate::types::Digest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const FORMAT_VERSION: u32 = 1;

/// Outcome of a decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimDecision {
    /// Other leaves still reference the digest.
    Retain { remaining: u64 },
    /// The last reference is gone and the entry was dropped; delete the entity.
    Reclaim,
}

#[derive(Serialize, Deserialize)]
struct RefCountDocument {
    format_version: u32,
    counts: BTreeMap<Digest, u64>,
}

/// In-memory reference count table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefCountTable {
    counts: BTreeMap<Digest, u64>,
}

impl RefCountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the persisted table. Unparseable documents, unknown versions and
    /// zero counts are all `CorruptState`.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let doc: RefCountDocument = persistence::load_json(path)?;
        if doc.format_version != FORMAT_VERSION {
            return Err(StorageError::corrupt(
                path,
                format!("unsupported refcount format version {}", doc.format_version),
            ));
        }
        if let Some((digest, _)) = doc.counts.iter().find(|(_, count)| **count == 0) {
            return Err(StorageError::corrupt(
                path,
                format!("zero count recorded for {}", digest),
            ));
        }
        Ok(Self { counts: doc.counts })
    }

    /// Overwrite the refcount file with the full table.
    pub fn save(&self, path: &Path, pretty: bool) -> Result<(), StorageError> {
        let doc = RefCountDocument {
            format_version: FORMAT_VERSION,
            counts: self.counts.clone(),
        };
        persistence::save_json(path, &doc, pretty)
    }

    /// Add one reference, creating the entry at 1 if absent.
    pub fn increment(&mut self, digest: &Digest) -> u64 {
        let count = self.counts.entry(*digest).or_insert(0);
        *count += 1;
        *count
    }

    /// Drop one reference.
    ///
    /// Decrementing an absent digest is a caller contract violation and
    /// fails with `InvariantViolation`.
    pub fn decrement(&mut self, digest: &Digest) -> Result<ReclaimDecision, StorageError> {
        let count = self.counts.get_mut(digest).ok_or_else(|| {
            StorageError::InvariantViolation(format!("decrement of unreferenced digest {}", digest))
        })?;
        if *count == 0 {
            return Err(StorageError::InvariantViolation(format!(
                "decrement of zero count for {}",
                digest
            )));
        }
        *count -= 1;
        if *count == 0 {
            self.counts.remove(digest);
            Ok(ReclaimDecision::Reclaim)
        } else {
            Ok(ReclaimDecision::Retain { remaining: *count })
        }
    }

    /// Current count, 0 when absent.
    pub fn get(&self, digest: &Digest) -> u64 {
        self.counts.get(digest).copied().unwrap_or(0)
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.counts.contains_key(digest)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Digest, u64)> {
        self.counts.iter().map(|(d, c)| (d, *c))
    }
}
