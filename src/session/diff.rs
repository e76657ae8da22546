//! Directory comparison in patch form.

use crate::types::Digest;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One line of a directory patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", content = "path", rename_all = "snake_case")]
pub enum DiffLine {
    /// Only in the base, or different in the patch.
    Removed(String),
    /// Only in the patch, or different in the base.
    Added(String),
}

impl fmt::Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffLine::Removed(path) => write!(f, "-{}", path),
            DiffLine::Added(path) => write!(f, "+{}", path),
        }
    }
}

/// Removals in base order, then additions in patch order. A path whose digest
/// differs appears on both sides.
pub fn diff_file_maps(
    base: &BTreeMap<String, Digest>,
    patch: &BTreeMap<String, Digest>,
) -> Vec<DiffLine> {
    let removed = base
        .iter()
        .filter(|(path, digest)| patch.get(*path) != Some(*digest))
        .map(|(path, _)| DiffLine::Removed(path.clone()));
    let added = patch
        .iter()
        .filter(|(path, digest)| base.get(*path) != Some(*digest))
        .map(|(path, _)| DiffLine::Added(path.clone()));
    removed.chain(added).collect()
}
