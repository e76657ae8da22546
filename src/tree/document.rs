//! Tree document: the persisted form of one user's directory tree.

use crate::error::StorageError;
use crate::store::persistence;
use crate::tree::node::{DirectoryNode, Node};
use crate::tree::DirTree;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const TREE_FORMAT_VERSION: u32 = 1;

/// Serialized directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeDocument {
    pub format_version: u32,
    pub root: DirectoryNode,
}

/// Structural problems found while rebuilding a tree from a document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("unsupported tree format version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid child name {name:?} under {parent}")]
    InvalidName { parent: String, name: String },
}

impl DirTree {
    pub fn to_document(&self) -> TreeDocument {
        TreeDocument {
            format_version: TREE_FORMAT_VERSION,
            root: self.root().clone(),
        }
    }

    /// Rebuild a tree; the current directory starts at the root.
    pub fn from_document(doc: TreeDocument) -> Result<DirTree, DocumentError> {
        if doc.format_version != TREE_FORMAT_VERSION {
            return Err(DocumentError::UnsupportedVersion(doc.format_version));
        }
        validate_names(&doc.root, "/")?;
        Ok(DirTree::from_root(doc.root))
    }

    /// Load a tree file. A missing file yields an empty tree.
    pub fn load(path: &Path) -> Result<DirTree, StorageError> {
        if !path.exists() {
            return Ok(DirTree::new());
        }
        let doc: TreeDocument = persistence::load_json(path)?;
        DirTree::from_document(doc).map_err(|e| StorageError::corrupt(path, e))
    }

    /// Atomically overwrite the tree file.
    pub fn save(&self, path: &Path, pretty: bool) -> Result<(), StorageError> {
        persistence::save_json(path, &self.to_document(), pretty)
    }
}

fn validate_names(dir: &DirectoryNode, at: &str) -> Result<(), DocumentError> {
    for (name, child) in &dir.children {
        if name.is_empty() || name.contains('/') {
            return Err(DocumentError::InvalidName {
                parent: at.to_string(),
                name: name.clone(),
            });
        }
        if let Node::Directory(sub) = child {
            let below = if at == "/" {
                format!("/{}", name)
            } else {
                format!("{}/{}", at, name)
            };
            validate_names(sub, &below)?;
        }
    }
    Ok(())
}
