//! Directory Tree
//!
//! One user's in-memory hierarchy of directories and file leaves. Every
//! mutation validates fully before it touches the tree, so a failed call
//! leaves the tree exactly as it was. File leaves only hold digests; the
//! caller owns the refcount bookkeeping for whatever digests an operation
//! hands back.

pub mod document;
pub mod node;
pub mod path;

pub use document::{DocumentError, TreeDocument};
pub use node::{DirectoryNode, FileNode, Node, NodeMetadata, NodeRef};
pub use path::VirtualPath;

use crate::error::ApiError;
use crate::types::{Digest, NodeKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
    /// File size; number of children for directories.
    pub size: u64,
    pub digest: Option<Digest>,
    pub modified: DateTime<Utc>,
}

/// Detailed description of a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub path: String,
    pub kind: NodeKind,
    pub size: u64,
    pub digest: Option<Digest>,
    pub metadata: NodeMetadata,
}

/// Directory tree with a current-directory cursor.
#[derive(Debug, Clone)]
pub struct DirTree {
    root: DirectoryNode,
    cwd: Vec<String>,
}

/// Structural equality; the current directory is session state and ignored.
impl PartialEq for DirTree {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl Eq for DirTree {}

impl Default for DirTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirTree {
    pub fn new() -> Self {
        Self::from_root(DirectoryNode::new(Utc::now()))
    }

    pub fn from_root(root: DirectoryNode) -> Self {
        Self {
            root,
            cwd: Vec::new(),
        }
    }

    pub fn root(&self) -> &DirectoryNode {
        &self.root
    }

    /// Absolute path of the current directory.
    pub fn current_dir(&self) -> String {
        path::render(&self.cwd)
    }

    /// Absolute segments for `path` relative to the current directory.
    pub fn absolute(&self, path: &VirtualPath) -> Vec<String> {
        path.to_absolute(&self.cwd)
    }

    pub fn exists(&self, path: &VirtualPath) -> bool {
        self.walk(&self.absolute(path)).is_ok()
    }

    /// Find the node at `path`.
    pub fn resolve(&self, path: &VirtualPath) -> Result<NodeRef<'_>, ApiError> {
        self.walk(&self.absolute(path))
    }

    /// Children of the directory at `path`, ordered by name.
    pub fn list(&self, path: &VirtualPath) -> Result<Vec<DirEntry>, ApiError> {
        let abs = self.absolute(path);
        let dir = self.dir(&abs)?;
        Ok(dir
            .children
            .iter()
            .map(|(name, node)| match node {
                Node::Directory(d) => DirEntry {
                    name: name.clone(),
                    kind: NodeKind::Directory,
                    size: d.children.len() as u64,
                    digest: None,
                    modified: d.metadata.modified,
                },
                Node::File(f) => DirEntry {
                    name: name.clone(),
                    kind: NodeKind::File,
                    size: f.size,
                    digest: Some(f.digest),
                    modified: f.metadata.modified,
                },
            })
            .collect())
    }

    pub fn stat(&self, path: &VirtualPath) -> Result<NodeInfo, ApiError> {
        let abs = self.absolute(path);
        let node = self.walk(&abs)?;
        let (size, digest) = match node {
            NodeRef::Directory(d) => (d.children.len() as u64, None),
            NodeRef::File(f) => (f.size, Some(f.digest)),
        };
        Ok(NodeInfo {
            path: path::render(&abs),
            kind: node.kind(),
            size,
            digest,
            metadata: node.metadata().clone(),
        })
    }

    /// Digest of the file leaf at `path`.
    pub fn file_digest(&self, path: &VirtualPath) -> Result<Digest, ApiError> {
        let abs = self.absolute(path);
        match self.walk(&abs)? {
            NodeRef::File(f) => Ok(f.digest),
            NodeRef::Directory(_) => Err(ApiError::NotAFile(path::render(&abs))),
        }
    }

    /// Move the current-directory cursor.
    pub fn change_dir(&mut self, path: &VirtualPath) -> Result<(), ApiError> {
        let abs = self.absolute(path);
        self.dir(&abs)?;
        self.cwd = abs;
        Ok(())
    }

    /// Check that a node could be inserted at `path` without changing anything.
    pub fn check_insert(&self, path: &VirtualPath, recursive: bool) -> Result<(), ApiError> {
        self.check_insert_abs(&self.absolute(path), recursive)
    }

    /// Insert a file leaf. Never overwrites.
    pub fn add_file(
        &mut self,
        path: &VirtualPath,
        digest: Digest,
        size: u64,
        recursive: bool,
    ) -> Result<(), ApiError> {
        let abs = self.absolute(path);
        self.check_insert_abs(&abs, recursive)?;
        let now = Utc::now();
        let leaf = Node::File(FileNode {
            digest,
            size,
            metadata: NodeMetadata::at(now),
        });
        self.insert_abs(&abs, leaf, recursive, now)
    }

    /// Insert an empty directory. Never overwrites.
    pub fn add_dir(&mut self, path: &VirtualPath, recursive: bool) -> Result<(), ApiError> {
        let abs = self.absolute(path);
        self.check_insert_abs(&abs, recursive)?;
        let now = Utc::now();
        self.insert_abs(&abs, Node::Directory(DirectoryNode::new(now)), recursive, now)
    }

    /// Detach the node at `path` and return the digest of every file leaf it
    /// held, one entry per leaf.
    ///
    /// Non-empty directories need `recursive`. The root and any directory
    /// holding the current directory cannot be removed.
    pub fn remove(&mut self, path: &VirtualPath, recursive: bool) -> Result<Vec<Digest>, ApiError> {
        let abs = self.absolute(path);
        if abs.is_empty() {
            return Err(ApiError::InvalidOperation(
                "the root directory cannot be removed".to_string(),
            ));
        }
        if let NodeRef::Directory(d) = self.walk(&abs)? {
            if !recursive && !d.children.is_empty() {
                return Err(ApiError::DirectoryNotEmpty(path::render(&abs)));
            }
            if path::starts_with(&self.cwd, &abs) {
                return Err(ApiError::InvalidOperation(format!(
                    "{} contains the current directory",
                    path::render(&abs)
                )));
            }
        }
        let now = Utc::now();
        let node = self.detach_abs(&abs, now)?;
        let mut digests = Vec::new();
        node.collect_digests(&mut digests);
        Ok(digests)
    }

    /// Relocate a node. Digests are untouched.
    pub fn move_node(&mut self, src: &VirtualPath, dst: &VirtualPath) -> Result<(), ApiError> {
        let src_abs = self.absolute(src);
        let dst_abs = self.absolute(dst);
        if src_abs.is_empty() {
            return Err(ApiError::InvalidOperation(
                "the root directory cannot be moved".to_string(),
            ));
        }
        let src_kind = self.walk(&src_abs)?.kind();
        self.check_insert_abs(&dst_abs, false)?;
        if path::starts_with(&dst_abs, &src_abs) {
            return Err(ApiError::InvalidOperation(format!(
                "cannot move {} into itself",
                path::render(&src_abs)
            )));
        }
        if src_kind == NodeKind::Directory && path::starts_with(&self.cwd, &src_abs) {
            return Err(ApiError::InvalidOperation(format!(
                "{} contains the current directory",
                path::render(&src_abs)
            )));
        }
        let now = Utc::now();
        let mut node = self.detach_abs(&src_abs, now)?;
        node.touch_recursive(now);
        self.insert_abs(&dst_abs, node, false, now)
    }

    /// Deep-copy a node and return the digest of every copied file leaf.
    pub fn copy_node(&mut self, src: &VirtualPath, dst: &VirtualPath) -> Result<Vec<Digest>, ApiError> {
        let src_abs = self.absolute(src);
        let dst_abs = self.absolute(dst);
        let mut node = match self.walk(&src_abs)? {
            NodeRef::Directory(d) => Node::Directory(d.clone()),
            NodeRef::File(f) => Node::File(f.clone()),
        };
        self.check_insert_abs(&dst_abs, false)?;
        if path::starts_with(&dst_abs, &src_abs) {
            return Err(ApiError::InvalidOperation(format!(
                "cannot copy {} into itself",
                path::render(&src_abs)
            )));
        }
        let now = Utc::now();
        node.touch_recursive(now);
        let mut digests = Vec::new();
        node.collect_digests(&mut digests);
        self.insert_abs(&dst_abs, node, false, now)?;
        Ok(digests)
    }

    /// Replace the attribute map of the node at `path`.
    pub fn set_attributes(
        &mut self,
        path: &VirtualPath,
        attributes: BTreeMap<String, String>,
    ) -> Result<(), ApiError> {
        let abs = self.absolute(path);
        let now = Utc::now();
        let metadata = match abs.split_last() {
            None => &mut self.root.metadata,
            Some((name, parent)) => {
                let dir = self.dir_mut(parent)?;
                match dir.children.get_mut(name) {
                    Some(node) => node.metadata_mut(),
                    None => return Err(ApiError::PathNotFound(path::render(&abs))),
                }
            }
        };
        metadata.attributes = attributes;
        metadata.modified = now;
        Ok(())
    }

    /// Every file below the directory at `path`, keyed by relative path.
    pub fn files_under(&self, path: &VirtualPath) -> Result<BTreeMap<String, Digest>, ApiError> {
        let abs = self.absolute(path);
        let dir = self.dir(&abs)?;
        let mut out = BTreeMap::new();
        collect_files(dir, "", &mut out);
        Ok(out)
    }

    /// Digest of every file leaf in the tree, one entry per leaf.
    pub fn all_digests(&self) -> Vec<Digest> {
        let mut out = Vec::new();
        for child in self.root.children.values() {
            child.collect_digests(&mut out);
        }
        out
    }

    fn walk(&self, abs: &[String]) -> Result<NodeRef<'_>, ApiError> {
        let mut dir = &self.root;
        for (i, seg) in abs.iter().enumerate() {
            match dir.children.get(seg) {
                Some(Node::Directory(d)) => dir = d,
                Some(Node::File(f)) if i + 1 == abs.len() => return Ok(NodeRef::File(f)),
                Some(Node::File(_)) => {
                    return Err(ApiError::NotADirectory(path::render(&abs[..=i])))
                }
                None => return Err(ApiError::PathNotFound(path::render(&abs[..=i]))),
            }
        }
        Ok(NodeRef::Directory(dir))
    }

    fn dir(&self, abs: &[String]) -> Result<&DirectoryNode, ApiError> {
        match self.walk(abs)? {
            NodeRef::Directory(d) => Ok(d),
            NodeRef::File(_) => Err(ApiError::NotADirectory(path::render(abs))),
        }
    }

    fn dir_mut(&mut self, abs: &[String]) -> Result<&mut DirectoryNode, ApiError> {
        let mut dir = &mut self.root;
        for (i, seg) in abs.iter().enumerate() {
            dir = match dir.children.get_mut(seg) {
                Some(Node::Directory(d)) => d,
                Some(Node::File(_)) => {
                    return Err(ApiError::NotADirectory(path::render(&abs[..=i])))
                }
                None => return Err(ApiError::PathNotFound(path::render(&abs[..=i]))),
            };
        }
        Ok(dir)
    }

    fn check_insert_abs(&self, abs: &[String], recursive: bool) -> Result<(), ApiError> {
        let Some((name, parent)) = abs.split_last() else {
            return Err(ApiError::AlreadyExists("/".to_string()));
        };
        let mut dir = &self.root;
        for (i, seg) in parent.iter().enumerate() {
            match dir.children.get(seg) {
                Some(Node::Directory(d)) => dir = d,
                Some(Node::File(_)) => {
                    return Err(ApiError::NotADirectory(path::render(&parent[..=i])))
                }
                // Everything from here down would be created.
                None if recursive => return Ok(()),
                None => return Err(ApiError::PathNotFound(path::render(&parent[..=i]))),
            }
        }
        if dir.children.contains_key(name) {
            return Err(ApiError::AlreadyExists(path::render(abs)));
        }
        Ok(())
    }

    /// Insert after `check_insert_abs` succeeded.
    fn insert_abs(
        &mut self,
        abs: &[String],
        node: Node,
        recursive: bool,
        now: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let Some((name, parent)) = abs.split_last() else {
            return Err(ApiError::AlreadyExists("/".to_string()));
        };
        let mut dir = &mut self.root;
        for (i, seg) in parent.iter().enumerate() {
            if recursive && !dir.children.contains_key(seg) {
                dir.children
                    .insert(seg.clone(), Node::Directory(DirectoryNode::new(now)));
            }
            dir = match dir.children.get_mut(seg) {
                Some(Node::Directory(d)) => d,
                Some(Node::File(_)) => {
                    return Err(ApiError::NotADirectory(path::render(&parent[..=i])))
                }
                None => return Err(ApiError::PathNotFound(path::render(&parent[..=i]))),
            };
        }
        if dir.children.contains_key(name) {
            return Err(ApiError::AlreadyExists(path::render(abs)));
        }
        dir.children.insert(name.clone(), node);
        self.touch_ancestors(parent, now);
        Ok(())
    }

    fn detach_abs(&mut self, abs: &[String], now: DateTime<Utc>) -> Result<Node, ApiError> {
        let Some((name, parent)) = abs.split_last() else {
            return Err(ApiError::InvalidOperation(
                "the root directory cannot be detached".to_string(),
            ));
        };
        let node = self
            .dir_mut(parent)?
            .children
            .remove(name)
            .ok_or_else(|| ApiError::PathNotFound(path::render(abs)))?;
        self.touch_ancestors(parent, now);
        Ok(node)
    }

    /// Mark the root and each directory along `abs` as modified.
    fn touch_ancestors(&mut self, abs: &[String], now: DateTime<Utc>) {
        let mut dir = &mut self.root;
        dir.metadata.modified = now;
        for seg in abs {
            dir = match dir.children.get_mut(seg) {
                Some(Node::Directory(d)) => d,
                _ => return,
            };
            dir.metadata.modified = now;
        }
    }
}

fn collect_files(dir: &DirectoryNode, prefix: &str, out: &mut BTreeMap<String, Digest>) {
    for (name, node) in &dir.children {
        let rel = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };
        match node {
            Node::File(f) => {
                out.insert(rel, f.digest);
            }
            Node::Directory(d) => collect_files(d, &rel, out),
        }
    }
}
