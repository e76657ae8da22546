//! Directory tree node types

use crate::types::{Digest, NodeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Timestamps and free-form attributes carried by every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl NodeMetadata {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            created: now,
            modified: now,
            attributes: BTreeMap::new(),
        }
    }
}

/// File leaf: a non-owning reference into the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub digest: Digest,
    pub size: u64,
    pub metadata: NodeMetadata,
}

/// Directory: children keyed by name, ordered for stable documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    pub metadata: NodeMetadata,
    #[serde(default)]
    pub children: BTreeMap<String, Node>,
}

impl DirectoryNode {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            metadata: NodeMetadata::at(now),
            children: BTreeMap::new(),
        }
    }
}

/// Tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Directory(DirectoryNode),
    File(FileNode),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Directory(_) => NodeKind::Directory,
            Node::File(_) => NodeKind::File,
        }
    }

    pub fn metadata(&self) -> &NodeMetadata {
        match self {
            Node::Directory(d) => &d.metadata,
            Node::File(f) => &f.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut NodeMetadata {
        match self {
            Node::Directory(d) => &mut d.metadata,
            Node::File(f) => &mut f.metadata,
        }
    }

    /// Digest of every file leaf at or below this node, one entry per leaf.
    pub fn collect_digests(&self, out: &mut Vec<Digest>) {
        match self {
            Node::File(f) => out.push(f.digest),
            Node::Directory(d) => {
                for child in d.children.values() {
                    child.collect_digests(out);
                }
            }
        }
    }

    /// Set `modified` on this node and everything below it.
    pub fn touch_recursive(&mut self, now: DateTime<Utc>) {
        self.metadata_mut().modified = now;
        if let Node::Directory(d) = self {
            for child in d.children.values_mut() {
                child.touch_recursive(now);
            }
        }
    }
}

/// Borrowed view of a resolved node; the root directory has no `Node` wrapper.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Directory(&'a DirectoryNode),
    File(&'a FileNode),
}

impl<'a> NodeRef<'a> {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRef::Directory(_) => NodeKind::Directory,
            NodeRef::File(_) => NodeKind::File,
        }
    }

    pub fn metadata(&self) -> &'a NodeMetadata {
        match *self {
            NodeRef::Directory(d) => &d.metadata,
            NodeRef::File(f) => &f.metadata,
        }
    }
}

impl<'a> From<&'a Node> for NodeRef<'a> {
    fn from(node: &'a Node) -> Self {
        match node {
            Node::Directory(d) => NodeRef::Directory(d),
            Node::File(f) => NodeRef::File(f),
        }
    }
}
