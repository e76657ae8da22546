//! Configuration
//!
//! Layered configuration for the binary and for callers that want the same
//! defaults. Sources, lowest to highest precedence: built-in defaults, the
//! global file under the XDG config home, an explicit file, then
//! `DEDUPFS__SECTION__KEY` environment variables.

pub mod facade;
pub mod layout;

mod merge {
    pub mod service;
}

mod paths {
    pub mod xdg_root;
}

mod sources {
    pub mod environment;
    pub mod global_file;
}

pub use facade::ConfigLoader;
pub use layout::RootLayout;
pub use paths::xdg_root as xdg;

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_refcount_file() -> String {
    "refcounts.json".to_string()
}

fn default_entities_dir() -> String {
    "EntityFiles".to_string()
}

fn default_userspace_dir() -> String {
    "Users".to_string()
}

fn default_tree_file() -> String {
    "dirTree.json".to_string()
}

/// Names of the on-disk pieces below a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_refcount_file")]
    pub refcount_file: String,

    #[serde(default = "default_entities_dir")]
    pub entities_dir: String,

    #[serde(default = "default_userspace_dir")]
    pub userspace_dir: String,

    /// Tree document name inside each user's directory
    #[serde(default = "default_tree_file")]
    pub tree_file: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            refcount_file: default_refcount_file(),
            entities_dir: default_entities_dir(),
            userspace_dir: default_userspace_dir(),
            tree_file: default_tree_file(),
        }
    }
}

/// Persisted document options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Indent JSON documents (compact when false)
    #[serde(default)]
    pub pretty: bool,
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Store root; the CLI falls back to the platform data directory
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Default user id
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub documents: DocumentConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}
