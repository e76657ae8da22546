//! RootLayout: resolved host paths for one store root.

use crate::config::LayoutConfig;
use crate::error::ApiError;
use crate::store::RefCountTable;
use std::path::{Path, PathBuf};

/// Host locations of the refcount file, entity directory and user space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootLayout {
    root: PathBuf,
    names: LayoutConfig,
}

impl RootLayout {
    pub fn new(root: impl Into<PathBuf>, names: LayoutConfig) -> Self {
        Self {
            root: root.into(),
            names,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn names(&self) -> &LayoutConfig {
        &self.names
    }

    pub fn refcount_file(&self) -> PathBuf {
        self.root.join(&self.names.refcount_file)
    }

    pub fn entities_dir(&self) -> PathBuf {
        self.root.join(&self.names.entities_dir)
    }

    pub fn userspace_dir(&self) -> PathBuf {
        self.root.join(&self.names.userspace_dir)
    }

    pub fn user_dir(&self, user: &str) -> PathBuf {
        self.userspace_dir().join(user)
    }

    pub fn tree_file(&self, user: &str) -> PathBuf {
        self.user_dir(user).join(&self.names.tree_file)
    }

    /// True when the refcount file, entity directory and user space all exist.
    pub fn is_initialized(&self) -> bool {
        self.refcount_file().is_file()
            && self.entities_dir().is_dir()
            && self.userspace_dir().is_dir()
    }

    /// Create whatever part of the skeleton is missing. An existing refcount
    /// file is left untouched.
    pub fn create_skeleton(&self, pretty: bool) -> Result<(), ApiError> {
        std::fs::create_dir_all(self.entities_dir())?;
        std::fs::create_dir_all(self.userspace_dir())?;
        let refcounts = self.refcount_file();
        if !refcounts.exists() {
            RefCountTable::new().save(&refcounts, pretty)?;
        }
        Ok(())
    }

    /// Usernames with a directory in the user space, sorted.
    pub fn users(&self) -> Result<Vec<String>, ApiError> {
        let mut users = Vec::new();
        for entry in std::fs::read_dir(self.userspace_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                users.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        users.sort();
        Ok(users)
    }
}

/// A user id must name exactly one directory under the user space.
pub fn validate_user_id(user: &str) -> Result<(), ApiError> {
    let bad = user.is_empty()
        || user == "."
        || user == ".."
        || user.contains('/')
        || user.contains('\\')
        || user.contains('\0');
    if bad {
        return Err(ApiError::InvalidUserId(user.to_string()));
    }
    Ok(())
}
