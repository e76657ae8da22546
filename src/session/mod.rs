//! Session Controller
//!
//! `VirtualFileSystem` binds one (root, user) pair to a live session. It owns
//! the loaded refcount table and the user's tree, and drives the entity store
//! as a side effect of individual operations. Tree and table only become
//! durable at `commit`, which also closes the session.
//!
//! Only one session may be open against a root at a time. Nothing enforces
//! this; two sessions committing to the same root leave undefined state.

pub mod diff;
pub mod transfer;

pub use diff::DiffLine;
pub use transfer::{ExportSummary, ExtensionFilter, ImportMode, ImportSummary};

use crate::config::layout::validate_user_id;
use crate::config::{DocumentConfig, LayoutConfig, RootLayout};
use crate::error::{ApiError, StorageError};
use crate::store::{EntityStore, ReclaimDecision, RefCountTable, StoredEntity};
use crate::tree::{DirEntry, DirTree, NodeInfo, VirtualPath};
use crate::types::Digest;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// How to open a session.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Create the root skeleton when it is missing.
    pub init: bool,
    pub layout: LayoutConfig,
    pub documents: DocumentConfig,
}

impl OpenOptions {
    /// Default layout, creating the skeleton when needed.
    pub fn init() -> Self {
        Self {
            init: true,
            ..Self::default()
        }
    }
}

/// What a removal did to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// File leaves detached from the tree.
    pub files: usize,
    /// Entities deleted because their last reference went away.
    pub reclaimed: usize,
    /// Unreferenced entities whose blob could not be deleted. They stay on
    /// disk as orphans until a sweep.
    pub orphaned: usize,
}

/// A live session over one user's tree.
#[derive(Debug)]
pub struct VirtualFileSystem {
    layout: RootLayout,
    user: String,
    documents: DocumentConfig,
    refcounts: RefCountTable,
    tree: DirTree,
    entities: EntityStore,
    open: bool,
}

impl VirtualFileSystem {
    /// Open a session for `user` on `root`.
    ///
    /// Fails with `RootInvalid` when the root lacks the refcount file, the
    /// entity directory or the user space, unless `options.init` is set.
    pub fn open(
        root: impl AsRef<Path>,
        user: &str,
        options: &OpenOptions,
    ) -> Result<Self, ApiError> {
        validate_user_id(user)?;
        let root = root.as_ref();
        let layout = RootLayout::new(root, options.layout.clone());
        if !layout.is_initialized() {
            if !options.init {
                return Err(ApiError::RootInvalid(root.to_path_buf()));
            }
            layout.create_skeleton(options.documents.pretty)?;
            info!(root = %root.display(), "Initialized store root");
        }

        let refcounts = RefCountTable::load(&layout.refcount_file())?;
        let tree = DirTree::load(&layout.tree_file(user))?;
        let entities = EntityStore::new(layout.entities_dir());
        info!(
            root = %root.display(),
            user,
            digests = refcounts.len(),
            "Session opened"
        );

        Ok(Self {
            layout,
            user: user.to_string(),
            documents: options.documents.clone(),
            refcounts,
            tree,
            entities,
            open: true,
        })
    }

    /// Open a session, run `f`, then commit exactly once.
    ///
    /// A fatal error from `f` abandons the session instead. Non-fatal errors
    /// leave the in-memory state consistent, so earlier work is still
    /// committed before the error is returned. If `f` closes the session
    /// itself nothing further happens.
    pub fn scoped<T, F>(
        root: impl AsRef<Path>,
        user: &str,
        options: &OpenOptions,
        f: F,
    ) -> Result<T, ApiError>
    where
        F: FnOnce(&mut VirtualFileSystem) -> Result<T, ApiError>,
    {
        let mut vfs = Self::open(root, user, options)?;
        let result = f(&mut vfs);
        if !vfs.is_open() {
            return result;
        }
        match result {
            Ok(value) => {
                vfs.commit()?;
                Ok(value)
            }
            Err(err) if err.is_fatal() => {
                warn!(error = %err, "Fatal error, abandoning session");
                vfs.abandon()?;
                Err(err)
            }
            Err(err) => {
                if let Err(commit_err) = vfs.commit() {
                    warn!(error = %commit_err, "Commit after failed operation also failed");
                    vfs.abandon()?;
                }
                Err(err)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn layout(&self) -> &RootLayout {
        &self.layout
    }

    /// The in-memory refcount table.
    pub fn refcounts(&self) -> Result<&RefCountTable, ApiError> {
        self.ensure_open()?;
        Ok(&self.refcounts)
    }

    /// The in-memory tree.
    pub fn tree(&self) -> Result<&DirTree, ApiError> {
        self.ensure_open()?;
        Ok(&self.tree)
    }

    pub fn current_dir(&self) -> Result<String, ApiError> {
        self.ensure_open()?;
        Ok(self.tree.current_dir())
    }

    pub fn change_dir(&mut self, path: &str) -> Result<(), ApiError> {
        self.ensure_open()?;
        self.tree.change_dir(&VirtualPath::parse(path)?)
    }

    pub fn exists(&self, path: &str) -> Result<bool, ApiError> {
        self.ensure_open()?;
        Ok(self.tree.exists(&VirtualPath::parse(path)?))
    }

    pub fn list(&self, path: &str) -> Result<Vec<DirEntry>, ApiError> {
        self.ensure_open()?;
        self.tree.list(&VirtualPath::parse(path)?)
    }

    pub fn stat(&self, path: &str) -> Result<NodeInfo, ApiError> {
        self.ensure_open()?;
        self.tree.stat(&VirtualPath::parse(path)?)
    }

    pub fn set_attributes(
        &mut self,
        path: &str,
        attributes: BTreeMap<String, String>,
    ) -> Result<(), ApiError> {
        self.ensure_open()?;
        self.tree.set_attributes(&VirtualPath::parse(path)?, attributes)
    }

    /// Whole content of the file at `path`.
    pub fn read(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let digest = self.file_digest(path)?;
        Ok(self.entities.read(&digest)?)
    }

    /// `len` bytes from `offset`; `None` reads to the end.
    pub fn read_range(&self, path: &str, offset: u64, len: Option<u64>) -> Result<Vec<u8>, ApiError> {
        let digest = self.file_digest(path)?;
        Ok(self.entities.read_range(&digest, offset, len)?)
    }

    /// Stream the file at `path` into `writer`, returning the byte count.
    pub fn read_to_writer<W: Write>(&self, path: &str, writer: &mut W) -> Result<u64, ApiError> {
        let digest = self.file_digest(path)?;
        Ok(self.entities.copy_to(&digest, writer)?)
    }

    /// Store the bytes of `reader` as a new file at `path`.
    ///
    /// With `parents`, missing directories on the way are created. Nothing is
    /// inserted or counted unless the content was stored successfully.
    pub fn import_reader<R: Read>(
        &mut self,
        path: &str,
        reader: R,
        parents: bool,
    ) -> Result<Digest, ApiError> {
        self.ensure_open()?;
        let path = VirtualPath::parse(path)?;
        Ok(self.import_at(&path, reader, parents)?.digest)
    }

    pub fn import_bytes(&mut self, path: &str, bytes: &[u8], parents: bool) -> Result<Digest, ApiError> {
        self.import_reader(path, bytes, parents)
    }

    /// Reference an entity that is already stored.
    pub fn add_file_by_digest(
        &mut self,
        path: &str,
        digest: &Digest,
        parents: bool,
    ) -> Result<(), ApiError> {
        self.ensure_open()?;
        let path = VirtualPath::parse(path)?;
        self.tree.check_insert(&path, parents)?;
        let size = self.entities.size(digest)?;
        self.tree.add_file(&path, *digest, size, parents)?;
        let count = self.refcounts.increment(digest);
        debug!(path = %path, digest = %digest, count, "Linked existing entity");
        Ok(())
    }

    /// Whether an entity with `digest` is stored under this root.
    pub fn has_entity(&self, digest: &Digest) -> Result<bool, ApiError> {
        self.ensure_open()?;
        Ok(self.entities.has(digest))
    }

    pub fn make_dir(&mut self, path: &str, parents: bool) -> Result<(), ApiError> {
        self.ensure_open()?;
        let path = VirtualPath::parse(path)?;
        self.tree.add_dir(&path, parents)?;
        debug!(path = %path, "Created directory");
        Ok(())
    }

    /// Deep-copy a file or directory, adding one reference per copied leaf.
    pub fn copy(&mut self, src: &str, dst: &str) -> Result<usize, ApiError> {
        self.ensure_open()?;
        let src = VirtualPath::parse(src)?;
        let dst = VirtualPath::parse(dst)?;
        let digests = self.tree.copy_node(&src, &dst)?;
        for digest in &digests {
            self.refcounts.increment(digest);
        }
        debug!(src = %src, dst = %dst, files = digests.len(), "Copied node");
        Ok(digests.len())
    }

    /// Relocate a node. Refcounts are untouched.
    pub fn move_node(&mut self, src: &str, dst: &str) -> Result<(), ApiError> {
        self.ensure_open()?;
        let src = VirtualPath::parse(src)?;
        let dst = VirtualPath::parse(dst)?;
        self.tree.move_node(&src, &dst)?;
        debug!(src = %src, dst = %dst, "Moved node");
        Ok(())
    }

    /// Remove a file or directory.
    ///
    /// The tree is updated first; each freed digest is then decremented and
    /// entities whose count reaches zero are deleted.
    pub fn remove(&mut self, path: &str, recursive: bool) -> Result<RemoveOutcome, ApiError> {
        self.ensure_open()?;
        let path = VirtualPath::parse(path)?;
        let digests = self.tree.remove(&path, recursive)?;
        let mut outcome = RemoveOutcome {
            files: digests.len(),
            ..RemoveOutcome::default()
        };
        let mut unreferenced = Vec::new();
        for digest in &digests {
            match self.refcounts.decrement(digest)? {
                ReclaimDecision::Reclaim => unreferenced.push(*digest),
                ReclaimDecision::Retain { remaining } => {
                    debug!(digest = %digest, remaining, "Entity still referenced");
                }
            }
        }
        // Counts are settled before any blob is touched. A failed delete
        // leaves an orphan, which audit tolerates and sweep collects.
        for digest in &unreferenced {
            match self.entities.delete(digest) {
                Ok(()) => outcome.reclaimed += 1,
                Err(e) => {
                    warn!(digest = %digest, error = %e, "Failed to delete entity, left as orphan");
                    outcome.orphaned += 1;
                }
            }
        }
        debug!(path = %path, files = outcome.files, reclaimed = outcome.reclaimed, "Removed node");
        Ok(outcome)
    }

    /// Compare every file below two directories by relative path and digest.
    pub fn diff(&self, base: &str, patch: &str) -> Result<Vec<DiffLine>, ApiError> {
        self.ensure_open()?;
        let base = self.tree.files_under(&VirtualPath::parse(base)?)?;
        let patch = self.tree.files_under(&VirtualPath::parse(patch)?)?;
        Ok(diff::diff_file_maps(&base, &patch))
    }

    /// Persist the refcount table, then the user's tree, and close the session.
    ///
    /// Each document is replaced atomically. On failure the session stays
    /// open so the caller can retry or abandon.
    pub fn commit(&mut self) -> Result<(), ApiError> {
        self.ensure_open()?;
        let pretty = self.documents.pretty;
        std::fs::create_dir_all(self.layout.user_dir(&self.user)).map_err(StorageError::from)?;
        self.refcounts.save(&self.layout.refcount_file(), pretty)?;
        self.tree.save(&self.layout.tree_file(&self.user), pretty)?;
        self.open = false;
        info!(
            user = %self.user,
            digests = self.refcounts.len(),
            "Session committed"
        );
        Ok(())
    }

    /// Close the session without writing the tree or the table.
    ///
    /// Entities written during the session stay on disk as orphans.
    pub fn abandon(&mut self) -> Result<(), ApiError> {
        self.ensure_open()?;
        self.open = false;
        info!(user = %self.user, "Session abandoned");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), ApiError> {
        if self.open {
            Ok(())
        } else {
            Err(ApiError::SessionClosed)
        }
    }

    fn file_digest(&self, path: &str) -> Result<Digest, ApiError> {
        self.ensure_open()?;
        self.tree.file_digest(&VirtualPath::parse(path)?)
    }

    /// Store `reader` and insert a leaf at `path`, validating the insert first.
    fn import_at<R: Read>(
        &mut self,
        path: &VirtualPath,
        reader: R,
        parents: bool,
    ) -> Result<StoredEntity, ApiError> {
        self.tree.check_insert(path, parents)?;
        let stored = self.entities.write_from_reader(reader)?;
        if let Err(err) = self.tree.add_file(path, stored.digest, stored.size, parents) {
            if stored.created && !self.refcounts.contains(&stored.digest) {
                self.entities.delete(&stored.digest)?;
            }
            return Err(err);
        }
        let count = self.refcounts.increment(&stored.digest);
        debug!(
            path = %path,
            digest = %stored.digest,
            size = stored.size,
            count,
            "Imported file"
        );
        Ok(stored)
    }
}

impl Drop for VirtualFileSystem {
    fn drop(&mut self) {
        if self.open {
            warn!(
                user = %self.user,
                "Session dropped without commit; in-memory changes discarded"
            );
        }
    }
}
