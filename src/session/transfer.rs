//! Host import and export.
//!
//! Host paths are canonicalized with `dunce` and checked against the store
//! root: nothing inside the root may be imported or exported onto, and no
//! host directory containing the root may be imported. Export never
//! overwrites a host file.

use super::VirtualFileSystem;
use crate::error::ApiError;
use crate::store::persistence::TEMP_PREFIX;
use crate::tree::{DirectoryNode, Node, NodeRef, VirtualPath};
use crate::types::Digest;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// What happens to the host source after a successful import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Leave the source in place.
    #[default]
    Copy,
    /// Delete imported files and the directories they leave empty.
    Move,
}

/// Case-insensitive file extension filter. Directories are never filtered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: Option<BTreeSet<String>>,
}

impl ExtensionFilter {
    /// Accept every file.
    pub fn all() -> Self {
        Self::default()
    }

    /// Accept only files with one of `extensions` (leading dots optional).
    pub fn only<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            extensions: Some(set),
        }
    }

    /// Parse a comma separated list such as `"txt,.md"`.
    pub fn parse(list: &str) -> Self {
        Self::only(list.split(','))
    }

    pub fn matches_name(&self, name: &str) -> bool {
        let Some(set) = &self.extensions else {
            return true;
        };
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => set.contains(&ext.to_ascii_lowercase()),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub files: usize,
    pub dirs: usize,
    /// Filtered files and non-regular entries.
    pub skipped: usize,
    pub bytes: u64,
    /// Files whose content was not stored before.
    pub new_entities: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub files: usize,
    pub dirs: usize,
    pub skipped: usize,
    pub bytes: u64,
}

impl VirtualFileSystem {
    /// Import a host file or directory as `inner`.
    ///
    /// `inner` must not exist and its parent must. A directory import is
    /// applied entry by entry; an I/O failure part way leaves the entries
    /// imported so far in the tree, each fully counted.
    pub fn import_host(
        &mut self,
        host: &Path,
        inner: &str,
        mode: ImportMode,
        filter: &ExtensionFilter,
    ) -> Result<ImportSummary, ApiError> {
        self.ensure_open()?;
        let host = canonical(host)?;
        let root = canonical(self.layout.root())?;
        if host.starts_with(&root) || root.starts_with(&host) {
            return Err(ApiError::HostPath(format!(
                "{} overlaps the store root {}",
                host.display(),
                root.display()
            )));
        }
        let target = VirtualPath::parse(inner)?;
        self.tree.check_insert(&target, false)?;

        let mut summary = ImportSummary::default();
        let mut imported = Vec::new();
        if host.is_file() {
            if filter.matches_name(&file_name(&host)?) {
                self.import_host_file(&host, &target, &mut summary)?;
                imported.push(host.clone());
            } else {
                summary.skipped += 1;
            }
        } else if host.is_dir() {
            self.tree.add_dir(&target, false)?;
            summary.dirs += 1;
            for entry in WalkDir::new(&host)
                .min_depth(1)
                .follow_links(false)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| ApiError::HostPath(e.to_string()))?;
                let rel = entry
                    .path()
                    .strip_prefix(&host)
                    .map_err(|e| ApiError::HostPath(e.to_string()))?;
                let Some(dest) = virtual_child(&target, rel) else {
                    warn!(path = %entry.path().display(), "Skipping entry with a non UTF-8 name");
                    summary.skipped += 1;
                    continue;
                };
                let file_type = entry.file_type();
                if file_type.is_dir() {
                    self.tree.add_dir(&dest, false)?;
                    summary.dirs += 1;
                } else if file_type.is_file() && filter.matches_name(&entry.file_name().to_string_lossy()) {
                    self.import_host_file(entry.path(), &dest, &mut summary)?;
                    imported.push(entry.path().to_path_buf());
                } else {
                    debug!(path = %entry.path().display(), "Skipped host entry");
                    summary.skipped += 1;
                }
            }
        } else {
            return Err(ApiError::HostPath(format!(
                "{} is neither a regular file nor a directory",
                host.display()
            )));
        }

        if mode == ImportMode::Move {
            for path in &imported {
                std::fs::remove_file(path)?;
            }
            if host.is_dir() {
                prune_empty_dirs(&host);
            }
        }
        info!(
            host = %host.display(),
            inner = %target,
            files = summary.files,
            skipped = summary.skipped,
            "Imported from host"
        );
        Ok(summary)
    }

    /// Export a file or directory to a new host path.
    pub fn export_host(
        &self,
        inner: &str,
        host: &Path,
        filter: &ExtensionFilter,
    ) -> Result<ExportSummary, ApiError> {
        self.ensure_open()?;
        if host.exists() {
            return Err(ApiError::HostPath(format!("{} already exists", host.display())));
        }
        let parent = match host.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if !parent.is_dir() {
            return Err(ApiError::HostPath(format!(
                "{} is not an existing directory",
                parent.display()
            )));
        }
        let dest = canonical(parent)?.join(file_name(host)?);
        let root = canonical(self.layout.root())?;
        if dest.starts_with(&root) {
            return Err(ApiError::HostPath(format!(
                "{} lies inside the store root",
                dest.display()
            )));
        }

        let mut summary = ExportSummary::default();
        match self.tree.resolve(&VirtualPath::parse(inner)?)? {
            NodeRef::File(f) => {
                if filter.matches_name(&file_name(&dest)?) {
                    summary.bytes += self.export_file(&f.digest, &dest)?;
                    summary.files += 1;
                } else {
                    summary.skipped += 1;
                }
            }
            NodeRef::Directory(dir) => {
                std::fs::create_dir(&dest)?;
                summary.dirs += 1;
                self.export_dir(dir, &dest, filter, &mut summary)?;
            }
        }
        info!(inner, host = %dest.display(), files = summary.files, "Exported to host");
        Ok(summary)
    }

    fn import_host_file(
        &mut self,
        host: &Path,
        dest: &VirtualPath,
        summary: &mut ImportSummary,
    ) -> Result<(), ApiError> {
        let file = File::open(host)?;
        let stored = self.import_at(dest, file, false)?;
        summary.files += 1;
        summary.bytes += stored.size;
        if stored.created {
            summary.new_entities += 1;
        }
        Ok(())
    }

    fn export_dir(
        &self,
        dir: &DirectoryNode,
        dest: &Path,
        filter: &ExtensionFilter,
        summary: &mut ExportSummary,
    ) -> Result<(), ApiError> {
        for (name, child) in &dir.children {
            let path = dest.join(name);
            match child {
                Node::Directory(sub) => {
                    std::fs::create_dir(&path)?;
                    summary.dirs += 1;
                    self.export_dir(sub, &path, filter, summary)?;
                }
                Node::File(f) if filter.matches_name(name) => {
                    summary.bytes += self.export_file(&f.digest, &path)?;
                    summary.files += 1;
                }
                Node::File(_) => summary.skipped += 1,
            }
        }
        Ok(())
    }

    /// Write one entity to a new host file without clobbering.
    fn export_file(&self, digest: &Digest, dest: &Path) -> Result<u64, ApiError> {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)?;
        let bytes = self.entities.copy_to(digest, &mut temp)?;
        temp.persist_noclobber(dest).map_err(|e| {
            ApiError::HostPath(format!("{}: {}", dest.display(), e.error))
        })?;
        Ok(bytes)
    }
}

fn canonical(path: &Path) -> Result<PathBuf, ApiError> {
    dunce::canonicalize(path)
        .map_err(|e| ApiError::HostPath(format!("{}: {}", path.display(), e)))
}

fn file_name(path: &Path) -> Result<String, ApiError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ApiError::HostPath(format!("{} has no usable file name", path.display())))
}

/// Virtual path for a host path relative to the import source.
fn virtual_child(base: &VirtualPath, rel: &Path) -> Option<VirtualPath> {
    let mut path = base.clone();
    for component in rel.components() {
        path = path.join(component.as_os_str().to_str()?).ok()?;
    }
    Some(path)
}

/// Remove directories under and including `dir` that are now empty.
fn prune_empty_dirs(dir: &Path) {
    for entry in WalkDir::new(dir).contents_first(true).into_iter().flatten() {
        if entry.file_type().is_dir() {
            // Fails harmlessly on directories that still hold skipped files.
            let _ = std::fs::remove_dir(entry.path());
        }
    }
}
