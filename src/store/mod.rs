//! Entity Store
//!
//! Immutable content blobs stored as `<entities-dir>/<hex digest>`. Blobs are
//! written through a temporary file and renamed into place, so a digest-named
//! file is always complete. Lifetime is decided by the refcount table, never
//! by this store.

pub mod hasher;
pub mod persistence;
pub mod refcount;

pub use refcount::{RefCountTable, ReclaimDecision};

use crate::error::StorageError;
use crate::types::Digest;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of streaming content into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredEntity {
    pub digest: Digest,
    pub size: u64,
    /// False when an entity with this digest was already present.
    pub created: bool,
}

/// A file in the entities directory, classified by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityFile {
    Entity(Digest),
    /// Leftover temporary file from an interrupted write.
    Temporary(PathBuf),
    /// Anything whose name is not a digest.
    Foreign(PathBuf),
}

/// Filesystem-backed content-addressed blob store.
#[derive(Debug, Clone)]
pub struct EntityStore {
    dir: PathBuf,
}

impl EntityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, digest: &Digest) -> PathBuf {
        self.dir.join(digest.to_hex())
    }

    pub fn has(&self, digest: &Digest) -> bool {
        self.path_for(digest).is_file()
    }

    /// Open the blob for reading.
    pub fn open(&self, digest: &Digest) -> Result<File, StorageError> {
        File::open(self.path_for(digest)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::EntityNotFound(*digest),
            _ => StorageError::IoError(e),
        })
    }

    /// Read the whole blob.
    pub fn read(&self, digest: &Digest) -> Result<Vec<u8>, StorageError> {
        let mut buf = Vec::new();
        self.open(digest)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Read `len` bytes starting at `offset`; `None` reads to the end.
    /// Ranges past the end yield fewer (possibly zero) bytes.
    pub fn read_range(
        &self,
        digest: &Digest,
        offset: u64,
        len: Option<u64>,
    ) -> Result<Vec<u8>, StorageError> {
        let mut file = self.open(digest)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::new();
        match len {
            Some(n) => {
                file.take(n).read_to_end(&mut buf)?;
            }
            None => {
                file.read_to_end(&mut buf)?;
            }
        }
        Ok(buf)
    }

    /// Copy the blob into `writer`, returning the byte count.
    pub fn copy_to<W: Write>(&self, digest: &Digest, writer: &mut W) -> Result<u64, StorageError> {
        let mut file = self.open(digest)?;
        Ok(std::io::copy(&mut file, writer)?)
    }

    /// Size of a stored blob.
    pub fn size(&self, digest: &Digest) -> Result<u64, StorageError> {
        match std::fs::metadata(self.path_for(digest)) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::EntityNotFound(*digest))
            }
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    /// Store `bytes` under `digest` unless an entity with that digest exists.
    ///
    /// Returns whether a new blob was written. The caller vouches that
    /// `digest` is the digest of `bytes`.
    pub fn write(&self, digest: &Digest, bytes: &[u8]) -> Result<bool, StorageError> {
        if self.has(digest) {
            debug!(digest = %digest, "Entity already present, write skipped");
            return Ok(false);
        }
        let mut temp = self.temp_file()?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        persistence::persist(temp, &self.path_for(digest))?;
        debug!(digest = %digest, size = bytes.len(), "Stored entity");
        Ok(true)
    }

    /// Stream `reader` into the store, hashing on the way.
    ///
    /// The content lands in a temporary file first; if its digest is already
    /// stored the temporary file is discarded.
    pub fn write_from_reader<R: Read>(&self, reader: R) -> Result<StoredEntity, StorageError> {
        let mut temp = self.temp_file()?;
        let (digest, size) = hasher::digest_reader_into(reader, &mut temp)?;

        if self.has(&digest) {
            debug!(digest = %digest, "Entity already present, staged copy discarded");
            return Ok(StoredEntity {
                digest,
                size,
                created: false,
            });
        }
        temp.as_file().sync_all()?;
        persistence::persist(temp, &self.path_for(&digest))?;
        debug!(digest = %digest, size, "Stored entity");
        Ok(StoredEntity {
            digest,
            size,
            created: true,
        })
    }

    /// Remove a blob. Removing an absent blob is tolerated.
    pub fn delete(&self, digest: &Digest) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(digest)) {
            Ok(()) => {
                debug!(digest = %digest, "Deleted entity");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(digest = %digest, "Entity already absent on delete");
                Ok(())
            }
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    /// Every file in the entities directory, classified by name.
    pub fn scan(&self) -> Result<Vec<EntityFile>, StorageError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(persistence::TEMP_PREFIX) {
                files.push(EntityFile::Temporary(path));
            } else if let Ok(digest) = Digest::from_hex(&name) {
                if name.chars().all(|c| !c.is_ascii_uppercase()) {
                    files.push(EntityFile::Entity(digest));
                } else {
                    files.push(EntityFile::Foreign(path));
                }
            } else {
                files.push(EntityFile::Foreign(path));
            }
        }
        Ok(files)
    }

    fn temp_file(&self) -> Result<tempfile::NamedTempFile, StorageError> {
        Ok(tempfile::Builder::new()
            .prefix(persistence::TEMP_PREFIX)
            .tempfile_in(&self.dir)?)
    }
}
