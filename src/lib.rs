//! dedupfs: per-user virtual filesystems over a shared store
//!
//! File contents live once in a content-addressed entity store under the
//! root. Each user has a directory tree whose file leaves point at entities
//! by digest, and a root-wide reference count table decides when an entity
//! can be deleted. A `VirtualFileSystem` session loads one user's tree and
//! the table, mutates them in memory and persists both at `commit`.

pub mod audit;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod store;
pub mod tooling;
pub mod tree;
pub mod types;

pub use error::{ApiError, StorageError};
pub use session::{OpenOptions, VirtualFileSystem};
pub use types::Digest;
