//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::DedupConfig;
use crate::error::ApiError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the standard sources plus an optional explicit file.
    pub fn load(explicit: Option<&Path>) -> Result<DedupConfig, ApiError> {
        Ok(MergeService::load(explicit)?)
    }

    /// Load configuration from a specific file only.
    pub fn load_from_file(path: &Path) -> Result<DedupConfig, ApiError> {
        Ok(MergeService::load_from_file(path)?)
    }

    /// Create default configuration.
    pub fn default() -> DedupConfig {
        DedupConfig::default()
    }
}
