//! MergeService: stacks the sources and deserializes to DedupConfig.

use crate::config::sources::{environment, global_file};
use crate::config::DedupConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat};
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Precedence: defaults (lowest) -> global file -> explicit file -> environment (highest).
    pub fn load(explicit: Option<&Path>) -> Result<DedupConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = match explicit {
            Some(path) => builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(true),
            ),
            None => builder,
        };
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }

    /// Load one file only, without global or environment layers.
    pub fn load_from_file(path: &Path) -> Result<DedupConfig, ConfigError> {
        let builder = builder_with_defaults()?
            .add_source(File::from(path).format(FileFormat::Toml).required(true));
        builder.build()?.try_deserialize()
    }
}

/// Seed the builder with the serialized defaults so every key has a value.
fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&DedupConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
