//! Type-safe builder for `HarvestConfig` using the typestate pattern
//!
//! The storage directory is the only required field; `build()` is not
//! callable until it has been set.

use anyhow::{Result, bail};
use std::marker::PhantomData;
use std::path::PathBuf;

use super::types::HarvestConfig;

// Type states for the builder
pub struct WithStorageDir;

pub struct HarvestConfigBuilder<State = ()> {
    pub(crate) config: HarvestConfig,
    pub(crate) storage_dir: Option<PathBuf>,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for HarvestConfigBuilder<()> {
    fn default() -> Self {
        Self {
            config: HarvestConfig::default(),
            storage_dir: None,
            _phantom: PhantomData,
        }
    }
}

impl HarvestConfig {
    /// Create a builder for configuring a `HarvestConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> HarvestConfigBuilder<()> {
        HarvestConfigBuilder::default()
    }
}

impl HarvestConfigBuilder<()> {
    pub fn storage_dir(self, dir: impl Into<PathBuf>) -> HarvestConfigBuilder<WithStorageDir> {
        HarvestConfigBuilder {
            config: self.config,
            storage_dir: Some(dir.into()),
            _phantom: PhantomData,
        }
    }
}

impl HarvestConfigBuilder<WithStorageDir> {
    /// Validate and produce the final configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a capacity is zero or the storage directory cannot
    /// be made absolute.
    pub fn build(self) -> Result<HarvestConfig> {
        let Some(storage_dir) = self.storage_dir else {
            bail!("storage_dir is required");
        };
        let mut config = self.config;
        config.storage_dir = std::path::absolute(&storage_dir)?;
        config.validate()?;
        Ok(config)
    }
}
