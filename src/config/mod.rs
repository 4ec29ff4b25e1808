//! Configuration module for harvest job coordination
//!
//! This module provides the `HarvestConfig` struct and its type-safe builder
//! for configuring storage locations, buffer capacities and timeouts.

// Sub-modules
pub mod builder;
pub mod getters;
pub mod methods;
pub mod types;

// Re-exports for public API
pub use builder::{HarvestConfigBuilder, WithStorageDir};
pub use types::HarvestConfig;
