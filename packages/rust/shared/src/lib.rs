//! Shared types, error model, and configuration for HomeViz.
//!
//! This crate is the foundation depended on by all other HomeViz crates.
//! It provides:
//! - [`HomeVizError`], the unified error type
//! - Domain types ([`StepType`], [`StepConfig`], [`ProductCategory`], [`PromptOverride`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, GeminiConfig, IdenticalOutputPolicy, QualityConfig, RetryConfig,
    StorageConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_api_key,
};
pub use error::{HomeVizError, Result};
pub use types::{
    ProductCategory, ProductOption, ProductOptions, PromptOverride, Scope, StepConfig, StepType,
};
