//! Shared types, error model, and configuration for harvest.
//!
//! This crate is the foundation depended on by all other harvest crates.
//! It provides:
//! - [`HarvestError`]: the unified error type
//! - Domain types ([`Recipe`], [`Ingredient`], [`RecipeIngredient`], [`Listing`], [`YearMonth`])
//! - Configuration ([`AppConfig`], [`SiteConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlConfig, CrawlSection, DatabaseConfig, FetchConfig, SiteConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use error::{HarvestError, Result};
pub use types::{Ingredient, Listing, Recipe, RecipeIngredient, YearMonth};
