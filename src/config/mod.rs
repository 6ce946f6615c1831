//! Configuration module for Skein
//!
//! This module handles loading, parsing, overriding and validating TOML
//! configuration files.
//!
//! # Example
//!
//! ```no_run
//! use skein::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("skein.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod env;
mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, ScopeConfig, StoreConfig, UserAgentConfig};

// Re-export parser functions
pub use env::{apply_env_overrides, apply_overrides};
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
