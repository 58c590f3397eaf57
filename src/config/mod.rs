//! Configuration module for the harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use zbze_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! for source in &config.sources {
//!     println!("{} ({})", source.name(), source.kind());
//! }
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArchiveSource, ChannelId, Config, CrawlSource, FeedFieldConfig, FeedSource, HarvesterConfig,
    HtmlFieldConfig, RuleConfig, SourceConfig, TextMode, UserAgentConfig, YearRange,
};

// Re-export parser functions
pub use parser::{load_config, load_config_with_hash, parse_config};
