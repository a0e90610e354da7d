//! Configuration for the tracker
//!
//! Provides types and parsing for `pxtrack.toml`.

pub mod loader;
pub mod schema;

pub use loader::{find_config, load_config, merge_cli_overrides, CliOverrides, ConfigError, CONFIG_FILE};
pub use schema::*;
