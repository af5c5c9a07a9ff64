//! Configuration file parsing for Flutter Butler
//!
//! Supports `<config dir>/config.toml`; see [`settings::config_dir`] for how the
//! directory is resolved.

pub mod settings;
pub mod types;

pub use settings::{config_dir, init_config_dir, load_settings, CONFIG_DIR_ENV};
pub use types::*;
