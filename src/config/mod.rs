//! Tool configuration.
//!
//! Configuration is read from `catalog.toml`, `catalog.yml`, `catalog.yaml` or `catalog.json`
//! (or an explicit path) and falls back to the embedded `default_config.yml`.

#[expect(clippy::module_inception, reason = "I like it this way")]
mod config;

pub use config::{Config, DEFAULT_CONFIG_YAML};
