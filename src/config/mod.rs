//! Configuration management module
//!
//! Loads the daemon's TOML configuration file, the way Docker reads
//! `daemon.json`, resolving relative paths against the config file's own
//! directory.

mod config;

pub use config::*;
