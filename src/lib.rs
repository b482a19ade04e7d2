//! PagePilot command-line application
//!
//! Exposes the configuration model and command layer for integration testing.

pub mod cli;
pub mod config;

pub use config::{AppConfig, ConfigError, LoadedConfig, LogFormat, LoggingConfig};
