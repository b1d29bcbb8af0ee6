//! CLI-specific functionality for the fintrack-llm binary
//!
//! This module contains argument parsing and configuration discovery.

pub mod args;
pub mod config;

pub use args::{Args, Commands, ExecutionMode, GenerateConfig};
pub use config::ConfigDiscovery;
