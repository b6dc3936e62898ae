//! CLI-specific functionality for MATist
//!
//! This module contains argument parsing and configuration discovery.

pub mod args;
pub mod config;

pub use args::{
    Args, ChatConfig, Commands, CompileConfig, ExecutionMode, ProcessConfig, RuntimeOptions,
};
pub use config::ConfigDiscovery;
