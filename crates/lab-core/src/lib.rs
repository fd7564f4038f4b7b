//! Core types and utilities for the phd-lab dataset helpers.
//!
//! This crate provides the error type, shared dataset types, configuration
//! structures and CLI helpers used across the workspace.

pub mod cli;
pub mod config;
pub mod error;
pub mod types;

pub use cli::*;
pub use config::*;
pub use error::{Error, Result};
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cli::*;
    pub use crate::config::*;
    pub use crate::error::{Error, Result};
    pub use crate::types::*;
}
