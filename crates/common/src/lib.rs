//! Quiver Common Library
//!
//! Shared error type, data model and configuration for the Quiver engine
//! and command-line interface.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Settings, SourcePaths};
pub use error::{Error, Result};
pub use types::*;

/// Quiver version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
