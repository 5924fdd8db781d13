//! Error types for Quiver

use thiserror::Error;

/// Result type alias using Quiver Error
pub type Result<T> = std::result::Result<T, Error>;

/// Quiver error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{kind} not found: {path}")]
    NotFound { kind: String, path: String },

    /// Access to a capability that no namespace defines.
    #[error("{}", unknown_method_message(.method, .negated))]
    UnknownMethod {
        namespace: String,
        method: String,
        negated: bool,
    },

    #[error("Compilation of {path} failed: {message}")]
    Compilation { path: String, message: String },

    /// The synchronous loader refused the module because it uses the
    /// other module convention. The resolver recovers from this one.
    #[error("Module {path} must be loaded with the asynchronous loader")]
    RequireEsm { path: String },

    #[error("Failed to load module {path}: {message}")]
    Module { path: String, message: String },

    #[error("Call to {name} failed: {message}")]
    Invocation { name: String, message: String },

    #[error("Assertion {namespace}.{method} failed: {message}")]
    AssertionFailed {
        namespace: String,
        method: String,
        message: String,
    },

    #[error("Invalid export in {path}: {message}")]
    InvalidExport { path: String, message: String },

    #[error("Host runtime unavailable: {0}")]
    HostUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn unknown_method_message(method: &str, negated: &bool) -> String {
    if *negated {
        format!("Unknown api method .not.\"{}\".", method)
    } else {
        format!("Unknown api method \"{}\".", method)
    }
}

impl Error {
    pub fn not_found(kind: impl Into<String>, path: impl AsRef<std::path::Path>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            path: path.as_ref().display().to_string(),
        }
    }

    pub fn compilation(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        Error::Compilation {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    pub fn module(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        Error::Module {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_export(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        Error::InvalidExport {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    /// True when the error is the interop signal for the other module convention.
    pub fn is_require_esm(&self) -> bool {
        matches!(self, Error::RequireEsm { .. })
    }
}
