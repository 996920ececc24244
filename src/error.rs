//! Error handling for bpbuild
//!
//! Centralized error types using thiserror. The taxonomy mirrors how a build
//! run actually fails: bad order configuration, an external package build
//! exiting non-zero, or the service runner misbehaving during tests.

use thiserror::Error;

/// Main error type for bpbuild
#[derive(Error, Debug)]
pub enum BuildError {
    /// IO errors (directory wipes, order files, spawned processes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Build-order configuration errors (loading, parsing, validation)
    #[error("Build order error: {0}")]
    Order(String),

    /// A package build failed; the run aborts here.
    ///
    /// Carries the originating package name so the top-level message always
    /// says which package broke the run.
    #[error("package '{package}' failed to build: {reason}")]
    Package { package: String, reason: String },

    /// Service-runner/session errors raised by the test harness
    #[error("service error: {0}")]
    Service(String),

    /// JSON serialization/deserialization errors for order files
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for bpbuild operations
pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    /// Create a build-order configuration error
    pub fn order(msg: impl Into<String>) -> Self {
        Self::Order(msg.into())
    }

    /// Create a package build failure naming the originating package
    pub fn package(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Package {
            package: package.into(),
            reason: reason.into(),
        }
    }

    /// Create a service-runner error
    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    /// The package this error originated from, if any.
    ///
    /// Used by the driver's callers to report which package aborted a run.
    pub fn failed_package(&self) -> Option<&str> {
        match self {
            Self::Package { package, .. } => Some(package.as_str()),
            _ => None,
        }
    }
}
