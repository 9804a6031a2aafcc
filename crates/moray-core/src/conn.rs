//! Connection-source capability.
//!
//! The verifier and the tool wrappers accept "anything that can produce a
//! connection string": a live [`Cluster`] owned by the orchestrator, or a
//! plain URI pointing at an externally-managed deployment. This module
//! defines that closed capability interface.
//!
//! [`Cluster`]: https://docs.rs/moray-orchestrator

use std::fmt;

/// Anything that can produce a MongoDB connection URI.
///
/// Implementations must be cheap to call repeatedly; callers create
/// client handles from the returned URI as needed.
pub trait ConnectionSource: Send + Sync {
    /// Returns the MongoDB connection string for this source.
    fn connection_uri(&self) -> String;
}

/// A raw connection string.
///
/// Wraps a URI so externally-managed deployments can be handed to the
/// verifier alongside harness-owned clusters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri(String);

impl Uri {
    /// Creates a new URI source.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Returns the wrapped string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ConnectionSource for Uri {
    fn connection_uri(&self) -> String {
        self.0.clone()
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Uri {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
