//! Error types for service registration and resolution

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by service factories.
///
/// Factories can use `?` on any `Send + Sync` error, including [`DiError`]
/// produced by [`Dependencies::get`](crate::Dependencies::get).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during dependency injection operations
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// No descriptor is registered under the requested name
    #[error("Service not found: {name}")]
    NotFound { name: String },

    /// Resolution re-entered a name already on the active resolution stack
    #[error("Circular dependency detected: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    /// A descriptor with the same name is already registered
    #[error("Service already registered: {name}")]
    AlreadyRegistered { name: String },

    /// The service factory returned an error
    #[error("Failed to create service {name}: {source}")]
    CreationFailed {
        name: String,
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Container is locked and its registry cannot be modified
    #[error("Container is locked - cannot modify registrations")]
    Locked,

    /// Descriptor rejected at registration time
    #[error("Invalid descriptor for service '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },

    /// The resolved instance does not have the type the consumer expects
    #[error("Service {name} is not of type {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },

    /// A factory asked for a dependency slot it did not declare
    #[error("Dependency index {index} out of range ({len} declared)")]
    ArgumentOutOfRange { index: usize, len: usize },

    /// A synchronous resolution reached a service with an async factory
    #[error("Service {name} has an asynchronous factory and must be resolved with resolve_async")]
    AsyncFactory { name: String },

    /// The caller stopped waiting for a resolution
    #[error("Timed out after {timeout:?} waiting for service {name}")]
    Timeout { name: String, timeout: Duration },

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

impl DiError {
    /// Create a NotFound error for a service name
    #[inline]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a CircularDependency error from the names along the cycle
    pub fn circular<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::CircularDependency {
            path: path.into_iter().map(|s| s.as_ref().to_owned()).collect(),
        }
    }

    /// Create an AlreadyRegistered error
    #[inline]
    pub fn already_registered(name: impl Into<String>) -> Self {
        Self::AlreadyRegistered { name: name.into() }
    }

    /// Wrap a factory failure, keeping the original error as the source
    #[inline]
    pub fn creation_failed(name: impl Into<String>, cause: BoxError) -> Self {
        Self::CreationFailed {
            name: name.into(),
            source: Arc::from(cause),
        }
    }

    /// Create an InvalidDescriptor error
    #[inline]
    pub fn invalid_descriptor(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a TypeMismatch error for type `T`
    #[inline]
    pub fn type_mismatch<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// The service name this error is about, if it names one.
    pub fn service_name(&self) -> Option<&str> {
        match self {
            Self::NotFound { name }
            | Self::AlreadyRegistered { name }
            | Self::CreationFailed { name, .. }
            | Self::InvalidDescriptor { name, .. }
            | Self::TypeMismatch { name, .. }
            | Self::AsyncFactory { name }
            | Self::Timeout { name, .. } => Some(name.as_str()),
            Self::CircularDependency { path } => path.first().map(String::as_str),
            Self::Locked | Self::ArgumentOutOfRange { .. } | Self::Internal(_) => None,
        }
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_circular_display_joins_path() {
        let err = DiError::circular(["a", "b", "a"]);
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
        assert_eq!(err.service_name(), Some("a"));
    }

    #[test]
    fn test_creation_failed_keeps_source() {
        let cause: BoxError = "connection refused".into();
        let err = DiError::creation_failed("db", cause);

        assert_eq!(err.service_name(), Some("db"));
        let source = err.source().expect("source preserved");
        assert_eq!(source.to_string(), "connection refused");

        // Clone shares the same underlying cause
        let cloned = err.clone();
        assert_eq!(cloned.to_string(), err.to_string());
    }

    #[test]
    fn test_type_mismatch_names_expected_type() {
        let err = DiError::type_mismatch::<u32>("port");
        match err {
            DiError::TypeMismatch { name, expected } => {
                assert_eq!(name, "port");
                assert_eq!(expected, "u32");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
