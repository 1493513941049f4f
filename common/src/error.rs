//! Error handling for the skewer-common crate.

use thiserror::Error;

/// Common error type that abstracts over underlying library errors.
///
/// Every variant carries a human readable message plus an optional source
/// so callers can keep the full chain for diagnostics.
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Serialization failed: {message}")]
    SerializationError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Deserialization failed: {message}")]
    DeserializationError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Invalid configuration: {message}")]
    ConfigurationError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("IO operation failed: {message}")]
    IoError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Resource not found: {message}")]
    NotFoundError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Internal error: {message}")]
    InternalError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

/// Result type alias for common operations.
pub type Result<T> = std::result::Result<T, CommonError>;

impl CommonError {
    /// Create a serialization error with a custom message and source error.
    pub fn serialization_error_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a deserialization error with a custom message and source error.
    pub fn deserialization_error_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::DeserializationError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a configuration error with a custom message.
    pub fn configuration_error<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with a custom message and source error.
    pub fn configuration_error_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create an IO error with a custom message and source error.
    pub fn io_error_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::IoError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a not found error with a custom message.
    pub fn not_found_error<S: Into<String>>(message: S) -> Self {
        Self::NotFoundError {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with a custom message and source error.
    pub fn internal_error_with_source<S: Into<String>, E: Into<anyhow::Error>>(
        message: S,
        source: E,
    ) -> Self {
        Self::InternalError {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Context helpers for adding rich context to errors.
pub mod context {
    use super::*;

    /// Extension trait for wrapping foreign errors into a `CommonError` with a message.
    pub trait ErrorContext<T> {
        fn with_io_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String;

        fn with_serialization_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String;

        fn with_deserialization_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String;

        fn with_config_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String;
    }

    impl<T, E> ErrorContext<T> for std::result::Result<T, E>
    where
        E: Into<anyhow::Error>,
    {
        fn with_io_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String,
        {
            self.map_err(|e| CommonError::io_error_with_source(f(), e.into()))
        }

        fn with_serialization_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String,
        {
            self.map_err(|e| CommonError::serialization_error_with_source(f(), e.into()))
        }

        fn with_deserialization_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String,
        {
            self.map_err(|e| CommonError::deserialization_error_with_source(f(), e.into()))
        }

        fn with_config_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String,
        {
            self.map_err(|e| CommonError::configuration_error_with_source(f(), e.into()))
        }
    }
}

pub use context::ErrorContext;
