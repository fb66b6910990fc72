//! Error types for the verdict gate
//!
//! Every fallible internal operation returns [`GateResult`]. None of these
//! errors ever reach a caller of the engine: the engine converts them into
//! fail-closed verdicts and records the detail in logs only.

use thiserror::Error;

/// Main error type for the verdict gate
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Policy table error: {message}")]
    Policy { message: String },

    #[error("Input contract violation: {field} - {message}")]
    InputContract { field: String, message: String },

    #[error("Evaluator failed: {evaluator} - {message}")]
    Evaluator { evaluator: String, message: String },

    #[error("Classifier failed: {message}")]
    Classifier { message: String },

    #[error("I/O operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Database operation failed: {operation} - {source}")]
    Database {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Canonicalization failed: {message}")]
    Canonicalization { message: String },

    #[error("Mutex lock failed: {resource}")]
    MutexPoisoned { resource: String },
}

/// Result alias used across the crate
pub type GateResult<T> = Result<T, GateError>;

impl GateError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a policy table error
    pub fn policy(message: impl Into<String>) -> Self {
        Self::Policy {
            message: message.into(),
        }
    }

    /// Create an input contract violation
    pub fn input_contract(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InputContract {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an evaluator failure
    pub fn evaluator(evaluator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluator {
            evaluator: evaluator.into(),
            message: message.into(),
        }
    }

    pub fn classifier(message: impl Into<String>) -> Self {
        Self::Classifier {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a serialization error
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Create a database error
    pub fn database(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Database {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    pub fn canonicalization(message: impl Into<String>) -> Self {
        Self::Canonicalization {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for GateError {
    fn from(err: std::io::Error) -> Self {
        GateError::io("unspecified", err)
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        GateError::serialization("JSON processing", err)
    }
}

impl From<sled::Error> for GateError {
    fn from(err: sled::Error) -> Self {
        GateError::database("sled operation", err)
    }
}

/// Mutex locking that reports poisoning as an error instead of panicking
pub trait SafeLock<T: ?Sized> {
    fn safe_lock(&self, resource: &str) -> GateResult<std::sync::MutexGuard<'_, T>>;
}

impl<T: ?Sized> SafeLock<T> for std::sync::Mutex<T> {
    fn safe_lock(&self, resource: &str) -> GateResult<std::sync::MutexGuard<'_, T>> {
        self.lock().map_err(|_| GateError::MutexPoisoned {
            resource: resource.to_string(),
        })
    }
}
