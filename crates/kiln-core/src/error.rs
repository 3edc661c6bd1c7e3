//! Error types for kiln SDK operations.
//!
//! This module defines [`KilnError`], the error enum shared by every layer of
//! the SDK. Errors are designed for visibility: a failed remote call tells the
//! caller which procedure failed and, when the engine wrote anything to its
//! stderr, carries that captured output along.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`KilnError`].
pub type Result<T> = std::result::Result<T, KilnError>;

/// Error type for all kiln SDK operations.
///
/// The runtime recovers from [`Spawn`](KilnError::Spawn) and
/// [`Transport`](KilnError::Transport) failures on its own (the dead worker
/// slot is replaced on the next acquisition); everything else is surfaced to
/// the caller unchanged. No layer of the SDK retries a failed call.
#[derive(Debug, Error)]
pub enum KilnError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Engine executable could not be located
    #[error("kiln engine not found: {searched}")]
    EngineNotFound { searched: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // Worker Errors
    // =========================================================================
    /// Worker subprocess could not be launched or piped
    #[error("Failed to spawn worker: {message}")]
    Spawn {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// RPC codec read/write failure, typically meaning the worker died mid-call
    #[error("Transport error calling {method}: {message}")]
    Transport { method: String, message: String },

    /// Malformed frame on the worker channel
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Structured failure returned by the remote engine, as received
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Engine failure unwrapped from the sentinel error payload
    #[error("{message}")]
    Remote { message: String },

    /// Any failure annotated with the worker's captured stderr
    #[error("{source}: stderr = {diagnostics}")]
    WithDiagnostics {
        #[source]
        source: Box<KilnError>,
        diagnostics: String,
    },

    /// Task submitted after the pool began shutting down
    #[error("worker pool is closed")]
    PoolClosed,

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Internal error (bug in the SDK)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl KilnError {
    // =========================================================================
    // Constructor helpers for common error patterns
    // =========================================================================

    /// Create a spawn error without an I/O source.
    pub fn spawn(message: impl Into<String>) -> Self {
        Self::Spawn {
            message: message.into(),
            source: None,
        }
    }

    /// Create a spawn error from a failed launch.
    pub fn spawn_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a transport error for a named remote procedure.
    pub fn transport(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a remote engine error with a plain message.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Create an I/O error.
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Annotate this error with captured worker stderr.
    ///
    /// Returns the error unchanged when `diagnostics` is empty.
    pub fn with_diagnostics(self, diagnostics: impl Into<String>) -> Self {
        let diagnostics = diagnostics.into();
        if diagnostics.is_empty() {
            return self;
        }
        Self::WithDiagnostics {
            source: Box::new(self),
            diagnostics,
        }
    }

    // =========================================================================
    // Error classification helpers
    // =========================================================================

    /// Returns true if this error means the worker process itself failed
    /// (the pool will replace the worker on the next acquisition).
    pub fn is_worker_failure(&self) -> bool {
        match self {
            Self::Spawn { .. } | Self::Transport { .. } => true,
            Self::WithDiagnostics { source, .. } => source.is_worker_failure(),
            _ => false,
        }
    }

    /// Returns true if the remote engine ran the call and reported a failure.
    pub fn is_remote(&self) -> bool {
        match self {
            Self::Remote { .. } | Self::Rpc { .. } => true,
            Self::WithDiagnostics { source, .. } => source.is_remote(),
            _ => false,
        }
    }

    /// Returns true if the pool rejected the task because it is shut down.
    pub fn is_pool_closed(&self) -> bool {
        matches!(self, Self::PoolClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_classification() {
        let err = KilnError::spawn("executable missing");
        assert!(err.is_worker_failure());
        assert!(!err.is_remote());
    }

    #[test]
    fn test_remote_error_display_is_plain() {
        let err = KilnError::remote("schema check failed");
        assert_eq!(err.to_string(), "schema check failed");
        assert!(err.is_remote());
    }

    #[test]
    fn test_rpc_error_display_keeps_code() {
        let err = KilnError::Rpc {
            code: -32000,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "rpc error -32000: boom");
    }

    #[test]
    fn test_with_diagnostics_combines_text() {
        let err = KilnError::remote("evaluation failed").with_diagnostics("panic at line 3");
        let text = err.to_string();
        assert!(text.contains("evaluation failed"));
        assert!(text.contains("panic at line 3"));
        assert!(err.is_remote());
    }

    #[test]
    fn test_with_diagnostics_empty_is_unchanged() {
        let err = KilnError::remote("evaluation failed").with_diagnostics("");
        assert_eq!(err.to_string(), "evaluation failed");
        assert!(matches!(err, KilnError::Remote { .. }));
    }

    #[test]
    fn test_transport_classified_as_worker_failure() {
        let err = KilnError::transport("Ping", "connection closed").with_diagnostics("died");
        assert!(err.is_worker_failure());
    }

    #[test]
    fn test_pool_closed() {
        assert!(KilnError::PoolClosed.is_pool_closed());
    }
}
