//! Unified error handling for the mini-bmc firmware simulator
//!
//! This crate provides a single error type used across all simulator components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using BmcError
pub type Result<T> = std::result::Result<T, BmcError>;

/// Unified error type for all simulator operations
#[derive(thiserror::Error, Debug)]
pub enum BmcError {
    // ============================================================================
    // Initialization Errors (fatal, process exits non-zero)
    // ============================================================================
    #[error("failed to initialize {component}: {reason}")]
    InitFailure {
        component: &'static str,
        reason: String,
    },

    // ============================================================================
    // Secure Boot Errors (non-fatal, supervisor continues in degraded mode)
    // ============================================================================
    #[error("secure boot chain broken at image '{image}': {reason}")]
    SecureBootFailure {
        image: String,
        reason: String,
    },

    // ============================================================================
    // IPMI Protocol Errors (never propagated past the connection handler)
    // ============================================================================
    #[error("IPMI protocol error: {0}")]
    IpmiProtocolError(String),

    // ============================================================================
    // Transient I/O Errors (logged, retried next tick)
    // ============================================================================
    #[error("transient I/O failure writing {path}: {source}")]
    TransientIo {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Resource Exhaustion (present for completeness; SEL overflow itself is
    // handled silently in-band rather than through this variant)
    // ============================================================================
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(&'static str),

    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Serialization Errors
    // ============================================================================
    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl BmcError {
    /// Create an initialization-failure error
    pub fn init_failure(component: &'static str, reason: impl Into<String>) -> Self {
        Self::InitFailure {
            component,
            reason: reason.into(),
        }
    }

    /// Create a secure-boot-failure error
    pub fn secure_boot_failure(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SecureBootFailure {
            image: image.into(),
            reason: reason.into(),
        }
    }

    /// Create an IPMI protocol error
    pub fn ipmi_protocol(msg: impl Into<String>) -> Self {
        Self::IpmiProtocolError(msg.into())
    }

    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }
}

// Allow converting from String to BmcError
impl From<String> for BmcError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to BmcError
impl From<&str> for BmcError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
