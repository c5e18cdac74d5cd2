//! Unified error type definition

use serde::Serialize;
use thiserror::Error;

/// Probe failure taxonomy.
///
/// Every probe reports its own I/O faults through this type; the dispatcher
/// turns it into a [`ProbeResult`](crate::ProbeResult) envelope.
#[derive(Error, Debug, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum ToolboxError {
    /// Missing or malformed input, detected before any I/O.
    #[error("{0}")]
    ValidationError(String),

    /// Connection refused/reset, resolver failure, handshake failure.
    #[error("{0}")]
    NetworkError(String),

    /// A probe's own deadline fired.
    #[error("{0}")]
    Timeout(String),

    /// Unexpected fault caught at the dispatcher boundary.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Toolbox Result type alias
pub type ToolboxResult<T> = std::result::Result<T, ToolboxError>;
