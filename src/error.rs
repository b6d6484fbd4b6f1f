//! Error handling for the portprobe scanner
//!
//! Only resolution and configuration failures ever reach a caller: per-port
//! connect failures and probe timeouts are recovered inside the prober and
//! simply leave the port out of the result.

use thiserror::Error;

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Resolution failed: {0}")]
    Resolution(String),

    #[error("Port range error: {0}")]
    PortRange(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS setup error: {0}")]
    Tls(#[from] openssl::error::ErrorStack),
}

impl ScanError {
    /// Whether this error is raised before any network activity takes place.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ScanError::PortRange(_) | ScanError::Config(_))
    }
}
