//! portprobe - concurrent TCP port scanner with service identification
//!
//! Resolves a target, probes a port range with a bounded pool of async
//! workers and tags every open port as TLS, with its banner, or plain Open.

pub mod config;
pub mod error;
pub mod network;
pub mod output;
pub mod scanner;
pub mod utils;

// Re-export commonly used types
pub use config::ScanConfig;
pub use error::ScanError;
pub use network::{PortFinding, PortProber, ProbeOutcome, ServiceTag};
pub use scanner::{PortRange, ScanEngine, ScanResult, ScanStats};

pub type Result<T> = std::result::Result<T, ScanError>;
