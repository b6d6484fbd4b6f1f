//! Network module: target resolution and per-port probing

pub mod probe;
pub mod resolver;
pub mod tls;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

pub use probe::{PortProber, TcpProber};
pub use resolver::resolve;
pub use tls::TlsDetector;

/// What was observed on an open port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceTag {
    /// A TLS handshake completed
    Tls,
    /// The peer sent data without being asked
    Banner(String),
    /// The connection succeeded but the peer stayed silent
    Open,
}

impl ServiceTag {
    pub fn as_str(&self) -> &str {
        match self {
            ServiceTag::Tls => "TLS",
            ServiceTag::Banner(banner) => banner,
            ServiceTag::Open => "Open",
        }
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ServiceTag {
    fn from(value: String) -> Self {
        match value.as_str() {
            "TLS" => ServiceTag::Tls,
            "Open" => ServiceTag::Open,
            _ => ServiceTag::Banner(value),
        }
    }
}

impl From<ServiceTag> for String {
    fn from(tag: ServiceTag) -> Self {
        match tag {
            ServiceTag::Banner(banner) => banner,
            other => other.as_str().to_string(),
        }
    }
}

/// Outcome of probing a single port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Open(ServiceTag),
    Closed,
}

/// A single open port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortFinding {
    pub port: u16,
    pub info: ServiceTag,
}

impl PortFinding {
    pub fn new(port: u16, info: ServiceTag) -> Self {
        Self { port, info }
    }
}

/// A resolved scan target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    /// Target exactly as supplied by the caller
    pub raw: String,
    pub ip: IpAddr,
    /// Name shown in results
    pub hostname: String,
}
