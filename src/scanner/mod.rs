//! Scanner module containing the scan engine and result types

pub mod aggregate;
pub mod engine;

use crate::network::{PortFinding, ScanTarget};
use crate::ScanError;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::time::Duration;

pub use engine::{ProgressCallback, ScanEngine};

/// Inclusive range of TCP ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// Validate a requested range; both ends must lie in 1..=65535 and be ordered
    pub fn new(start: u32, end: u32) -> crate::Result<Self> {
        let check = |port: u32, which: &str| -> crate::Result<u16> {
            match u16::try_from(port) {
                Ok(p) if p != 0 => Ok(p),
                _ => Err(ScanError::PortRange(format!(
                    "{} port {} is outside 1-65535",
                    which, port
                ))),
            }
        };

        let start = check(start, "start")?;
        let end = check(end, "end")?;
        if start > end {
            return Err(ScanError::PortRange(format!(
                "start port {} is greater than end port {}",
                start, end
            )));
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Number of ports in the range
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    /// A validated range always holds at least one port
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    /// Ports in ascending order
    pub fn iter(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

/// Final report of one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Display hostname of the target
    pub host: String,

    /// Resolved address, absent when resolution failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,

    pub start_port: u32,

    pub end_port: u32,

    /// Number of ports in the requested range
    pub num_of_ports: usize,

    /// Open ports in ascending order
    pub open_ports: Vec<PortFinding>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip)]
    pub stats: ScanStats,
}

impl ScanResult {
    /// Successful scan of a resolved target
    pub fn completed(target: &ScanTarget, range: PortRange, open_ports: Vec<PortFinding>) -> Self {
        Self {
            host: target.hostname.clone(),
            ip: Some(target.ip),
            start_port: u32::from(range.start()),
            end_port: u32::from(range.end()),
            num_of_ports: range.len(),
            open_ports,
            error: None,
            stats: ScanStats::default(),
        }
    }

    /// Scan that stopped before probing any port
    pub fn failed(host: &str, start_port: u32, end_port: u32, error: &ScanError) -> Self {
        let num_of_ports = PortRange::new(start_port, end_port)
            .map(|range| range.len())
            .unwrap_or(0);

        Self {
            host: host.to_string(),
            ip: None,
            start_port,
            end_port,
            num_of_ports,
            open_ports: Vec::new(),
            error: Some(error.to_string()),
            stats: ScanStats::default(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Ports found open, in ascending order
    pub fn open_port_numbers(&self) -> Vec<u16> {
        self.open_ports.iter().map(|f| f.port).collect()
    }
}

/// Bookkeeping about how a scan ran; never serialized
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Worker tasks spawned
    pub workers: usize,

    /// Ports handed to the prober
    pub ports_probed: usize,

    pub duration: Duration,

    /// The scan was cancelled before the range was exhausted
    pub cancelled: bool,
}
