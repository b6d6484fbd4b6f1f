//! Per-port probing: connect with retries, then classify the open port

use super::tls::{Recorder, TlsDetector};
use super::{ProbeOutcome, ServiceTag};
use crate::config::{RetryPolicy, ScanConfig};
use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Maximum number of banner bytes kept per port
pub const BANNER_LIMIT: usize = 1024;

/// Something that can tell whether a port is open and what answers there.
///
/// Implementations must return promptly once `cancel` fires; the engine
/// relies on this to bound cancellation latency.
#[async_trait]
pub trait PortProber: Send + Sync {
    async fn probe(&self, ip: IpAddr, port: u16, cancel: &CancellationToken) -> ProbeOutcome;
}

/// TCP connect prober with TLS detection and banner capture
#[derive(Clone)]
pub struct TcpProber {
    timeout: Duration,
    retry: RetryPolicy,
    tls: TlsDetector,
}

impl TcpProber {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> crate::Result<Self> {
        Ok(Self {
            timeout,
            retry,
            tls: TlsDetector::new()?,
        })
    }

    pub fn from_config(config: &ScanConfig) -> crate::Result<Self> {
        Self::new(config.timeout_duration(), config.retry_policy())
    }

    /// Identify what answers on an established connection.
    ///
    /// Cancellation cuts identification short; the port is still open, so
    /// it is reported without a tag.
    async fn classify(&self, mut stream: TcpStream, cancel: &CancellationToken) -> ServiceTag {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::trace!("Identification abandoned on cancellation");
                ServiceTag::Open
            }
            tag = self.identify(&mut stream) => tag,
        }
    }

    async fn identify(&self, stream: &mut TcpStream) -> ServiceTag {
        let mut recorder = Recorder::new(&mut *stream, BANNER_LIMIT);
        if self.tls.handshake(&mut recorder, self.timeout).await {
            return ServiceTag::Tls;
        }

        // whatever the peer sent during the failed handshake is the start of its banner
        let mut banner = recorder.into_recorded();
        if looks_like_tls_record(&banner) {
            // a TLS peer refused our hello; its alert is not a banner
            log::trace!("Discarding {} bytes of TLS records", banner.len());
            banner.clear();
        }
        if let Err(e) = self.read_banner(stream, &mut banner).await {
            log::trace!("Banner read failed: {}", e);
        }

        if banner.is_empty() {
            ServiceTag::Open
        } else {
            ServiceTag::Banner(String::from_utf8_lossy(&banner).into_owned())
        }
    }

    async fn read_banner(&self, stream: &mut TcpStream, banner: &mut Vec<u8>) -> io::Result<()> {
        let mut buf = [0u8; BANNER_LIMIT];
        let room = BANNER_LIMIT.saturating_sub(banner.len());
        if room == 0 {
            return Ok(());
        }

        if banner.is_empty() {
            if let Ok(read) = timeout(self.timeout, stream.read(&mut buf[..room])).await {
                let n = read?;
                banner.extend_from_slice(&buf[..n]);
            }
            return Ok(());
        }

        // The peer already spoke; only collect what has arrived, never wait again
        loop {
            let room = BANNER_LIMIT.saturating_sub(banner.len());
            if room == 0 {
                return Ok(());
            }
            match stream.try_read(&mut buf[..room]) {
                Ok(0) => return Ok(()),
                Ok(n) => banner.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Whether `bytes` open with a TLS record header (content type 20-23, version 3.x)
fn looks_like_tls_record(bytes: &[u8]) -> bool {
    matches!(bytes, [0x14..=0x17, 0x03, ..])
}

#[async_trait]
impl PortProber for TcpProber {
    async fn probe(&self, ip: IpAddr, port: u16, cancel: &CancellationToken) -> ProbeOutcome {
        let addr = SocketAddr::new(ip, port);

        for attempt in 1..=self.retry.max_attempts {
            if cancel.is_cancelled() {
                return ProbeOutcome::Closed;
            }

            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ProbeOutcome::Closed,
                connected = timeout(self.timeout, TcpStream::connect(addr)) => connected,
            };

            match connected {
                Ok(Ok(stream)) => return ProbeOutcome::Open(self.classify(stream, cancel).await),
                Ok(Err(e)) => log::trace!(
                    "{} attempt {}/{} failed: {}",
                    addr,
                    attempt,
                    self.retry.max_attempts,
                    e
                ),
                Err(_) => log::trace!(
                    "{} attempt {}/{} timed out",
                    addr,
                    attempt,
                    self.retry.max_attempts
                ),
            }

            if !self.retry.should_retry(attempt) {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => return ProbeOutcome::Closed,
                _ = tokio::time::sleep(self.retry.backoff) => {}
            }
        }

        ProbeOutcome::Closed
    }
}
