//! Main scanning engine implementation
//!
//! One scan runs as: validate → resolve → feed ports into a bounded queue
//! drained by a fixed set of worker tasks → join every worker → drain the
//! finding stream → normalize. The finding stream is only read after the
//! join, so no finding sent by a live worker can be lost.

use super::aggregate;
use super::{PortRange, ScanResult, ScanStats};
use crate::config::ScanConfig;
use crate::network::{self, PortFinding, PortProber, ProbeOutcome, TcpProber};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Called once for every port the prober has finished with
pub type ProgressCallback = Arc<dyn Fn(u16) + Send + Sync>;

type PortQueue = Arc<Mutex<mpsc::Receiver<u16>>>;

/// Main scanning engine
pub struct ScanEngine {
    config: ScanConfig,
    prober: Arc<dyn PortProber>,
    progress: Option<ProgressCallback>,
}

impl ScanEngine {
    /// Create an engine probing with TCP connect, TLS detection and banner capture
    pub fn new(config: ScanConfig) -> crate::Result<Self> {
        let prober = TcpProber::from_config(&config)?;
        Ok(Self::with_prober(config, Arc::new(prober)))
    }

    /// Create an engine around a custom prober
    pub fn with_prober(config: ScanConfig, prober: Arc<dyn PortProber>) -> Self {
        Self {
            config,
            prober,
            progress: None,
        }
    }

    /// Report each probed port to `callback`
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Scan `start_port..=end_port` on `target`
    pub async fn scan_ports(&self, target: &str, start_port: u32, end_port: u32) -> ScanResult {
        self.scan_ports_with_cancel(target, start_port, end_port, CancellationToken::new())
            .await
    }

    /// Scan `start_port..=end_port` on `target`, stopping early once `cancel` fires.
    ///
    /// A cancelled scan still returns the findings made before cancellation,
    /// with `stats.cancelled` set.
    pub async fn scan_ports_with_cancel(
        &self,
        target: &str,
        start_port: u32,
        end_port: u32,
        cancel: CancellationToken,
    ) -> ScanResult {
        let start_time = Instant::now();

        let range = match self
            .config
            .validate()
            .and_then(|_| PortRange::new(start_port, end_port))
        {
            Ok(range) => range,
            Err(e) => {
                log::warn!("Refusing to scan {}: {}", target, e);
                return ScanResult::failed(target, start_port, end_port, &e);
            }
        };

        let resolved = match network::resolve(target).await {
            Ok(resolved) => resolved,
            Err(e) => {
                log::warn!("{}", e);
                return ScanResult::failed(target, start_port, end_port, &e);
            }
        };

        log::debug!("Target {:?} resolved to {}", resolved.raw, resolved.ip);
        log::info!(
            "Scanning {} ({}) ports {}-{}",
            resolved.hostname,
            resolved.ip,
            range.start(),
            range.end()
        );

        let (findings, mut stats) = self.run_workers(resolved.ip, range, cancel).await;

        let mut result = ScanResult::completed(&resolved, range, aggregate::normalize(findings));
        stats.duration = start_time.elapsed();
        if stats.cancelled {
            log::warn!(
                "Scan of {} cancelled after {} of {} ports",
                resolved.hostname,
                stats.ports_probed,
                range.len()
            );
        }
        log::info!(
            "Scan of {} finished in {:?}: {} open",
            resolved.hostname,
            stats.duration,
            result.open_ports.len()
        );
        result.stats = stats;
        result
    }

    /// Drive the worker pool over `range` and collect raw findings
    async fn run_workers(
        &self,
        ip: IpAddr,
        range: PortRange,
        cancel: CancellationToken,
    ) -> (Vec<PortFinding>, ScanStats) {
        let scan_token = cancel.child_token();
        // stops the feeder and workers if this future is dropped mid-scan
        let _guard = scan_token.clone().drop_guard();

        let worker_count = worker_count(self.config.workers, range.len());
        let (port_tx, port_rx) = mpsc::channel::<u16>(worker_count);
        let port_rx: PortQueue = Arc::new(Mutex::new(port_rx));
        let (finding_tx, mut finding_rx) = mpsc::unbounded_channel::<PortFinding>();
        let probed = Arc::new(AtomicUsize::new(0));

        let feeder = tokio::spawn(feed_ports(range, port_tx, scan_token.clone()));

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let worker = Worker {
                ip,
                prober: Arc::clone(&self.prober),
                queue: Arc::clone(&port_rx),
                findings: finding_tx.clone(),
                cancel: scan_token.clone(),
                progress: self.progress.clone(),
                probed: Arc::clone(&probed),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        // workers now own every handle to the queue and the finding stream
        drop(port_rx);
        drop(finding_tx);

        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Scan worker failed: {}", e);
            }
        }
        if let Err(e) = feeder.await {
            log::error!("Port feeder failed: {}", e);
        }

        // every sender is gone, so this drains and ends
        let mut findings = Vec::new();
        while let Some(finding) = finding_rx.recv().await {
            findings.push(finding);
        }

        let stats = ScanStats {
            workers: worker_count,
            ports_probed: probed.load(Ordering::Relaxed),
            cancelled: scan_token.is_cancelled(),
            ..Default::default()
        };

        (findings, stats)
    }
}

/// Workers to spawn for a range: never more than there are ports
pub fn worker_count(configured: usize, total_ports: usize) -> usize {
    configured.min(total_ports).max(1)
}

/// Push ports in ascending order until the range is done or the scan is cancelled
async fn feed_ports(range: PortRange, queue: mpsc::Sender<u16>, cancel: CancellationToken) {
    for port in range.iter() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("Feeder stopped at port {}", port);
                return;
            }
            sent = queue.send(port) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

struct Worker {
    ip: IpAddr,
    prober: Arc<dyn PortProber>,
    queue: PortQueue,
    findings: mpsc::UnboundedSender<PortFinding>,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
    probed: Arc<AtomicUsize>,
}

impl Worker {
    async fn run(self) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                port = next_port(&self.queue) => port,
            };
            let Some(port) = next else { break };

            let outcome = self.prober.probe(self.ip, port, &self.cancel).await;
            self.probed.fetch_add(1, Ordering::Relaxed);
            if let Some(progress) = &self.progress {
                progress(port);
            }

            if let ProbeOutcome::Open(tag) = outcome {
                log::debug!("{}:{} open ({})", self.ip, port, tag);
                if self.findings.send(PortFinding::new(port, tag)).is_err() {
                    break;
                }
            }
        }
    }
}

async fn next_port(queue: &Mutex<mpsc::Receiver<u16>>) -> Option<u16> {
    queue.lock().await.recv().await
}
