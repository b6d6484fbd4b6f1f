//! Output formatting and management

use crate::scanner::ScanResult;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Text,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "text" | "txt" => Ok(OutputFormat::Text),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub colored: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Json,
            colored: true,
        }
    }
}

/// Main output manager
pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Write scan results to stdout
    pub fn write_results(&self, results: &ScanResult) -> io::Result<()> {
        let output = self.render(results)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(output.as_bytes())?;
        stdout.flush()
    }

    /// Render scan results in the configured format
    pub fn render(&self, results: &ScanResult) -> io::Result<String> {
        match self.config.format {
            OutputFormat::Json => self.format_json(results),
            OutputFormat::Text => Ok(self.format_text(results)),
        }
    }

    fn format_json(&self, results: &ScanResult) -> io::Result<String> {
        let mut json = serde_json::to_string_pretty(results)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        json.push('\n');
        Ok(json)
    }

    fn format_text(&self, results: &ScanResult) -> String {
        let mut output = String::new();

        let target = match results.ip {
            Some(ip) => format!("{} ({})", results.host, ip),
            None => results.host.clone(),
        };
        output.push_str(&format!(
            "Scan report for {} ports {}-{}\n",
            target, results.start_port, results.end_port
        ));

        if let Some(error) = &results.error {
            output.push_str(&self.colorize(&format!("ERROR: {}\n", error), Tone::Error));
            return output;
        }

        if results.open_ports.is_empty() {
            output.push_str(&self.colorize("No open ports found\n", Tone::Muted));
        } else {
            output.push_str(&format!("{:<8} {}\n", "PORT", "INFO"));
            for finding in &results.open_ports {
                let port = format!("{}/tcp", finding.port);
                let line = format!("{:<8} {}\n", port, one_line(finding.info.as_str()));
                output.push_str(&self.colorize(&line, Tone::Open));
            }
        }

        output.push_str(&format!(
            "{} open of {} ports scanned\n",
            results.open_ports.len(),
            results.num_of_ports
        ));
        if results.stats.cancelled {
            output.push_str(
                &self.colorize("Scan was cancelled; results are partial\n", Tone::Error),
            );
        }

        output
    }

    fn colorize(&self, text: &str, tone: Tone) -> String {
        if !self.config.colored {
            return text.to_string();
        }

        match tone {
            Tone::Open => text.bright_green().to_string(),
            Tone::Error => text.bright_red().bold().to_string(),
            Tone::Muted => text.bright_black().to_string(),
        }
    }
}

#[derive(Clone, Copy)]
enum Tone {
    Open,
    Error,
    Muted,
}

/// Banners may span lines; keep the table to one row per port
fn one_line(info: &str) -> String {
    info.trim().escape_debug().to_string()
}

/// Progress bar shown on stderr while a scan runs
pub struct ProgressDisplay {
    bar: ProgressBar,
}

impl ProgressDisplay {
    pub fn new(total_ports: usize) -> Self {
        let bar = ProgressBar::new(total_ports as u64);
        let style = ProgressStyle::with_template(
            "{spinner} Scanning [{bar:40}] {pos}/{len} ports ({per_sec}, ETA {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░ ");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Hidden bar for non-interactive runs
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Callback suitable for `ScanEngine::with_progress`
    pub fn callback(&self) -> crate::scanner::ProgressCallback {
        let bar = self.bar.clone();
        std::sync::Arc::new(move |_port: u16| bar.inc(1))
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
