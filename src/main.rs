use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::io::IsTerminal;
use std::process;

use portprobe::{
    config::ScanConfig,
    output::{OutputConfig, OutputFormat, OutputManager, ProgressDisplay},
    scanner::{PortRange, ScanEngine},
    utils::{config::EnvironmentConfig, FdLimit, Logger},
};
use tokio_util::sync::CancellationToken;

fn build_cli() -> Command {
    Command::new("portprobe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Concurrent TCP port scanner with TLS and banner identification")
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_name("HOST")
                .help("Target to scan (IP address or hostname)")
                .required(true),
        )
        .arg(
            Arg::new("start-port")
                .short('s')
                .long("start-port")
                .value_name("PORT")
                .help("First port of the range")
                .value_parser(clap::value_parser!(u32))
                .default_value("1"),
        )
        .arg(
            Arg::new("end-port")
                .short('e')
                .long("end-port")
                .value_name("PORT")
                .help("Last port of the range")
                .value_parser(clap::value_parser!(u32))
                .default_value("65535"),
        )
        .arg(
            Arg::new("format")
                .short('o')
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .value_parser(["json", "text"])
                .default_value("json"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .help("Timeout per connect, handshake and banner read in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("COUNT")
                .help("Number of concurrent workers")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("retries")
                .short('r')
                .long("retries")
                .value_name("COUNT")
                .help("Connection attempts per port")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Load configuration from this TOML file instead of ~/.portprobe.toml"),
        )
        .arg(
            Arg::new("ulimit")
                .short('u')
                .long("ulimit")
                .value_name("LIMIT")
                .help("Raise the open file limit to this value")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("no-progress")
                .long("no-progress")
                .help("Hide the progress bar")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (repeatable)")
                .action(ArgAction::Count),
        )
}

/// Layer defaults, config file, environment and flags, lowest first
fn resolve_config(matches: &ArgMatches) -> anyhow::Result<ScanConfig> {
    let base = match matches.get_one::<String>("config") {
        Some(path) => ScanConfig::from_toml_file(path)
            .with_context(|| format!("could not load config file {}", path))?,
        None => ScanConfig::load_default_config(),
    };

    let mut config = EnvironmentConfig::from_env(base);

    if let Some(&timeout) = matches.get_one::<u64>("timeout") {
        config = config.with_timeout(timeout);
    }
    if let Some(&workers) = matches.get_one::<usize>("workers") {
        config = config.with_workers(workers);
    }
    if let Some(&retries) = matches.get_one::<u32>("retries") {
        config = config.with_retries(retries);
    }

    Ok(config)
}

async fn run(matches: ArgMatches) -> anyhow::Result<bool> {
    let target = matches
        .get_one::<String>("target")
        .cloned()
        .unwrap_or_default();
    let start_port = matches.get_one::<u32>("start-port").copied().unwrap_or(1);
    let end_port = matches.get_one::<u32>("end-port").copied().unwrap_or(65535);
    let format: OutputFormat = matches
        .get_one::<String>("format")
        .map(|f| f.parse())
        .transpose()
        .map_err(anyhow::Error::msg)?
        .unwrap_or(OutputFormat::Json);

    let mut config = resolve_config(&matches)?;

    let fd_limit = FdLimit::raise(matches.get_one::<u64>("ulimit").copied());
    let capped = FdLimit::cap_workers(config.workers, fd_limit);
    if capped < config.workers {
        log::warn!(
            "Reducing workers from {} to {} to fit the file descriptor limit of {}",
            config.workers,
            capped,
            fd_limit
        );
        config = config.with_workers(capped);
    }
    log::debug!("Effective configuration: {:?}", config);

    let show_progress = !matches.get_flag("no-progress") && std::io::stderr().is_terminal();
    let progress = match PortRange::new(start_port, end_port) {
        Ok(range) if show_progress => ProgressDisplay::new(range.len()),
        _ => ProgressDisplay::hidden(),
    };

    let engine = ScanEngine::new(config)
        .context("could not initialise the scanner")?
        .with_progress(progress.callback());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping scan");
            on_interrupt.cancel();
        }
    });

    let result = engine
        .scan_ports_with_cancel(&target, start_port, end_port, cancel)
        .await;
    progress.finish();

    let output = OutputManager::new(OutputConfig {
        format,
        colored: std::io::stdout().is_terminal(),
    });
    output
        .write_results(&result)
        .context("could not write scan results")?;

    Ok(!result.is_error())
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();
    Logger::init(Logger::level_for(matches.get_count("verbose")));

    match run(matches).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_port_defaults() {
        let matches = build_cli().get_matches_from(["portprobe", "-t", "example.com"]);
        assert_eq!(matches.get_one::<u32>("start-port"), Some(&1));
        assert_eq!(matches.get_one::<u32>("end-port"), Some(&65535));
        assert_eq!(matches.get_one::<String>("format").map(String::as_str), Some("json"));
    }

    #[test]
    fn test_flags_override_config() {
        let matches = build_cli().get_matches_from([
            "portprobe",
            "-t",
            "127.0.0.1",
            "--timeout",
            "250",
            "--workers",
            "16",
            "--retries",
            "1",
        ]);
        let config = resolve_config(&matches).unwrap();
        assert_eq!(config.timeout, 250);
        assert_eq!(config.workers, 16);
        assert_eq!(config.retries, 1);
    }

    #[test]
    fn test_target_is_required() {
        assert!(build_cli().try_get_matches_from(["portprobe"]).is_err());
    }
}
