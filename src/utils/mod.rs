//! Utility modules for the scanner

pub mod config;

/// Logging utilities
pub struct Logger;

impl Logger {
    /// Initialize logging; `RUST_LOG` still wins over `level` when set
    pub fn init(level: log::LevelFilter) {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(level).format_timestamp_secs();
        if let Ok(spec) = std::env::var("RUST_LOG") {
            builder.parse_filters(&spec);
        }
        // a second init (tests, embedding) keeps the first logger
        let _ = builder.try_init();
    }

    /// Map a `-v` count to a level filter
    pub fn level_for(verbosity: u8) -> log::LevelFilter {
        match verbosity {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

/// File descriptor limit helpers; every worker holds a socket while probing
pub struct FdLimit;

impl FdLimit {
    /// Raise the soft `RLIMIT_NOFILE` to `limit` and return the limit now in effect
    #[cfg(unix)]
    pub fn raise(limit: Option<u64>) -> u64 {
        use rlimit::Resource;

        if let Some(limit) = limit {
            match Resource::NOFILE.set(limit, limit) {
                Ok(()) => log::info!("Raised file descriptor limit to {}", limit),
                Err(e) => log::warn!("Failed to raise file descriptor limit to {}: {}", limit, e),
            }
        }

        match Resource::NOFILE.get() {
            Ok((soft, _)) => soft,
            Err(e) => {
                log::warn!("Could not read file descriptor limit: {}", e);
                65535
            }
        }
    }

    #[cfg(not(unix))]
    pub fn raise(_limit: Option<u64>) -> u64 {
        65535
    }

    /// Workers that fit under `fd_limit`, leaving headroom for the process itself
    pub fn cap_workers(workers: usize, fd_limit: u64) -> usize {
        let headroom = 100;
        let usable = fd_limit.saturating_sub(headroom).max(1);
        workers.min(usize::try_from(usable).unwrap_or(usize::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        assert_eq!(Logger::level_for(0), log::LevelFilter::Warn);
        assert_eq!(Logger::level_for(2), log::LevelFilter::Debug);
        assert_eq!(Logger::level_for(9), log::LevelFilter::Trace);
    }

    #[test]
    fn test_cap_workers_respects_fd_limit() {
        assert_eq!(FdLimit::cap_workers(5000, 1024), 924);
        assert_eq!(FdLimit::cap_workers(50, 1024), 50);
        assert_eq!(FdLimit::cap_workers(5000, 10), 1);
    }
}
