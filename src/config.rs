//! Config module for coursedl

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::download::DEFAULT_MAX_ATTEMPTS;

const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_USER_AGENT: &str = concat!("coursedl/", env!("CARGO_PKG_VERSION"));

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Attempts per item before the whole run is abandoned
    #[clap(
        long,
        env = "COURSEDL_MAX_ATTEMPTS",
        default_value_t = DEFAULT_MAX_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_attempts: u32,

    /// Pause between two attempts of the same item, in milliseconds
    #[clap(long, env = "COURSEDL_RETRY_DELAY_MS", default_value_t = DEFAULT_RETRY_DELAY_MS)]
    pub retry_delay_ms: u64,

    /// Fail an attempt when no data arrives for this many seconds (waits forever when unset)
    #[clap(long, env = "COURSEDL_STALL_TIMEOUT_SECS")]
    pub stall_timeout_secs: Option<u64>,

    #[clap(long, env = "COURSEDL_CONNECT_TIMEOUT_SECS")]
    pub connect_timeout_secs: Option<u64>,

    #[clap(long, env = "COURSEDL_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            stall_timeout_secs: None,
            connect_timeout_secs: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl DownloadOptions {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}

/// Safely determine the default destination root
fn get_default_output_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Parser, Debug, Clone)]
#[clap(name = "coursedl", version, about)]
pub struct Config {
    /// JSON file describing the courses to download
    #[clap(env = "COURSEDL_TREE")]
    pub tree: PathBuf,

    /// Existing directory the course folders are created in
    #[clap(short, long, env = "COURSEDL_OUTPUT_DIR", default_value_os_t = get_default_output_dir())]
    pub output_dir: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[clap(long, env = "COURSEDL_LOG", default_value = "info")]
    pub log_level: String,

    #[clap(flatten)]
    pub download: DownloadOptions,
}

pub fn config() -> Config {
    Config::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_parser() {
        let config = Config::try_parse_from(["coursedl", "tree.json", "-o", "/tmp/courses"]).unwrap();
        assert_eq!(config.tree, PathBuf::from("tree.json"));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/courses"));
        assert_eq!(config.download, DownloadOptions::default());
    }

    #[test]
    fn test_download_flags() {
        let config = Config::try_parse_from([
            "coursedl",
            "tree.json",
            "--max-attempts",
            "5",
            "--retry-delay-ms",
            "0",
            "--stall-timeout-secs",
            "30",
        ])
        .unwrap();

        assert_eq!(config.download.max_attempts, 5);
        assert_eq!(config.download.retry_delay(), Duration::ZERO);
        assert_eq!(config.download.stall_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.download.connect_timeout(), None);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(Config::try_parse_from(["coursedl", "tree.json", "--max-attempts", "0"]).is_err());
    }
}
