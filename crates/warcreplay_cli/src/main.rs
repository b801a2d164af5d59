//! warcreplay CLI
//!
//! Replays the request records of one or more WARC archives against live
//! servers, optionally through a forward proxy.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use warcreplay_core::{ClientConfig, DEFAULT_CONCURRENCY, ReplayConfig};
use warcreplay_engine::{ReplayRun, open_archives};

#[derive(Parser)]
#[command(name = "warcreplay")]
#[command(about = "Replay the HTTP requests captured in WARC archives", long_about = None)]
struct Cli {
    /// Forward HTTP proxy URL; empty means connect directly
    #[arg(long, default_value = "")]
    proxy: String,

    /// Maximum in-flight requests per archive
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Verify TLS certificates instead of accepting any
    #[arg(long)]
    verify_tls: bool,

    /// Send this User-Agent instead of the captured one
    #[arg(long)]
    user_agent: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Archive files (.warc or .warc.gz)
    #[arg(required = true, num_args = 1..)]
    archives: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn replay_config(&self) -> ReplayConfig {
        let mut client = ClientConfig::new()
            .with_proxy(self.proxy.clone())
            .with_accept_invalid_certs(!self.verify_tls);
        if let Some(timeout_ms) = self.timeout_ms {
            client = client.with_request_timeout(timeout_ms);
        }
        if let Some(agent) = &self.user_agent {
            client = client.with_user_agent(agent.clone());
        }

        ReplayConfig::new()
            .with_concurrency(self.concurrency)
            .with_client(client)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = cli.replay_config();
    tracing::debug!(?config, archives = cli.archives.len(), "starting replay");
    let run = ReplayRun::from_config(&config).wrap_err("invalid configuration")?;
    let archives = open_archives(&cli.archives)?;

    let report = run.run(archives).await;

    if report.is_clean() {
        return Ok(());
    }

    let total = report.archives.len();
    let failures = report.into_failures();
    Err(eyre!(
        "{} of {} archives aborted: {}",
        failures.len(),
        total,
        failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["warcreplay", "a.warc.gz"]).unwrap();
        let config = cli.replay_config();
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.client.proxy(), None);
        assert!(config.client.accept_invalid_certs);
        assert_eq!(config.client.request_timeout_ms, None);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_requires_an_archive() {
        assert!(Cli::try_parse_from(["warcreplay"]).is_err());
        assert!(Cli::try_parse_from(["warcreplay", "--proxy", "http://p:3128"]).is_err());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "warcreplay",
            "--proxy",
            "http://127.0.0.1:3128",
            "-c",
            "2",
            "--timeout-ms",
            "500",
            "--verify-tls",
            "--log-format",
            "json",
            "a.warc",
            "b.warc",
        ])
        .unwrap();
        let config = cli.replay_config();

        assert_eq!(cli.archives.len(), 2);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.client.proxy(), Some("http://127.0.0.1:3128"));
        assert_eq!(config.client.request_timeout_ms, Some(500));
        assert!(!config.client.accept_invalid_certs);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_cli_bad_proxy_fails_validation() {
        let cli = Cli::try_parse_from(["warcreplay", "--proxy", "::bad::", "a.warc"]).unwrap();
        assert!(cli.replay_config().validate().is_err());
    }

    #[test]
    fn test_cli_zero_concurrency_fails_validation() {
        let cli = Cli::try_parse_from(["warcreplay", "-c", "0", "a.warc"]).unwrap();
        assert!(cli.replay_config().validate().is_err());
    }
}
