/// file: src/config.rs
/// description: Configuration management for REST, push-channel and feed settings
use crate::cli::Args;
use crate::formatter::OutputFormat;
use anyhow::{Result, anyhow, bail};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub channel: ChannelConfig,
    pub feed: FeedConfig,
    pub credentials: CredentialConfig,
    pub metrics: MetricsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: Url,
    pub reconnect_delay: Duration,
    pub max_reconnects: u32,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub alert_dwell: Duration,
}

#[derive(Debug, Clone)]
pub struct CredentialConfig {
    pub path: PathBuf,
    pub ttl: chrono::Duration,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub colored: bool,
}

pub const MAX_CREDENTIAL_TTL_HOURS: u64 = 24 * 365;
pub const MAX_RECONNECT_DELAY_SECS: u64 = 3600;

fn credential_ttl(hours: u64) -> Result<chrono::Duration> {
    if hours > MAX_CREDENTIAL_TTL_HOURS {
        bail!("--credential-ttl-hours must be at most {MAX_CREDENTIAL_TTL_HOURS}, got {hours}");
    }
    let hours = i64::try_from(hours)?;
    chrono::Duration::try_hours(hours).ok_or_else(|| anyhow!("credential TTL of {hours}h is out of range"))
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let credential_path = match &args.credentials_file {
            Some(path) => PathBuf::from(path),
            None => default_credential_path(),
        };

        if args.reconnect_delay > MAX_RECONNECT_DELAY_SECS {
            bail!(
                "--reconnect-delay must be at most {MAX_RECONNECT_DELAY_SECS}s, got {}",
                args.reconnect_delay
            );
        }

        Ok(Config {
            api: ApiConfig {
                base_url: Url::parse(&args.api_url)?,
                timeout: Duration::from_secs(args.timeout),
            },
            channel: ChannelConfig {
                url: Url::parse(&args.socket_url)?,
                reconnect_delay: Duration::from_secs(args.reconnect_delay),
                max_reconnects: args.max_reconnects,
            },
            feed: FeedConfig {
                alert_dwell: Duration::from_secs(args.alert_dwell),
            },
            credentials: CredentialConfig {
                path: credential_path,
                ttl: credential_ttl(args.credential_ttl_hours)?,
            },
            metrics: MetricsConfig {
                enabled: args.metrics,
                port: args.metrics_port,
            },
            output: OutputConfig {
                format: OutputFormat::from(args.format.as_str()),
                colored: !args.no_color,
            },
        })
    }
}

fn default_credential_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".task-master")
            .join("credentials.json"),
        None => PathBuf::from(".task-master-credentials.json"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn builds_from_cli_flags() {
        let args = Args::parse_from([
            "task-master",
            "--api-url",
            "http://api.test/api",
            "--socket-url",
            "ws://push.test",
            "--credentials-file",
            "/tmp/creds.json",
            "--alert-dwell",
            "3",
            "--no-color",
            "whoami",
        ]);
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.api.base_url.as_str(), "http://api.test/api");
        assert_eq!(config.channel.url.as_str(), "ws://push.test/");
        assert_eq!(config.feed.alert_dwell, Duration::from_secs(3));
        assert_eq!(config.credentials.path, PathBuf::from("/tmp/creds.json"));
        assert_eq!(config.credentials.ttl, chrono::Duration::hours(24));
        assert!(!config.output.colored);
    }

    #[test]
    fn rejects_malformed_urls() {
        let args = Args::parse_from(["task-master", "--api-url", "not a url", "whoami"]);
        assert!(Config::from_args(&args).is_err());
    }

    #[test]
    fn rejects_out_of_range_ttl() {
        let args = Args::try_parse_from([
            "task-master",
            "--credential-ttl-hours",
            "9999999999999999",
            "whoami",
        ])
        .unwrap();
        let err = Config::from_args(&args).unwrap_err();
        assert!(err.to_string().contains("--credential-ttl-hours"));

        let args = Args::parse_from(["task-master", "--credential-ttl-hours", "8760", "whoami"]);
        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.credentials.ttl, chrono::Duration::days(365));
    }

    #[test]
    fn rejects_out_of_range_reconnect_delay() {
        let args = Args::parse_from([
            "task-master",
            "--reconnect-delay",
            "18446744073709551615",
            "whoami",
        ]);
        assert!(Config::from_args(&args).is_err());
    }
}
