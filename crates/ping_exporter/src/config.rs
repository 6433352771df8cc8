use std::{
    fmt, fs, io,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::probe::ProbeOptions;

pub const DEFAULT_LISTEN_ADDRESS: &str = ":9427";
pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";
const DNS_PORT: u16 = 53;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("ping.history-size must be greater than 0")]
    HistorySize,

    #[error("{0} must be greater than 0")]
    ZeroDuration(&'static str),

    #[error("invalid log level {0:?}, valid levels: [debug, info, warn, error, fatal]")]
    LogLevel(String),

    #[error("invalid nameserver {0:?}, expected an IP address with optional port")]
    Nameserver(String),

    #[error("invalid listen address {0:?}")]
    ListenAddress(String),
}

/// Effective exporter configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub targets: Vec<String>,
    pub web: Web,
    pub ping: Ping,
    pub dns: Dns,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Web {
    pub listen_address: SocketAddr,
    pub telemetry_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ping {
    pub interval: Duration,
    pub timeout: Duration,
    pub history_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dns {
    /// Zero disables refreshing.
    pub refresh: Duration,
    pub nameserver: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            web: Web {
                listen_address: SocketAddr::from(([0, 0, 0, 0], 9427)),
                telemetry_path: DEFAULT_TELEMETRY_PATH.into(),
            },
            ping: Ping {
                interval: Duration::from_secs(5),
                timeout: Duration::from_secs(4),
                history_size: 10,
            },
            dns: Dns { refresh: Duration::from_secs(60), nameserver: None },
            log_level: "info".into(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Exporter Configuration:")?;
        write_title_1(f, "Web")?;
        write_1(f, "Listen Address", &self.web.listen_address)?;
        write_1(f, "Telemetry Path", &self.web.telemetry_path)?;
        write_title_1(f, "Ping")?;
        write_1(f, "Interval", &humantime::format_duration(self.ping.interval))?;
        write_1(f, "Timeout", &humantime::format_duration(self.ping.timeout))?;
        write_1(f, "History Size", &self.ping.history_size)?;
        write_title_1(f, "DNS")?;
        write_1(f, "Refresh", &humantime::format_duration(self.dns.refresh))?;
        match &self.dns.nameserver {
            Some(nameserver) => write_1(f, "Nameserver", nameserver)?,
            None => write_1(f, "Nameserver", &"system")?,
        }
        write_title_1(f, "Targets")?;
        for target in &self.targets {
            write_1(f, "-", target)?;
        }

        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping.history_size < 1 {
            return Err(ConfigError::HistorySize);
        }
        if self.ping.interval.is_zero() {
            return Err(ConfigError::ZeroDuration("ping.interval"));
        }
        if self.ping.timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("ping.timeout"));
        }
        self.log_filter()?;
        Ok(())
    }

    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            interval: self.ping.interval,
            timeout: self.ping.timeout,
            history_size: self.ping.history_size,
        }
    }

    /// `fatal` is accepted for compatibility and maps to `error`.
    pub fn log_filter(&self) -> Result<LevelFilter, ConfigError> {
        match self.log_level.to_ascii_lowercase().as_str() {
            "debug" => Ok(LevelFilter::DEBUG),
            "info" => Ok(LevelFilter::INFO),
            "warn" => Ok(LevelFilter::WARN),
            "error" | "fatal" => Ok(LevelFilter::ERROR),
            _ => Err(ConfigError::LogLevel(self.log_level.clone())),
        }
    }
}

/// Targets file, e.g.
///
/// ```toml
/// targets = ["example.com", "192.0.2.1"]
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct TargetsFile {
    #[serde(default)]
    pub targets: Vec<String>,
}

impl TargetsFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }
}

/// `ip` or `ip:port`; the port defaults to 53.
pub fn parse_nameserver(raw: &str) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    raw.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| ConfigError::Nameserver(raw.to_string()))
}

/// Accepts a bare `:port` to listen on all IPv4 interfaces.
pub fn parse_listen_address(raw: &str) -> Result<SocketAddr, ConfigError> {
    let candidate = match raw.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => raw.to_string(),
    };
    candidate.parse().map_err(|_| ConfigError::ListenAddress(raw.to_string()))
}

fn listen_address_arg(raw: &str) -> Result<SocketAddr, String> {
    parse_listen_address(raw).map_err(|e| e.to_string())
}

/// Command line flags.
#[derive(Debug, Clone, Parser)]
#[command(name = "ping_exporter", version, about = "Prometheus exporter for ICMP echo statistics")]
pub struct Args {
    /// Address on which to expose metrics and web interface
    #[arg(long = "web.listen-address", default_value = DEFAULT_LISTEN_ADDRESS, value_parser = listen_address_arg)]
    pub listen_address: SocketAddr,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", default_value = DEFAULT_TELEMETRY_PATH)]
    pub telemetry_path: String,

    /// Path to a TOML file listing targets; replaces positional targets
    #[arg(long = "config.path")]
    pub config_path: Option<PathBuf>,

    /// Interval for ICMP echo requests
    #[arg(long = "ping.interval", default_value = "5s", value_parser = humantime::parse_duration)]
    pub ping_interval: Duration,

    /// Timeout for ICMP echo request
    #[arg(long = "ping.timeout", default_value = "4s", value_parser = humantime::parse_duration)]
    pub ping_timeout: Duration,

    /// Number of results to remember per target
    #[arg(long = "ping.history-size", default_value_t = 10)]
    pub history_size: usize,

    /// Interval for refreshing DNS records and updating targets accordingly (0 if disabled)
    #[arg(long = "dns.refresh", default_value = "1m", value_parser = humantime::parse_duration)]
    pub dns_refresh: Duration,

    /// DNS server used to resolve hostname of targets
    #[arg(long = "dns.nameserver")]
    pub dns_nameserver: Option<String>,

    /// Only log messages with the given severity or above
    #[arg(long = "log.level", default_value = "info")]
    pub log_level: String,

    /// A list of targets to ping
    pub targets: Vec<String>,
}

impl Args {
    /// Resolve flags and the optional targets file into a validated [`Config`].
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let targets = match &self.config_path {
            Some(path) => TargetsFile::load(path)?.targets,
            None => self.targets,
        };

        let nameserver = match self.dns_nameserver.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_nameserver(raw)?),
        };

        let config = Config {
            targets,
            web: Web { listen_address: self.listen_address, telemetry_path: self.telemetry_path },
            ping: Ping {
                interval: self.ping_interval,
                timeout: self.ping_timeout,
                history_size: self.history_size,
            },
            dns: Dns { refresh: self.dns_refresh, nameserver },
            log_level: self.log_level,
        };

        config.validate()?;
        Ok(config)
    }
}
