use std::{
    fmt,
    net::{AddrParseError, IpAddr},
    str::FromStr,
};

use thiserror::Error;

/// IP family of a probed address, rendered as the `ip_version` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersion::V4 => "4",
            IpVersion::V6 => "6",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpVersion {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "4" => Ok(IpVersion::V4),
            "6" => Ok(IpVersion::V6),
            other => Err(KeyParseError::IpVersion(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("probe key must have the form \"<host> <ip> <version>\", got {0:?}")]
    Malformed(String),

    #[error("invalid address in probe key: {0}")]
    Address(#[from] AddrParseError),

    #[error("unknown ip version {0:?}")]
    IpVersion(String),

    #[error("ip version {version} does not match address {ip}")]
    VersionMismatch { ip: IpAddr, version: IpVersion },
}

/// Identity of one monitored (hostname, address) pair.
///
/// The serialized form is `"<host> <ip> <version>"`, which is also the name the
/// probing engine sees for the pair. Parsing splits from the right, so the address
/// and version are always recovered even if the hostname itself contains spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeKey {
    host: String,
    ip: IpAddr,
}

impl ProbeKey {
    pub fn new(host: impl Into<String>, ip: IpAddr) -> Self {
        Self { host: host.into(), ip }
    }

    /// Build a key from its three components, rejecting a version that disagrees with
    /// the address family.
    pub fn from_parts(host: &str, ip: &str, version: &str) -> Result<Self, KeyParseError> {
        let ip: IpAddr = ip.parse()?;
        let version: IpVersion = version.parse()?;
        if IpVersion::of(&ip) != version {
            return Err(KeyParseError::VersionMismatch { ip, version });
        }
        Ok(Self::new(host, ip))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn ip_version(&self) -> IpVersion {
        IpVersion::of(&self.ip)
    }

    /// `(target, ip, ip_version)` label values, in label-name order.
    pub fn label_values(&self) -> [String; 3] {
        [self.host.clone(), self.ip.to_string(), self.ip_version().to_string()]
    }
}

impl fmt::Display for ProbeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.host, self.ip, self.ip_version())
    }
}

impl FromStr for ProbeKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, ' ');
        let (Some(version), Some(ip), Some(host)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(KeyParseError::Malformed(s.to_string()));
        };
        if host.is_empty() {
            return Err(KeyParseError::Malformed(s.to_string()));
        }
        Self::from_parts(host, ip, version)
    }
}
