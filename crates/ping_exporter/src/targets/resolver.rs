use std::{
    error::Error as StdError,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use async_trait::async_trait;
use hickory_resolver::{
    TokioAsyncResolver,
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("failed to resolve {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{host} resolved to no addresses")]
    NoAddresses { host: String },

    #[error("resolving {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },
}

/// Hostname to address lookup.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ResolutionError>;
}

/// The operating system's resolver (getaddrinfo through tokio's blocking pool).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ResolutionError> {
        let addrs = tokio::net::lookup_host((host, 0)).await.map_err(|e| {
            ResolutionError::Lookup { host: host.to_string(), source: Box::new(e) }
        })?;

        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Queries one specific DNS server over UDP/TCP, bypassing the system configuration.
pub struct NameserverResolver {
    nameserver: SocketAddr,
    inner: TokioAsyncResolver,
}

impl NameserverResolver {
    pub fn new(nameserver: SocketAddr, timeout: Duration) -> Self {
        let group = NameServerConfigGroup::from_ips_clear(&[nameserver.ip()], nameserver.port(), true);
        let config = ResolverConfig::from_parts(None, Vec::new(), group);

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;

        Self { nameserver, inner: TokioAsyncResolver::tokio(config, opts) }
    }

    pub fn nameserver(&self) -> SocketAddr {
        self.nameserver
    }
}

#[async_trait]
impl Resolve for NameserverResolver {
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, ResolutionError> {
        let lookup = self.inner.lookup_ip(host).await.map_err(|e| ResolutionError::Lookup {
            host: host.to_string(),
            source: Box::new(e),
        })?;

        Ok(lookup.iter().collect())
    }
}
