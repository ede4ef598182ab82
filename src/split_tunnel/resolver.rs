//! Hostname resolution for split-tunnel exceptions
//!
//! Lookups are blocking from the caller's point of view and bounded by the
//! configured timeout, so the exception set is final by the time `enable`
//! returns.

use crate::config::DnsConfig;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DnsError {
    #[error("Resolver setup failed: {0}")]
    SetupFailed(String),
    #[error("DNS resolution failed for {host}: {message}")]
    LookupFailed { host: String, message: String },
    #[error("No IP addresses found for host: {0}")]
    NoAddressFound(String),
    #[error("DNS resolution timed out for {0}")]
    Timeout(String),
}

/// Resolves a hostname to every address it currently maps to
pub trait HostResolver: Send + Sync {
    fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError>;
}

/// System-configured DNS resolver with a hard per-lookup budget
///
/// `resolve` drives the lookup on the runtime it was created in, so it must be
/// called from a blocking context (for example inside `spawn_blocking`), never
/// from an async task.
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
    handle: Handle,
    budget: Duration,
}

impl DnsResolver {
    /// Create a resolver bound to the current tokio runtime
    pub fn new(config: &DnsConfig) -> Result<Self, DnsError> {
        let handle = Handle::try_current().map_err(|e| DnsError::SetupFailed(e.to_string()))?;

        let (resolver_config, mut opts) = match hickory_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                warn!("Failed to read system DNS config: {}, using defaults", e);
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = config.timeout();
        opts.attempts = config.attempts.max(1);

        let budget = lookup_budget(config);
        info!(
            "DNS resolver ready: timeout={:?}, attempts={}, budget={:?}",
            opts.timeout, opts.attempts, budget
        );

        Ok(Self {
            resolver: TokioAsyncResolver::tokio(resolver_config, opts),
            handle,
            budget,
        })
    }
}

/// Upper bound for one hostname, whatever the resolver does internally
fn lookup_budget(config: &DnsConfig) -> Duration {
    config.timeout() * config.attempts.max(1) as u32
}

impl HostResolver for DnsResolver {
    fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError> {
        debug!("Resolving {}", hostname);

        let lookup = self
            .handle
            .block_on(async { tokio::time::timeout(self.budget, self.resolver.lookup_ip(hostname)).await })
            .map_err(|_| DnsError::Timeout(hostname.to_string()))?
            .map_err(|e| DnsError::LookupFailed {
                host: hostname.to_string(),
                message: e.to_string(),
            })?;

        let addresses: Vec<IpAddr> = lookup.iter().collect();
        if addresses.is_empty() {
            return Err(DnsError::NoAddressFound(hostname.to_string()));
        }

        info!("Resolved {} -> {:?}", hostname, addresses);
        Ok(addresses)
    }
}
