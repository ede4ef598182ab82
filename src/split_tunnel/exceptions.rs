//! Hostname/IP exception manager
//!
//! Holds the literal address ranges and hostnames that split tunneling treats
//! specially, resolves them on `enable`, and pushes the complete result to an
//! [`ExceptionSink`] together with the reference address. Every push replaces
//! the previous one; nothing is merged.

use crate::platform::{PlatformError, RouteTable};
use crate::split_tunnel::resolver::HostResolver;
use ipnet::IpNet;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Resolved exception destinations
pub type ExceptionSet = BTreeSet<IpNet>;

#[derive(Error, Debug)]
pub enum ExceptionError {
    #[error("Invalid reference address: {0:?}")]
    InvalidReferenceAddress(String),
    #[error("Platform error: {0}")]
    PlatformError(#[from] PlatformError),
}

/// Where a resolved exception set ends up (routes, firewall exceptions)
pub trait ExceptionSink: Send + Sync {
    /// Replace whatever was applied before with `exceptions` via `reference`
    fn apply(&self, exceptions: &ExceptionSet, reference: &str) -> Result<(), ExceptionError>;
    /// Remove everything applied so far. Must be a no-op when nothing is applied.
    fn clear(&self) -> Result<(), ExceptionError>;
}

pub struct ExceptionManager {
    resolver: Arc<dyn HostResolver>,
    sink: Box<dyn ExceptionSink>,
    ip_ranges: BTreeSet<String>,
    hostnames: BTreeSet<String>,
    enabled: bool,
}

impl ExceptionManager {
    pub fn new(resolver: Arc<dyn HostResolver>, sink: Box<dyn ExceptionSink>) -> Self {
        Self {
            resolver,
            sink,
            ip_ranges: BTreeSet::new(),
            hostnames: BTreeSet::new(),
            enabled: false,
        }
    }

    /// Store the literal ranges and hostnames used by the next `enable`
    pub fn set_settings(&mut self, ip_ranges: &[String], hostnames: &[String]) {
        self.ip_ranges = ip_ranges
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self.hostnames = hostnames
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        debug!(
            "Exception settings: {} ranges, {} hostnames",
            self.ip_ranges.len(),
            self.hostnames.len()
        );
    }

    pub fn ip_ranges(&self) -> &BTreeSet<String> {
        &self.ip_ranges
    }

    pub fn hostnames(&self) -> &BTreeSet<String> {
        &self.hostnames
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resolve hostnames and union them with the literal ranges
    ///
    /// Hostnames that fail to resolve and ranges that fail to parse are
    /// dropped with a warning.
    pub fn build_exception_set(&self) -> ExceptionSet {
        let mut set: ExceptionSet = self
            .ip_ranges
            .iter()
            .filter_map(|range| {
                let parsed = parse_ip_range(range);
                if parsed.is_none() {
                    warn!("Ignoring invalid split-tunnel address: {}", range);
                }
                parsed
            })
            .collect();

        for hostname in &self.hostnames {
            match self.resolver.resolve(hostname) {
                Ok(addresses) => set.extend(addresses.into_iter().map(IpNet::from)),
                Err(e) => warn!("Dropping split-tunnel host {}: {}", hostname, e),
            }
        }

        set
    }

    /// Push the current exception set via `reference`
    ///
    /// Only destinations in the reference address's family are pushed. An
    /// unusable reference clears whatever was pushed before.
    pub fn enable(&mut self, reference: &str) -> Result<(), ExceptionError> {
        let Ok(next_hop) = reference.trim().parse::<IpAddr>() else {
            warn!("Reference address {:?} is not an IP, clearing exceptions", reference);
            self.disable()?;
            return Err(ExceptionError::InvalidReferenceAddress(reference.to_string()));
        };

        let mut exceptions = self.build_exception_set();
        let total = exceptions.len();
        exceptions.retain(|destination| destination.addr().is_ipv4() == next_hop.is_ipv4());
        if exceptions.len() < total {
            debug!(
                "Skipping {} exceptions in the other address family than {}",
                total - exceptions.len(),
                next_hop
            );
        }

        info!(
            "Enabling {} split-tunnel exceptions via {}",
            exceptions.len(),
            reference
        );

        let pushed = self.sink.apply(&exceptions, reference);
        self.enabled = pushed.is_ok();
        pushed
    }

    pub fn disable(&mut self) -> Result<(), ExceptionError> {
        if self.enabled {
            info!("Disabling split-tunnel exceptions");
        }
        self.enabled = false;
        self.sink.clear()
    }
}

/// Parse a single address or a CIDR range, dropping any host bits
pub fn parse_ip_range(value: &str) -> Option<IpNet> {
    let value = value.trim();
    value
        .parse::<IpNet>()
        .ok()
        .map(|net| net.trunc())
        .or_else(|| value.parse::<IpAddr>().ok().map(IpNet::from))
}

/// Exception sink that routes every exception via the reference address
///
/// Remembers the routes it installed so a later push or `clear` removes
/// exactly those.
pub struct RouteExceptionSink {
    table: Box<dyn RouteTable>,
    installed: Mutex<Vec<(IpNet, IpAddr)>>,
}

impl RouteExceptionSink {
    pub fn new(table: Box<dyn RouteTable>) -> Self {
        Self {
            table,
            installed: Mutex::new(Vec::new()),
        }
    }

    pub fn installed(&self) -> Vec<IpNet> {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(destination, _)| *destination)
            .collect()
    }

    fn remove_installed(&self, installed: &mut Vec<(IpNet, IpAddr)>) {
        for (destination, next_hop) in installed.drain(..) {
            match self.table.delete_route(&destination, next_hop) {
                Ok(()) => debug!("Removed exception route: {}", destination),
                Err(e) => warn!(
                    "Failed to remove exception route {}: {} (continuing)",
                    destination, e
                ),
            }
        }
    }
}

impl ExceptionSink for RouteExceptionSink {
    fn apply(&self, exceptions: &ExceptionSet, reference: &str) -> Result<(), ExceptionError> {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove_installed(&mut installed);

        let next_hop: IpAddr = reference
            .trim()
            .parse()
            .map_err(|_| ExceptionError::InvalidReferenceAddress(reference.to_string()))?;

        for destination in exceptions {
            match self.table.add_route(destination, next_hop) {
                Ok(()) => {
                    debug!("Added exception route: {} via {}", destination, next_hop);
                    installed.push((*destination, next_hop));
                }
                Err(e) => {
                    // Log but continue - one bad route must not drop the rest
                    warn!("Failed to add exception route {}: {}", destination, e);
                }
            }
        }

        info!("{} exception routes active via {}", installed.len(), next_hop);
        Ok(())
    }

    fn clear(&self) -> Result<(), ExceptionError> {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove_installed(&mut installed);
        Ok(())
    }
}
