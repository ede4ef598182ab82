//! Routing policy updates that follow the connection state
//!
//! The coordinator calls [`RoutingPolicy::update_state`] on every input change
//! before it reconciles exceptions.

use crate::model::ConnectionStatus;
use crate::platform::{PlatformError, RouteTable};
use ipnet::IpNet;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

pub trait RoutingPolicy: Send + Sync {
    fn update_state(
        &self,
        status: &ConnectionStatus,
        is_active: bool,
        is_exclude: bool,
    ) -> Result<(), PlatformError>;
}

/// Keeps the tunnel transport's own endpoint off the tunnel
///
/// For protocols that carry traffic to a remote endpoint (OpenVPN, stunnel,
/// wstunnel) a host route for `remote_ip` is pinned via the physical default
/// gateway while connected, and removed on disconnect.
pub struct RemoteEndpointPolicy {
    table: Box<dyn RouteTable>,
    pinned: Mutex<Option<(IpNet, IpAddr)>>,
}

impl RemoteEndpointPolicy {
    pub fn new(table: Box<dyn RouteTable>) -> Self {
        Self {
            table,
            pinned: Mutex::new(None),
        }
    }

    pub fn pinned(&self) -> Option<IpNet> {
        self.pinned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|(destination, _)| destination)
    }
}

/// The route the current status calls for, if any
fn desired_route(status: &ConnectionStatus) -> Option<(IpNet, IpAddr)> {
    if !status.is_connected || !status.protocol.has_tunnel_gateway() {
        return None;
    }

    let remote: IpAddr = status.remote_ip.trim().parse().ok()?;
    let gateway: IpAddr = status.default_adapter.gateway_ip.trim().parse().ok()?;
    Some((IpNet::from(remote), gateway))
}

impl RoutingPolicy for RemoteEndpointPolicy {
    fn update_state(
        &self,
        status: &ConnectionStatus,
        is_active: bool,
        is_exclude: bool,
    ) -> Result<(), PlatformError> {
        debug!(
            "Routing policy update: connected={}, protocol={:?}, split_active={}, exclude={}",
            status.is_connected, status.protocol, is_active, is_exclude
        );

        let mut pinned = self.pinned.lock().unwrap_or_else(PoisonError::into_inner);
        let desired = desired_route(status);

        if let Some((current, via)) = *pinned {
            if desired != Some((current, via)) {
                match self.table.delete_route(&current, via) {
                    Ok(()) => info!("Removed endpoint route {}", current),
                    Err(e) => warn!(
                        "Failed to remove endpoint route {}: {} (continuing)",
                        current, e
                    ),
                }
                *pinned = None;
            }
        }

        if let Some((destination, gateway)) = desired {
            self.table.add_route(&destination, gateway)?;
            if pinned.is_none() {
                info!("Pinned endpoint route {} via {}", destination, gateway);
            }
            *pinned = Some((destination, gateway));
        }

        Ok(())
    }
}
