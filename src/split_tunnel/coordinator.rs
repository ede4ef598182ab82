//! Network-state coordinator
//!
//! Owns the current [`ConnectionStatus`] and [`SplitTunnelSettings`] and
//! reconciles firewall, routing and exception state from them. Both inputs are
//! replaced wholesale; every reconciliation starts from scratch, so running it
//! again with the same inputs pushes the same state again.
//!
//! One lock covers the inputs and the whole reconciliation, including
//! hostname resolution inside [`ExceptionManager::enable`].

use crate::model::{ConnectionStatus, SplitTunnelSettings};
use crate::split_tunnel::exceptions::ExceptionManager;
use crate::split_tunnel::firewall::Firewall;
use crate::split_tunnel::routing_policy::RoutingPolicy;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

struct EngineState {
    connection: Arc<ConnectionStatus>,
    settings: Arc<SplitTunnelSettings>,
    exceptions: ExceptionManager,
}

pub struct Coordinator {
    state: Mutex<EngineState>,
    firewall: Arc<dyn Firewall>,
    routing: Arc<dyn RoutingPolicy>,
    diagnostic_hostname: String,
}

/// Next hop for exception traffic, or `None` when exceptions must be off
///
/// Exclude mode always leaves through the physical default gateway. Include
/// mode points at the VPN side: the tunnel gateway for OpenVPN and
/// stunnel/wstunnel, the adapter's own address for IKEv2 and WireGuard.
pub fn reference_address<'a>(
    connection: &'a ConnectionStatus,
    settings: &SplitTunnelSettings,
) -> Option<&'a str> {
    if !connection.is_connected || !settings.is_active {
        return None;
    }

    let address = if settings.is_exclude {
        &connection.default_adapter.gateway_ip
    } else if connection.protocol.has_tunnel_gateway() {
        &connection.vpn_adapter.gateway_ip
    } else {
        // IKEv2 and WireGuard adapters have no separate tunnel gateway
        &connection.vpn_adapter.adapter_ip
    };
    Some(address.as_str())
}

impl Coordinator {
    pub fn new(
        exceptions: ExceptionManager,
        firewall: Arc<dyn Firewall>,
        routing: Arc<dyn RoutingPolicy>,
        diagnostic_hostname: impl Into<String>,
    ) -> Self {
        Self {
            state: Mutex::new(EngineState {
                connection: Arc::new(ConnectionStatus::default()),
                settings: Arc::new(SplitTunnelSettings::default()),
                exceptions,
            }),
            firewall,
            routing,
            diagnostic_hostname: diagnostic_hostname.into(),
        }
    }

    // A collaborator that panicked mid-reconciliation must not wedge later commands
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_connect_params(&self, status: ConnectionStatus) {
        let mut state = self.lock();
        debug!(
            "Connect params: connected={}, protocol={:?}",
            status.is_connected, status.protocol
        );

        state.connection = Arc::new(status);
        self.update_routing(&state);
        self.reconcile(&mut state);
    }

    pub fn set_split_tunneling_params(&self, settings: SplitTunnelSettings) {
        let mut state = self.lock();
        debug!(
            "Split tunneling params: active={}, exclude={}",
            settings.is_active, settings.is_exclude
        );

        let mut hostnames = settings.hostnames.clone();
        if settings.is_include() {
            // Tunnel test endpoint must resolve before the set is reported live
            hostnames.push(self.diagnostic_hostname.clone());
        }
        state
            .exceptions
            .set_settings(&settings.ip_ranges, &hostnames);

        state.settings = Arc::new(settings);
        self.update_routing(&state);
        self.reconcile(&mut state);
    }

    /// Re-derive firewall and exception state from the stored inputs
    pub fn update_state(&self) {
        let mut state = self.lock();
        self.reconcile(&mut state);
    }

    pub fn connection(&self) -> Arc<ConnectionStatus> {
        self.lock().connection.clone()
    }

    pub fn settings(&self) -> Arc<SplitTunnelSettings> {
        self.lock().settings.clone()
    }

    /// Hostnames the exception manager resolves on the next enable
    pub fn working_hostnames(&self) -> BTreeSet<String> {
        self.lock().exceptions.hostnames().clone()
    }

    pub fn exceptions_enabled(&self) -> bool {
        self.lock().exceptions.is_enabled()
    }

    fn update_routing(&self, state: &EngineState) {
        if let Err(e) = self.routing.update_state(
            &state.connection,
            state.settings.is_active,
            state.settings.is_exclude,
        ) {
            warn!("Routing policy update failed: {}", e);
        }
    }

    fn reconcile(&self, state: &mut EngineState) {
        let connection = state.connection.clone();
        let settings = state.settings.clone();

        if let Err(e) = self.firewall.set_split_tunneling_enabled(
            connection.is_connected,
            settings.is_active,
            settings.is_exclude,
        ) {
            warn!("Firewall split tunneling update failed: {}", e);
        }

        match reference_address(&connection, &settings) {
            Some(reference) => {
                info!(
                    "Split tunnel {} mode, protocol={:?}, reference={}",
                    if settings.is_exclude { "exclude" } else { "include" },
                    connection.protocol,
                    reference
                );
                if let Err(e) = state.exceptions.enable(reference) {
                    warn!("Failed to enable split tunnel exceptions: {}", e);
                }
            }
            None => {
                debug!(
                    "Split tunnel exceptions off: connected={}, active={}",
                    connection.is_connected, settings.is_active
                );
                if let Err(e) = state.exceptions.disable() {
                    warn!("Failed to disable split tunnel exceptions: {}", e);
                }
            }
        }
    }
}
