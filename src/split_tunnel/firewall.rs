//! Firewall capability used by the helper
//!
//! Rule programming itself belongs to the platform firewall backend; the
//! helper only needs the global on/off switch, the current state, and the
//! split-tunnel awareness toggle.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum FirewallError {
    #[error("Firewall backend failed: {0}")]
    Backend(String),
}

/// Parameters for switching the firewall on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirewallRules {
    /// Server address the engine is currently connecting to
    pub connecting_ip: String,
    /// Semicolon-separated addresses that stay reachable while blocking
    pub allowed_ips: String,
    pub allow_lan_traffic: bool,
    pub is_custom_config: bool,
}

pub trait Firewall: Send + Sync {
    fn set_split_tunneling_enabled(
        &self,
        is_connected: bool,
        is_active: bool,
        is_exclude: bool,
    ) -> Result<(), FirewallError>;
    fn on(&self, rules: &FirewallRules) -> Result<(), FirewallError>;
    fn off(&self) -> Result<(), FirewallError>;
    fn current_status(&self) -> bool;
}

/// Split-tunnel flags last pushed to the firewall
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitTunnelMode {
    pub is_connected: bool,
    pub is_active: bool,
    pub is_exclude: bool,
}

#[derive(Debug, Default)]
struct TrackedState {
    rules: Option<FirewallRules>,
    split_tunnel: SplitTunnelMode,
}

/// In-process firewall that records the requested state
///
/// Used when no platform filter backend is wired in; it keeps the on/off
/// edge semantics the dispatch layer relies on.
#[derive(Debug, Default)]
pub struct TrackingFirewall {
    state: Mutex<TrackedState>,
}

impl TrackingFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> Option<FirewallRules> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rules
            .clone()
    }

    pub fn split_tunnel_mode(&self) -> SplitTunnelMode {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .split_tunnel
    }
}

impl Firewall for TrackingFirewall {
    fn set_split_tunneling_enabled(
        &self,
        is_connected: bool,
        is_active: bool,
        is_exclude: bool,
    ) -> Result<(), FirewallError> {
        debug!(
            "Firewall split tunneling: connected={}, active={}, exclude={}",
            is_connected, is_active, is_exclude
        );
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .split_tunnel = SplitTunnelMode {
            is_connected,
            is_active,
            is_exclude,
        };
        Ok(())
    }

    fn on(&self, rules: &FirewallRules) -> Result<(), FirewallError> {
        info!(
            "Firewall on: allow_lan={}, custom_config={}",
            rules.allow_lan_traffic, rules.is_custom_config
        );
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rules = Some(rules.clone());
        Ok(())
    }

    fn off(&self) -> Result<(), FirewallError> {
        info!("Firewall off");
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rules = None;
        Ok(())
    }

    fn current_status(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rules
            .is_some()
    }
}
