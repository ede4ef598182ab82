//! Connection and split-tunnel state pushed by the VPN engine
//!
//! Field names are camelCase on the wire to match the engine's payloads.

use serde::{Deserialize, Serialize};

/// Addressing facts for one network adapter, captured when it comes up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdapterGatewayInfo {
    pub adapter_name: String,
    pub adapter_ip: String,
    pub gateway_ip: String,
    pub dns_servers: Vec<String>,
    pub if_index: u32,
}

/// VPN protocol the engine connected with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    #[serde(rename = "ikev2")]
    Ikev2,
    #[serde(rename = "openvpn")]
    OpenVpn,
    #[serde(rename = "stunnel_or_wstunnel")]
    StunnelOrWstunnel,
    #[serde(rename = "wireguard")]
    WireGuard,
}

impl Protocol {
    /// Whether the tunnel terminates on a point-to-point adapter with its
    /// own gateway address.
    pub fn has_tunnel_gateway(self) -> bool {
        matches!(self, Protocol::OpenVpn | Protocol::StunnelOrWstunnel)
    }
}

/// Snapshot of the VPN connection, replaced wholesale on every update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub protocol: Protocol,
    pub default_adapter: AdapterGatewayInfo,
    /// Only meaningful while `is_connected` is true
    pub vpn_adapter: AdapterGatewayInfo,
    pub connected_ip: String,
    /// Remote tunnel endpoint (OpenVPN, stunnel and wstunnel)
    pub remote_ip: String,
    pub is_terminate_socket: bool,
    pub is_keep_local_socket: bool,
}

/// Split-tunnel configuration, replaced wholesale on every update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SplitTunnelSettings {
    pub is_active: bool,
    /// `true`: listed entries bypass the tunnel. `false`: only listed entries use it.
    pub is_exclude: bool,
    pub apps: Vec<String>,
    pub ip_ranges: Vec<String>,
    pub hostnames: Vec<String>,
    pub is_allow_lan_traffic: bool,
}

impl SplitTunnelSettings {
    pub fn is_include(&self) -> bool {
        self.is_active && !self.is_exclude
    }
}
