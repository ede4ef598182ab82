//! VPN helper - privileged split-tunnel coordinator for a VPN client
//!
//! The unprivileged VPN engine talks to this helper over a local socket. The
//! helper keeps the latest connection status and split-tunnel settings and
//! reconciles the routing exceptions and firewall mode whenever either
//! changes.
//!
//! # Architecture
//!
//! - `config`: Configuration file handling (TOML)
//! - `model`: Connection status and split-tunnel settings
//! - `platform`: Cross-platform route table (macOS, Linux, Windows)
//! - `split_tunnel`: Coordinator, exception manager and their collaborators
//! - `protocol`: Request/response framing and command identifiers
//! - `dispatch`: Command execution against the coordinator and firewall
//! - `server` / `client`: Local socket transport
//!
//! # Usage
//!
//! ```bash
//! sudo vpn-helper serve --config /etc/vpn-helper.toml
//! vpn-helper firewall-state
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod model;
pub mod platform;
pub mod protocol;
pub mod server;
pub mod split_tunnel;

pub use config::HelperConfig;
pub use dispatch::{Dispatcher, SplitTunnelSnapshot};
pub use model::{AdapterGatewayInfo, ConnectionStatus, Protocol, SplitTunnelSettings};
pub use server::{HelperServer, ServerError};
pub use split_tunnel::Coordinator;
