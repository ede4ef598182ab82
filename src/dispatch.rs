//! Command dispatch
//!
//! Maps a raw command identifier and payload to a typed [`Command`], runs it,
//! and always answers with a [`CommandResult`]. Unknown identifiers and bad
//! payloads produce a failure result and leave helper state untouched.

use crate::model::SplitTunnelSettings;
use crate::protocol::{Command, CommandId, CommandResult};
use crate::split_tunnel::{Coordinator, Firewall, FirewallRules};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

/// Split-tunnel parameters latched for process-wide consumers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitTunnelSnapshot {
    pub is_enabled: bool,
    pub is_exclude: bool,
    pub apps: Vec<String>,
    pub is_vpn_connected: bool,
}

pub struct Dispatcher {
    coordinator: Arc<Coordinator>,
    firewall: Arc<dyn Firewall>,
    snapshot: Mutex<SplitTunnelSnapshot>,
}

impl Dispatcher {
    pub fn new(coordinator: Arc<Coordinator>, firewall: Arc<dyn Firewall>) -> Self {
        Self {
            coordinator,
            firewall,
            snapshot: Mutex::new(SplitTunnelSnapshot::default()),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn split_tunnel_snapshot(&self) -> SplitTunnelSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Handle one raw request
    pub fn dispatch(&self, command_id: u32, payload: &[u8]) -> CommandResult {
        let id = match CommandId::try_from(command_id) {
            Ok(id) => id,
            Err(e) => {
                warn!("{}", e);
                return CommandResult::failure();
            }
        };

        match Command::decode(id, payload) {
            Ok(command) => self.execute(command),
            Err(e) => {
                error!("Malformed payload for {}: {}", id, e);
                CommandResult::failure()
            }
        }
    }

    pub fn execute(&self, command: Command) -> CommandResult {
        info!("Command: {}", command.id());

        match command {
            Command::GetHelperVersion => {
                CommandResult::ok().with_additional_string(env!("CARGO_PKG_VERSION"))
            }
            Command::SetSplitTunnelingSettings(settings) => self.split_tunneling_settings(settings),
            Command::SendConnectStatus(status) => {
                info!("Connect status: connected={}", status.is_connected);
                let is_connected = status.is_connected;
                self.coordinator.set_connect_params(status);
                self.latch(|snapshot| snapshot.is_vpn_connected = is_connected);
                CommandResult::ok()
            }
            Command::FirewallOn(rules) => self.firewall_on(&rules),
            Command::FirewallOff => self.firewall_off(),
            Command::FirewallActualState => {
                let is_on = self.firewall.current_status();
                info!("Firewall state: {}", if is_on { "on" } else { "off" });
                CommandResult::ok().with_exit_code(i32::from(is_on))
            }
        }
    }

    fn split_tunneling_settings(&self, settings: SplitTunnelSettings) -> CommandResult {
        info!(
            "Split tunneling: active={}, exclude={}, allow_lan={}, apps={}",
            settings.is_active,
            settings.is_exclude,
            settings.is_allow_lan_traffic,
            settings.apps.len()
        );
        for app in &settings.apps {
            info!("Split tunneling app: {}", app_file_name(app));
        }
        for range in &settings.ip_ranges {
            info!("Split tunneling address: {}", range);
        }
        for hostname in &settings.hostnames {
            info!("Split tunneling host: {}", hostname);
        }

        let is_enabled = settings.is_active;
        let is_exclude = settings.is_exclude;
        let apps = settings.apps.clone();
        self.coordinator.set_split_tunneling_params(settings);
        self.latch(|snapshot| {
            snapshot.is_enabled = is_enabled;
            snapshot.is_exclude = is_exclude;
            snapshot.apps = apps;
        });

        CommandResult::ok()
    }

    fn firewall_on(&self, rules: &FirewallRules) -> CommandResult {
        let was_on = self.firewall.current_status();
        let result = self.firewall.on(rules);
        // Exceptions follow every off -> on edge
        if !was_on && self.firewall.current_status() {
            self.coordinator.update_state();
        }
        info!(
            "Firewall on: allow_lan={}, custom_config={}",
            rules.allow_lan_traffic, rules.is_custom_config
        );

        match result {
            Ok(()) => CommandResult::ok(),
            Err(e) => {
                error!("Firewall on failed: {}", e);
                CommandResult::failure()
            }
        }
    }

    fn firewall_off(&self) -> CommandResult {
        let was_on = self.firewall.current_status();
        let result = self.firewall.off();
        if was_on && !self.firewall.current_status() {
            self.coordinator.update_state();
        }

        match result {
            Ok(()) => CommandResult::ok(),
            Err(e) => {
                error!("Firewall off failed: {}", e);
                CommandResult::failure()
            }
        }
    }

    fn latch(&self, update: impl FnOnce(&mut SplitTunnelSnapshot)) {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut snapshot);
    }
}

/// Executable name without its directory, for either path separator
fn app_file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdapterGatewayInfo, ConnectionStatus, Protocol};
    use crate::split_tunnel::coordinator::testing::{FirewallCall, Harness, harness};
    use crate::split_tunnel::exceptions::testing::SinkCall;

    fn dispatcher(h: &Harness) -> Dispatcher {
        Dispatcher::new(h.coordinator.clone(), h.firewall.clone())
    }

    fn connected_openvpn() -> ConnectionStatus {
        ConnectionStatus {
            is_connected: true,
            protocol: Protocol::OpenVpn,
            default_adapter: AdapterGatewayInfo {
                gateway_ip: "192.168.1.1".to_string(),
                ..Default::default()
            },
            vpn_adapter: AdapterGatewayInfo {
                adapter_ip: "10.8.0.6".to_string(),
                gateway_ip: "10.8.0.5".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn include_settings() -> SplitTunnelSettings {
        SplitTunnelSettings {
            is_active: true,
            is_exclude: false,
            apps: vec![r"C:\Program Files\Browser\browser.exe".to_string()],
            ip_ranges: vec!["10.10.0.0/16".to_string()],
            hostnames: vec!["a.com".to_string()],
            is_allow_lan_traffic: true,
        }
    }

    fn send(dispatcher: &Dispatcher, command: Command) -> CommandResult {
        let payload = command.encode_payload().unwrap();
        dispatcher.dispatch(command.id().as_u32(), &payload)
    }

    #[test]
    fn test_unknown_command_fails_without_side_effects() {
        let h = harness();
        let dispatcher = dispatcher(&h);

        let result = dispatcher.dispatch(9999, b"\xde\xad\xbe\xef");

        assert_eq!(result, CommandResult::failure());
        assert!(h.firewall.calls().is_empty());
        assert!(h.sink.calls().is_empty());
        assert!(h.policy.calls.lock().unwrap().is_empty());
        assert_eq!(*h.coordinator.connection(), ConnectionStatus::default());
        assert_eq!(*h.coordinator.settings(), SplitTunnelSettings::default());
    }

    #[test]
    fn test_malformed_payload_fails_without_side_effects() {
        let h = harness();
        let dispatcher = dispatcher(&h);

        let result = dispatcher.dispatch(CommandId::SendConnectStatus.as_u32(), b"not json");

        assert!(!result.success);
        assert!(h.sink.calls().is_empty());
        assert!(!h.coordinator.connection().is_connected);
    }

    #[test]
    fn test_helper_version() {
        let h = harness();
        let result = send(&dispatcher(&h), Command::GetHelperVersion);

        assert!(result.success);
        assert_eq!(result.additional_string, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_connect_status_reaches_coordinator() {
        let h = harness();
        let dispatcher = dispatcher(&h);

        let result = send(&dispatcher, Command::SendConnectStatus(connected_openvpn()));

        assert!(result.success);
        assert_eq!(*h.coordinator.connection(), connected_openvpn());
        assert!(dispatcher.split_tunnel_snapshot().is_vpn_connected);
    }

    #[test]
    fn test_split_tunnel_settings_latch_snapshot() {
        let h = harness();
        let dispatcher = dispatcher(&h);

        let result = send(&dispatcher, Command::SetSplitTunnelingSettings(include_settings()));

        assert!(result.success);
        assert_eq!(
            dispatcher.split_tunnel_snapshot(),
            SplitTunnelSnapshot {
                is_enabled: true,
                is_exclude: false,
                apps: vec![r"C:\Program Files\Browser\browser.exe".to_string()],
                is_vpn_connected: false,
            }
        );
        assert_eq!(*h.coordinator.settings(), include_settings());
    }

    #[test]
    fn test_firewall_state_exit_code() {
        let h = harness();
        let dispatcher = dispatcher(&h);

        let result = send(&dispatcher, Command::FirewallActualState);
        assert!(result.success);
        assert_eq!(result.exit_code, 0);

        send(&dispatcher, Command::FirewallOn(FirewallRules::default()));
        let result = send(&dispatcher, Command::FirewallActualState);
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn test_firewall_edges_resync_exceptions() {
        let h = harness();
        let dispatcher = dispatcher(&h);
        send(&dispatcher, Command::SendConnectStatus(connected_openvpn()));
        send(&dispatcher, Command::SetSplitTunnelingSettings(include_settings()));
        send(&dispatcher, Command::FirewallOn(FirewallRules::default()));

        let before = h.sink.last();
        assert!(matches!(&before, Some(SinkCall::Apply(_, reference)) if reference == "10.8.0.5"));
        let applies_before = h.sink.calls().len();

        send(&dispatcher, Command::FirewallOff);
        assert_eq!(h.sink.calls().len(), applies_before + 1);
        assert_eq!(h.sink.last(), before);

        send(&dispatcher, Command::FirewallOn(FirewallRules::default()));
        assert_eq!(h.sink.calls().len(), applies_before + 2);
        assert_eq!(h.sink.last(), before);
    }

    #[test]
    fn test_firewall_on_when_already_on_does_not_resync() {
        let h = harness();
        let dispatcher = dispatcher(&h);
        send(&dispatcher, Command::FirewallOn(FirewallRules::default()));
        let calls = h.sink.calls().len();

        send(&dispatcher, Command::FirewallOn(FirewallRules::default()));
        send(&dispatcher, Command::FirewallOff);
        send(&dispatcher, Command::FirewallOff);

        // Only the single on -> off edge reconciles
        assert_eq!(h.sink.calls().len(), calls + 1);
        assert_eq!(
            h.firewall.calls().iter().filter(|c| **c == FirewallCall::Off).count(),
            2
        );
    }

    #[test]
    fn test_app_file_name() {
        assert_eq!(app_file_name(r"C:\Program Files\App\app.exe"), "app.exe");
        assert_eq!(app_file_name("/usr/bin/firefox"), "firefox");
        assert_eq!(app_file_name("standalone"), "standalone");
    }
}
