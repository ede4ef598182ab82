//! Command identifiers and their typed payloads
//!
//! Identifiers keep the numbering the engine already uses; anything not
//! listed in [`CommandId`] is rejected without touching helper state.

use crate::model::{ConnectionStatus, SplitTunnelSettings};
use crate::protocol::ProtocolError;
use crate::split_tunnel::firewall::FirewallRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    GetHelperVersion = 0,
    SetSplitTunnelingSettings = 1,
    SendConnectStatus = 2,
    FirewallOn = 12,
    FirewallOff = 13,
    FirewallActualState = 14,
}

impl CommandId {
    pub const ALL: [CommandId; 6] = [
        CommandId::GetHelperVersion,
        CommandId::SetSplitTunnelingSettings,
        CommandId::SendConnectStatus,
        CommandId::FirewallOn,
        CommandId::FirewallOff,
        CommandId::FirewallActualState,
    ];

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandId::GetHelperVersion => "get_helper_version",
            CommandId::SetSplitTunnelingSettings => "set_split_tunneling_settings",
            CommandId::SendConnectStatus => "send_connect_status",
            CommandId::FirewallOn => "firewall_on",
            CommandId::FirewallOff => "firewall_off",
            CommandId::FirewallActualState => "firewall_actual_state",
        }
    }
}

impl TryFrom<u32> for CommandId {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        CommandId::ALL
            .into_iter()
            .find(|id| id.as_u32() == value)
            .ok_or(ProtocolError::UnknownCommand(value))
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded command with its request payload
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetHelperVersion,
    SetSplitTunnelingSettings(SplitTunnelSettings),
    SendConnectStatus(ConnectionStatus),
    FirewallOn(FirewallRules),
    FirewallOff,
    FirewallActualState,
}

impl Command {
    pub fn id(&self) -> CommandId {
        match self {
            Command::GetHelperVersion => CommandId::GetHelperVersion,
            Command::SetSplitTunnelingSettings(_) => CommandId::SetSplitTunnelingSettings,
            Command::SendConnectStatus(_) => CommandId::SendConnectStatus,
            Command::FirewallOn(_) => CommandId::FirewallOn,
            Command::FirewallOff => CommandId::FirewallOff,
            Command::FirewallActualState => CommandId::FirewallActualState,
        }
    }

    /// Decode the payload expected by `id`
    ///
    /// Commands without a payload ignore whatever bytes were sent.
    pub fn decode(id: CommandId, payload: &[u8]) -> Result<Self, ProtocolError> {
        let command = match id {
            CommandId::GetHelperVersion => Command::GetHelperVersion,
            CommandId::SetSplitTunnelingSettings => {
                Command::SetSplitTunnelingSettings(serde_json::from_slice(payload)?)
            }
            CommandId::SendConnectStatus => {
                Command::SendConnectStatus(serde_json::from_slice(payload)?)
            }
            CommandId::FirewallOn => Command::FirewallOn(serde_json::from_slice(payload)?),
            CommandId::FirewallOff => Command::FirewallOff,
            CommandId::FirewallActualState => Command::FirewallActualState,
        };
        Ok(command)
    }

    pub fn encode_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let payload = match self {
            Command::SetSplitTunnelingSettings(settings) => serde_json::to_vec(settings)?,
            Command::SendConnectStatus(status) => serde_json::to_vec(status)?,
            Command::FirewallOn(rules) => serde_json::to_vec(rules)?,
            Command::GetHelperVersion | Command::FirewallOff | Command::FirewallActualState => {
                Vec::new()
            }
        };
        Ok(payload)
    }
}
