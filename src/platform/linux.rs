//! Linux route table via iproute2

use super::{PlatformError, RouteTable, command_failure};
use ipnet::IpNet;
use std::net::IpAddr;
use std::process::Command;

pub struct LinuxRouteTable;

impl LinuxRouteTable {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinuxRouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable for LinuxRouteTable {
    fn add_route(&self, destination: &IpNet, next_hop: IpAddr) -> Result<(), PlatformError> {
        // `replace` keeps repeated reconciliations idempotent
        let output = Command::new("ip")
            .args([
                "route",
                "replace",
                &destination.to_string(),
                "via",
                &next_hop.to_string(),
            ])
            .output()
            .map_err(|e| PlatformError::AddRouteError(e.to_string()))?;

        match command_failure(&output) {
            Some(stderr) => Err(PlatformError::AddRouteError(stderr)),
            None => Ok(()),
        }
    }

    fn delete_route(&self, destination: &IpNet, next_hop: IpAddr) -> Result<(), PlatformError> {
        let output = Command::new("ip")
            .args([
                "route",
                "delete",
                &destination.to_string(),
                "via",
                &next_hop.to_string(),
            ])
            .output()
            .map_err(|e| PlatformError::DeleteRouteError(e.to_string()))?;

        match command_failure(&output) {
            Some(stderr) => Err(PlatformError::DeleteRouteError(stderr)),
            None => Ok(()),
        }
    }
}
