//! Windows route table via route.exe

use super::{PlatformError, RouteTable, command_failure};
use ipnet::IpNet;
use std::net::IpAddr;
use std::process::Command;

pub struct WindowsRouteTable;

impl WindowsRouteTable {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsRouteTable {
    fn default() -> Self {
        Self::new()
    }
}

/// route.exe arguments for one route, identical for add and delete
fn route_args(action: &str, destination: &IpNet, next_hop: IpAddr) -> Vec<String> {
    match destination {
        IpNet::V4(net) => vec![
            action.to_string(),
            net.network().to_string(),
            "mask".to_string(),
            net.netmask().to_string(),
            next_hop.to_string(),
        ],
        IpNet::V6(net) => vec![action.to_string(), net.to_string(), next_hop.to_string()],
    }
}

impl RouteTable for WindowsRouteTable {
    fn add_route(&self, destination: &IpNet, next_hop: IpAddr) -> Result<(), PlatformError> {
        let output = Command::new("route")
            .args(route_args("add", destination, next_hop))
            .output()
            .map_err(|e| PlatformError::AddRouteError(e.to_string()))?;

        match command_failure(&output) {
            Some(stderr) => Err(PlatformError::AddRouteError(stderr)),
            None => Ok(()),
        }
    }

    fn delete_route(&self, destination: &IpNet, next_hop: IpAddr) -> Result<(), PlatformError> {
        // Without mask and gateway route.exe drops every route to the network
        let output = Command::new("route")
            .args(route_args("delete", destination, next_hop))
            .output()
            .map_err(|e| PlatformError::DeleteRouteError(e.to_string()))?;

        match command_failure(&output) {
            Some(stderr) => Err(PlatformError::DeleteRouteError(stderr)),
            None => Ok(()),
        }
    }
}
