//! macOS route table via route(8)

use super::{PlatformError, RouteTable, command_failure};
use ipnet::IpNet;
use std::net::IpAddr;
use std::process::Command;

pub struct MacRouteTable;

impl MacRouteTable {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacRouteTable {
    fn default() -> Self {
        Self::new()
    }
}

fn destination_args(destination: &IpNet) -> Vec<String> {
    let mut args = Vec::with_capacity(3);
    if destination.addr().is_ipv6() {
        args.push("-inet6".to_string());
    }
    if destination.prefix_len() == destination.max_prefix_len() {
        args.push("-host".to_string());
        args.push(destination.addr().to_string());
    } else {
        args.push("-net".to_string());
        args.push(destination.to_string());
    }
    args
}

impl RouteTable for MacRouteTable {
    fn add_route(&self, destination: &IpNet, next_hop: IpAddr) -> Result<(), PlatformError> {
        let output = Command::new("route")
            .args(["-n", "add"])
            .args(destination_args(destination))
            .arg(next_hop.to_string())
            .output()
            .map_err(|e| PlatformError::AddRouteError(e.to_string()))?;

        match command_failure(&output) {
            Some(stderr) => Err(PlatformError::AddRouteError(stderr)),
            None => Ok(()),
        }
    }

    fn delete_route(&self, destination: &IpNet, next_hop: IpAddr) -> Result<(), PlatformError> {
        let output = Command::new("route")
            .args(["-n", "delete"])
            .args(destination_args(destination))
            .arg(next_hop.to_string())
            .output()
            .map_err(|e| PlatformError::DeleteRouteError(e.to_string()))?;

        match command_failure(&output) {
            Some(stderr) => Err(PlatformError::DeleteRouteError(stderr)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_and_net_args() {
        let host: IpNet = "10.0.0.5/32".parse().unwrap();
        assert_eq!(destination_args(&host), vec!["-host", "10.0.0.5"]);

        let net: IpNet = "10.0.0.0/8".parse().unwrap();
        assert_eq!(destination_args(&net), vec!["-net", "10.0.0.0/8"]);

        let v6: IpNet = "2001:db8::1/128".parse().unwrap();
        assert_eq!(destination_args(&v6), vec!["-inet6", "-host", "2001:db8::1"]);
    }
}
