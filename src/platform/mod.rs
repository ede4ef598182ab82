//! Platform-specific route table implementations

#[cfg(target_os = "macos")]
pub mod mac;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "windows")]
pub mod windows;

use ipnet::IpNet;
use std::net::IpAddr;
use std::process::Output;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Failed to add route: {0}")]
    AddRouteError(String),
    #[error("Failed to delete route: {0}")]
    DeleteRouteError(String),
    #[error("Unsupported platform")]
    UnsupportedPlatform,
}

/// Platform-agnostic route table interface
///
/// Destinations are networks so the same call covers single hosts (/32, /128)
/// and user-supplied ranges.
pub trait RouteTable: Send + Sync {
    fn add_route(&self, destination: &IpNet, next_hop: IpAddr) -> Result<(), PlatformError>;
    /// Remove the route `add_route` created for `destination` via `next_hop`
    fn delete_route(&self, destination: &IpNet, next_hop: IpAddr) -> Result<(), PlatformError>;
}

/// Get the route table for the current platform
pub fn system_route_table() -> Result<Box<dyn RouteTable>, PlatformError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(mac::MacRouteTable::new()))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::LinuxRouteTable::new()))
    }

    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(windows::WindowsRouteTable::new()))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        Err(PlatformError::UnsupportedPlatform)
    }
}

/// Turn a failed command's stderr into an error message
fn command_failure(output: &Output) -> Option<String> {
    if output.status.success() {
        None
    } else {
        Some(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
}
