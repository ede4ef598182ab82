//! Split-tunnel reconciliation engine
//!
//! The [`Coordinator`] owns connection and split-tunnel state and, on every
//! change, decides where exception traffic goes and pushes that decision to
//! the firewall, the routing policy and the [`ExceptionManager`].

pub mod coordinator;
pub mod exceptions;
pub mod firewall;
pub mod resolver;
pub mod routing_policy;

pub use coordinator::{Coordinator, reference_address};
pub use exceptions::{ExceptionManager, ExceptionSet, ExceptionSink, RouteExceptionSink};
pub use firewall::{Firewall, FirewallError, FirewallRules, TrackingFirewall};
pub use resolver::{DnsError, DnsResolver, HostResolver};
pub use routing_policy::{RemoteEndpointPolicy, RoutingPolicy};
