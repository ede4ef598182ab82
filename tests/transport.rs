#![cfg(unix)]

use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;
use vpn_helper::client::{self, HelperClient};
use vpn_helper::model::{AdapterGatewayInfo, ConnectionStatus, Protocol, SplitTunnelSettings};
use vpn_helper::platform::PlatformError;
use vpn_helper::protocol::{Command, CommandResult};
use vpn_helper::split_tunnel::exceptions::ExceptionError;
use vpn_helper::split_tunnel::{
    Coordinator, DnsError, ExceptionManager, ExceptionSet, ExceptionSink, Firewall, FirewallRules,
    HostResolver, RoutingPolicy, TrackingFirewall,
};
use vpn_helper::{Dispatcher, HelperServer};

struct FixedResolver;

impl HostResolver for FixedResolver {
    fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsError> {
        match hostname {
            "intranet.example.com" => Ok(vec!["198.51.100.20".parse().unwrap()]),
            _ => Err(DnsError::NoAddressFound(hostname.to_string())),
        }
    }
}

#[derive(Clone, Default)]
struct SharedSink {
    applied: Arc<Mutex<Option<(ExceptionSet, String)>>>,
}

impl ExceptionSink for SharedSink {
    fn apply(&self, exceptions: &ExceptionSet, reference: &str) -> Result<(), ExceptionError> {
        *self.applied.lock().unwrap() = Some((exceptions.clone(), reference.to_string()));
        Ok(())
    }

    fn clear(&self) -> Result<(), ExceptionError> {
        *self.applied.lock().unwrap() = None;
        Ok(())
    }
}

struct NoopPolicy;

impl RoutingPolicy for NoopPolicy {
    fn update_state(
        &self,
        _status: &ConnectionStatus,
        _is_active: bool,
        _is_exclude: bool,
    ) -> Result<(), PlatformError> {
        Ok(())
    }
}

struct Running {
    _dir: TempDir,
    socket_path: std::path::PathBuf,
    sink: SharedSink,
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

async fn start_helper() -> Running {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("helper.sock");
    let sink = SharedSink::default();

    let firewall: Arc<dyn Firewall> = Arc::new(TrackingFirewall::new());
    let exceptions = ExceptionManager::new(Arc::new(FixedResolver), Box::new(sink.clone()));
    let coordinator = Arc::new(Coordinator::new(
        exceptions,
        firewall.clone(),
        Arc::new(NoopPolicy),
        "diag.example.com",
    ));
    let server = Arc::new(HelperServer::new(Arc::new(Dispatcher::new(
        coordinator,
        firewall,
    ))));

    let (stop, stopped) = oneshot::channel::<()>();
    let path = socket_path.clone();
    let task = tokio::spawn(async move {
        let shutdown = async {
            let _ = stopped.await;
        };
        server.run(&path, shutdown).await.unwrap();
    });

    wait_for_socket(&socket_path).await;
    Running {
        _dir: dir,
        socket_path,
        sink,
        stop: Some(stop),
        task,
    }
}

async fn wait_for_socket(path: &Path) {
    for _ in 0..100 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Helper socket never appeared at {}", path.display());
}

async fn connect(running: &Running) -> HelperClient<tokio::net::UnixStream> {
    client::connect(&running.socket_path).await.unwrap()
}

fn exclude_settings() -> SplitTunnelSettings {
    SplitTunnelSettings {
        is_active: true,
        is_exclude: true,
        apps: Vec::new(),
        ip_ranges: vec!["10.20.0.0/16".to_string()],
        hostnames: vec!["intranet.example.com".to_string()],
        is_allow_lan_traffic: false,
    }
}

fn connected_wireguard() -> ConnectionStatus {
    ConnectionStatus {
        is_connected: true,
        protocol: Protocol::WireGuard,
        default_adapter: AdapterGatewayInfo {
            gateway_ip: "192.168.1.1".to_string(),
            ..Default::default()
        },
        vpn_adapter: AdapterGatewayInfo {
            adapter_ip: "100.64.0.2".to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_commands_over_socket_reconcile_exceptions() {
    let mut running = start_helper().await;
    let mut client = connect(&running).await;

    let version = client.send(&Command::GetHelperVersion).await.unwrap();
    assert_eq!(version.additional_string, env!("CARGO_PKG_VERSION"));

    let result = client
        .send(&Command::SetSplitTunnelingSettings(exclude_settings()))
        .await
        .unwrap();
    assert!(result.success);
    assert!(running.sink.applied.lock().unwrap().is_none());

    let result = client
        .send(&Command::SendConnectStatus(connected_wireguard()))
        .await
        .unwrap();
    assert!(result.success);

    let (set, reference) = running.sink.applied.lock().unwrap().clone().unwrap();
    assert_eq!(reference, "192.168.1.1");
    let rendered: Vec<String> = set.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["10.20.0.0/16", "198.51.100.20/32"]);

    client
        .send(&Command::SendConnectStatus(ConnectionStatus::default()))
        .await
        .unwrap();
    assert!(running.sink.applied.lock().unwrap().is_none());

    drop(client);
    running.stop.take().unwrap().send(()).unwrap();
    (&mut running.task).await.unwrap();
    assert!(!running.socket_path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_command_leaves_connection_usable() {
    let mut running = start_helper().await;
    let mut client = connect(&running).await;

    let result = client.send_raw(4242, b"\x01\x02\x03").await.unwrap();
    assert_eq!(result, CommandResult::failure());

    let state = client.send(&Command::FirewallActualState).await.unwrap();
    assert!(state.success);
    assert_eq!(state.exit_code, 0);

    client
        .send(&Command::FirewallOn(FirewallRules::default()))
        .await
        .unwrap();
    let state = client.send(&Command::FirewallActualState).await.unwrap();
    assert_eq!(state.exit_code, 1);

    running.stop.take().unwrap().send(()).unwrap();
    (&mut running.task).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connections_share_state() {
    let mut running = start_helper().await;
    let mut first = connect(&running).await;
    let mut second = connect(&running).await;

    first
        .send(&Command::FirewallOn(FirewallRules::default()))
        .await
        .unwrap();
    let state = second.send(&Command::FirewallActualState).await.unwrap();
    assert_eq!(state.exit_code, 1);

    running.stop.take().unwrap().send(()).unwrap();
    (&mut running.task).await.unwrap();
}
