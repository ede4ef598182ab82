//! Local command transport
//!
//! Listens on a Unix domain socket (named pipe on Windows). Connections are
//! served concurrently, but commands are executed strictly one at a time: a
//! command finishes before the next one from any connection starts.

use crate::config::HelperConfig;
use crate::dispatch::Dispatcher;
use crate::platform::{PlatformError, system_route_table};
use crate::protocol::codec::{read_request, write_response};
use crate::protocol::{CommandResult, PROTOCOL_VERSION, ProtocolError, Request};
use crate::split_tunnel::{
    Coordinator, DnsError, DnsResolver, ExceptionManager, Firewall, RemoteEndpointPolicy,
    RouteExceptionSink, TrackingFirewall,
};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    ProtocolError(#[from] ProtocolError),
    #[error("Platform error: {0}")]
    PlatformError(#[from] PlatformError),
    #[error("DNS error: {0}")]
    DnsError(#[from] DnsError),
}

pub struct HelperServer {
    dispatcher: Arc<Dispatcher>,
    gate: Mutex<()>,
}

impl HelperServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            gate: Mutex::new(()),
        }
    }

    /// Wire up the coordinator and its OS-backed collaborators
    ///
    /// Must be called from inside a tokio runtime.
    pub fn from_config(config: &HelperConfig) -> Result<Self, ServerError> {
        let resolver = Arc::new(DnsResolver::new(&config.dns)?);
        let sink = RouteExceptionSink::new(system_route_table()?);
        let exceptions = ExceptionManager::new(resolver, Box::new(sink));

        let firewall: Arc<dyn Firewall> = Arc::new(TrackingFirewall::new());
        let routing = Arc::new(RemoteEndpointPolicy::new(system_route_table()?));

        let coordinator = Arc::new(Coordinator::new(
            exceptions,
            firewall.clone(),
            routing,
            config.split_tunnel.diagnostic_hostname.clone(),
        ));

        Ok(Self::new(Arc::new(Dispatcher::new(coordinator, firewall))))
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Execute one request, serialized against every other request
    pub async fn handle_request(&self, request: Request) -> CommandResult {
        if request.version != PROTOCOL_VERSION {
            warn!(
                "{} (command id {})",
                ProtocolError::UnsupportedVersion(request.version),
                request.command_id
            );
            return CommandResult::failure();
        }

        let _guard = self.gate.lock().await;
        let dispatcher = self.dispatcher.clone();
        let command_id = request.command_id;

        // Handlers may block on hostname resolution
        let handled = tokio::task::spawn_blocking(move || {
            dispatcher.dispatch(request.command_id, &request.payload)
        })
        .await;

        match handled {
            Ok(result) => result,
            Err(e) => {
                error!("Command {} handler failed: {}", command_id, e);
                CommandResult::failure()
            }
        }
    }

    /// Serve requests on one connection until the peer hangs up
    pub async fn serve_connection<S>(&self, stream: S) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);

        while let Some(request) = read_request(&mut reader).await? {
            debug!(
                "Request: command id {}, {} payload bytes",
                request.command_id,
                request.payload.len()
            );
            let result = self.handle_request(request).await;
            write_response(&mut writer, &result).await?;
        }

        debug!("Peer closed connection");
        Ok(())
    }

    /// Accept connections until `shutdown` resolves
    #[cfg(unix)]
    pub async fn run(
        self: Arc<Self>,
        socket_path: &std::path::Path,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ServerError> {
        let listener = bind_socket(socket_path)?;
        info!("Helper listening on {}", socket_path.display());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => self.spawn_connection(stream),
                        Err(e) => warn!("Failed to accept connection: {}", e),
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!("Failed to remove socket {}: {}", socket_path.display(), e);
        }
        Ok(())
    }

    /// Accept connections until `shutdown` resolves
    #[cfg(windows)]
    pub async fn run(
        self: Arc<Self>,
        socket_path: &std::path::Path,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ServerError> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let pipe_name = socket_path.as_os_str();
        let mut pipe = ServerOptions::new()
            .first_pipe_instance(true)
            .create(pipe_name)?;
        info!("Helper listening on {}", socket_path.display());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                connected = pipe.connect() => {
                    match connected {
                        Ok(()) => {
                            let next = ServerOptions::new().create(pipe_name)?;
                            let stream = std::mem::replace(&mut pipe, next);
                            self.spawn_connection(stream);
                        }
                        Err(e) => warn!("Failed to accept connection: {}", e),
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }
        Ok(())
    }

    fn spawn_connection<S>(self: &Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let server = self.clone();
        tokio::spawn(async move {
            if let Err(e) = server.serve_connection(stream).await {
                warn!("Connection closed with error: {}", e);
            }
        });
    }
}

/// Bind the socket, replacing a stale one left by a previous run
#[cfg(unix)]
fn bind_socket(path: &std::path::Path) -> std::io::Result<tokio::net::UnixListener> {
    use std::os::unix::fs::PermissionsExt;

    // Owner and group only; the client runs in the helper's group
    const SOCKET_MODE: u32 = 0o660;

    if path.exists() {
        warn!("Removing stale socket {}", path.display());
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = tokio::net::UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::{read_response, write_frame, write_request};
    use crate::protocol::{Command, CommandId};
    use crate::split_tunnel::coordinator::testing::harness;
    use crate::split_tunnel::firewall::FirewallRules;

    fn server() -> Arc<HelperServer> {
        let h = harness();
        let dispatcher = Dispatcher::new(h.coordinator.clone(), h.firewall.clone());
        Arc::new(HelperServer::new(Arc::new(dispatcher)))
    }

    #[tokio::test]
    async fn test_serve_connection_answers_each_request() {
        let server = server();
        let (client, remote) = tokio::io::duplex(4096);
        let task = tokio::spawn({
            let server = server.clone();
            async move { server.serve_connection(remote).await }
        });

        let (mut reader, mut writer) = tokio::io::split(client);

        write_request(&mut writer, CommandId::GetHelperVersion.as_u32(), b"")
            .await
            .unwrap();
        let result = read_response(&mut reader).await.unwrap();
        assert!(result.success);
        assert_eq!(result.additional_string, env!("CARGO_PKG_VERSION"));

        let on = Command::FirewallOn(FirewallRules::default());
        write_request(&mut writer, on.id().as_u32(), &on.encode_payload().unwrap())
            .await
            .unwrap();
        assert!(read_response(&mut reader).await.unwrap().success);

        write_request(&mut writer, CommandId::FirewallActualState.as_u32(), b"")
            .await
            .unwrap();
        assert_eq!(read_response(&mut reader).await.unwrap().exit_code, 1);

        drop(writer);
        drop(reader);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection_open() {
        let server = server();
        let (client, remote) = tokio::io::duplex(4096);
        tokio::spawn({
            let server = server.clone();
            async move { server.serve_connection(remote).await }
        });
        let (mut reader, mut writer) = tokio::io::split(client);

        write_request(&mut writer, 9999, b"junk").await.unwrap();
        assert_eq!(read_response(&mut reader).await.unwrap(), CommandResult::failure());

        write_request(&mut writer, CommandId::GetHelperVersion.as_u32(), b"")
            .await
            .unwrap();
        assert!(read_response(&mut reader).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_unsupported_version_is_rejected() {
        let server = server();
        let (client, remote) = tokio::io::duplex(4096);
        tokio::spawn({
            let server = server.clone();
            async move { server.serve_connection(remote).await }
        });
        let (mut reader, mut writer) = tokio::io::split(client);

        write_frame(&mut writer, PROTOCOL_VERSION + 1, 0, b"")
            .await
            .unwrap();
        assert!(!read_response(&mut reader).await.unwrap().success);

        write_request(&mut writer, CommandId::GetHelperVersion.as_u32(), b"")
            .await
            .unwrap();
        assert!(read_response(&mut reader).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_handle_request_dispatches() {
        let server = server();
        let result = server
            .handle_request(Request {
                version: PROTOCOL_VERSION,
                command_id: CommandId::FirewallActualState.as_u32(),
                payload: Vec::new(),
            })
            .await;
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
    }
}
