//! Client side of the helper transport, used by the CLI queries

use crate::protocol::codec::{read_response, write_request};
use crate::protocol::{Command, CommandResult, ProtocolError};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};

pub struct HelperClient<S> {
    stream: S,
}

impl<S> HelperClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub async fn send(&mut self, command: &Command) -> Result<CommandResult, ProtocolError> {
        let payload = command.encode_payload()?;
        self.send_raw(command.id().as_u32(), &payload).await
    }

    /// Send an arbitrary command id and payload
    pub async fn send_raw(
        &mut self,
        command_id: u32,
        payload: &[u8],
    ) -> Result<CommandResult, ProtocolError> {
        write_request(&mut self.stream, command_id, payload).await?;
        read_response(&mut self.stream).await
    }
}

#[cfg(unix)]
pub async fn connect(
    socket_path: &Path,
) -> Result<HelperClient<tokio::net::UnixStream>, ProtocolError> {
    let stream = tokio::net::UnixStream::connect(socket_path).await?;
    Ok(HelperClient::new(stream))
}

#[cfg(windows)]
pub async fn connect(
    socket_path: &Path,
) -> Result<HelperClient<tokio::net::windows::named_pipe::NamedPipeClient>, ProtocolError> {
    use tokio::net::windows::named_pipe::ClientOptions;

    let stream = ClientOptions::new().open(socket_path.as_os_str())?;
    Ok(HelperClient::new(stream))
}
