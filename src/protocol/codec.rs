//! Frame encoding over any async byte stream

use crate::protocol::{CommandResult, ProtocolError};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u16 = 1;

/// Upper bound for a payload or result frame
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

/// One inbound request frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub version: u16,
    pub command_id: u32,
    pub payload: Vec<u8>,
}

/// Read the next request
///
/// Returns `Ok(None)` when the peer closed the stream between frames.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let version = match reader.read_u16().await {
        Ok(version) => version,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let command_id = reader.read_u32().await?;
    let payload = read_body(reader).await?;

    Ok(Some(Request {
        version,
        command_id,
        payload,
    }))
}

pub async fn write_request<W>(
    writer: &mut W,
    command_id: u32,
    payload: &[u8],
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, PROTOCOL_VERSION, command_id, payload).await
}

/// Write a request frame with an explicit protocol version
pub async fn write_frame<W>(
    writer: &mut W,
    version: u16,
    command_id: u32,
    payload: &[u8],
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let len = frame_len(payload.len())?;
    let mut frame = Vec::with_capacity(10 + payload.len());
    frame.extend_from_slice(&version.to_be_bytes());
    frame.extend_from_slice(&command_id.to_be_bytes());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_response<R>(reader: &mut R) -> Result<CommandResult, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let body = read_body(reader).await?;
    Ok(serde_json::from_slice(&body)?)
}

pub async fn write_response<W>(writer: &mut W, result: &CommandResult) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(result)?;
    let len = frame_len(body.len())?;

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

fn frame_len(len: usize) -> Result<u32, ProtocolError> {
    let len = u32::try_from(len).unwrap_or(u32::MAX);
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    Ok(len)
}

/// Read a u32 length prefix and that many bytes
async fn read_body<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    // Reject before allocating
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}
