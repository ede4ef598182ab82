//! Wire protocol between the VPN engine and the helper
//!
//! A request is a frame carrying the protocol version, a command identifier
//! and a serialized payload; every request gets exactly one [`CommandResult`]
//! frame back.
//!
//! # Request frame (big-endian)
//!
//! | Field | Size |
//! |-------|------|
//! | version | u16 |
//! | command id | u32 |
//! | payload length | u32 |
//! | payload | n bytes (JSON) |
//!
//! The response frame is a u32 length followed by the JSON result envelope.

pub mod codec;
pub mod command;
pub mod result;

pub use codec::{MAX_FRAME_LEN, PROTOCOL_VERSION, Request};
pub use command::{Command, CommandId};
pub use result::{CUSTOM_INFO_SLOTS, CommandResult};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Frame of {0} bytes exceeds the limit")]
    FrameTooLarge(u32),
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u16),
    #[error("Unknown command id: {0}")]
    UnknownCommand(u32),
    #[error("Invalid payload: {0}")]
    PayloadError(#[from] serde_json::Error),
}
