//! Pharma Protocol - Wire protocol for daemon communication
//!
//! This crate provides the length-prefixed frame codec and the message
//! vocabularies for both channels: pharmacy clients over TCP and the
//! administrative console over a Unix socket.

pub mod admin;
pub mod frame;
pub mod message;
pub mod version;

pub use admin::{AdminRequest, AdminResponse, Tarea};
pub use frame::{
    encode_frame, read_frame, read_frame_limited, read_message, write_frame, write_message,
    FrameError,
};
pub use message::{ClientRequest, ErrorKind, ServerMessage};
pub use version::ProtocolVersion;
