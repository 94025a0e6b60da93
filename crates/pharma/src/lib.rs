//! Pharma - Console client for the PharmaNotify daemon
//!
//! This crate provides the two faces of the console:
//! - `session` - an interactive pharmacy session over TCP: register,
//!   print the status digest, then interleave typed commands with
//!   notifications pushed by the daemon
//! - `admin` - one-shot administrative requests over the daemon's
//!   Unix socket
//!
//! Command responses and pushed notifications share one terminal, so a
//! notification can land between a command and its answer. That
//! interleaving mirrors the wire: the daemon makes no ordering promise
//! between the two streams.

pub mod admin;
pub mod command;
pub mod error;
pub mod render;
pub mod session;

pub use error::{ClientError, Result};
