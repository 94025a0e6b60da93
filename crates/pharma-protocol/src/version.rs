//! Handshake version negotiation.
//!
//! Every `Registro` frame carries the client's protocol version and the
//! server echoes its own in a `Rechazo`, so a mismatched client learns
//! what it is talking to before the socket closes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `major.minor` protocol version.
///
/// The minor number only grows through additive changes, so two peers
/// interoperate whenever their major numbers agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Version this build of the crate speaks.
    pub const CURRENT: ProtocolVersion = ProtocolVersion::new(1, 0);

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Whether a peer announcing `other` can be admitted.
    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
