//! Reachability snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of link carrying traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Wireless LAN.
    Wifi,
    /// Mobile data.
    Cellular,
    /// Ethernet, VPN or anything else.
    Other,
    /// No link.
    #[default]
    None,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Wifi => "wifi",
            Self::Cellular => "cellular",
            Self::Other => "other",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Whether a usable path to the remote service exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    /// A validated internet path exists.
    pub available: bool,
    /// Last known transport.
    pub transport: TransportKind,
}

impl NetworkStatus {
    /// Status with no usable link.
    pub const fn offline() -> Self {
        Self {
            available: false,
            transport: TransportKind::None,
        }
    }

    /// Status with a usable link of the given kind.
    pub const fn online(transport: TransportKind) -> Self {
        Self {
            available: true,
            transport,
        }
    }
}
