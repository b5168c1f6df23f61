//! Connection state and binary representation enums.

use std::fmt;

/// Lifecycle state of a WebSocket, numbered like the standard constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ReadyState {
    /// Not yet open. Every unattached logical socket reports this.
    #[default]
    Connecting = 0,
    /// Open and able to communicate.
    Open = 1,
    /// A close handshake is in progress.
    Closing = 2,
    /// Closed or could not be opened.
    Closed = 3,
}

impl ReadyState {
    /// Returns the numeric value of this state.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a numeric value back into a state.
    ///
    /// Values above `3` saturate to [`ReadyState::Closed`].
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// How a transport hands binary frames to its listeners.
///
/// Transports may support several representations. The logical socket only
/// ever exposes [`BinaryType::ArrayBuffer`]: one contiguous buffer per
/// message, the single shape every consumer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryType {
    /// Contiguous buffer, transport default.
    Buffer,
    /// A message split into the frames it arrived in.
    Fragments,
    /// Contiguous buffer, the facade's representation.
    ArrayBuffer,
}
