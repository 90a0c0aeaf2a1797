// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types.
//!
//! Only API misuse reaches the caller. Malformed packets, lost connections
//! and starved reassemblies are handled inside the I/O thread and logged.

use thiserror::Error;

/// Errors returned by the public API.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Lifecycle
    // ========================================================================
    #[error("The network is not currently connected")]
    NotConnected,

    #[error("This network instance has been destroyed")]
    Destroyed,

    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Invalid network name: {0:?}")]
    InvalidName(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Send path
    // ========================================================================
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("I/O thread stopped")]
    ChannelClosed,

    // ========================================================================
    // Wire / I/O
    // ========================================================================
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode failures for a single packet or stream frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("packet truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("bad magic prefix {0:02x?}")]
    BadMagic([u8; 3]),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown packet kind {0}")]
    UnknownKind(u8),

    #[error("declared length {declared} does not match {actual} remaining bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("announce name is not NUL terminated")]
    NameNotTerminated,

    #[error("announce name is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid fragment {index} of {count}")]
    InvalidFragment { index: u16, count: u16 },

    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },
}

/// Result alias for NUClearNet operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_visible_messages() {
        assert_eq!(
            Error::NotConnected.to_string(),
            "The network is not currently connected"
        );
        assert_eq!(
            Error::Destroyed.to_string(),
            "This network instance has been destroyed"
        );
    }

    #[test]
    fn test_protocol_error_conversion() {
        let err: Error = ProtocolError::UnknownKind(7).into();
        assert!(matches!(err, Error::Protocol(ProtocolError::UnknownKind(7))));
        assert_eq!(err.to_string(), "Protocol error: unknown packet kind 7");
    }
}
