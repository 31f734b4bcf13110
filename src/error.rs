//! Error taxonomy for the SSP6 protocol engine and command router.
//!
//! Mirrors the split the hardware vendor's own host-side libraries make
//! between transport-level failures (framing, CRC, timeout) and
//! protocol-level status codes (the device answered, but refused).

use std::fmt;

use crate::codec::ResponseStatus;

/// Errors raised while moving bytes across the serial link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("serial i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("exchange with address {0:#04x} timed out")]
    Timeout(u8),
    #[error("crc check failed on response from address {0:#04x}")]
    CrcFail(u8),
    #[error("invalid STX byte: {0:#04x}")]
    InvalidStx(u8),
    #[error("frame too short")]
    ShortFrame,
    #[error("failed to acquire serial port lock")]
    LockTimeout,
}

/// Errors raised by the protocol engine above the transport: malformed
/// responses, or status bytes the caller must act on.
#[derive(Debug, thiserror::Error)]
pub enum SspError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("device encryption key is not set")]
    KeyNotSet,
    #[error("device reported status {0}")]
    Protocol(ResponseStatus),
    #[error("device is not initialized")]
    Uninitialized,
    #[error("response payload malformed: {0}")]
    Malformed(&'static str),
    #[error("host_protocol re-sync after a unit reset failed")]
    ReSyncFailed,
}

pub type Result<T> = std::result::Result<T, SspError>;

/// Errors raised while parsing an inbound command envelope (§7 EnvelopeError).
#[derive(Debug)]
pub struct EnvelopeError {
    pub reason: String,
    pub line: Option<u64>,
}

impl EnvelopeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            line: None,
        }
    }

    pub fn with_line(reason: impl Into<String>, line: u64) -> Self {
        Self {
            reason: reason.into(),
            line: Some(line),
        }
    }
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for EnvelopeError {}
