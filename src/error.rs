/**
 * @file
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](..)
 * @brief Error types surfaced by the wire codec, the connection manager and
 * the coordinator.
 */
use std::io;

use thiserror::Error;

use crate::net_common::ErrType;
use crate::tag::Tag;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    #[error("malformed message of type {msg_type}: {reason}")]
    MalformedMessage { msg_type: u8, reason: String },
}

impl DecodeError {
    pub fn malformed(msg_type: u8, reason: impl Into<String>) -> DecodeError {
        DecodeError::MalformedMessage {
            msg_type,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RtiError {
    #[error("connection to federate {0} closed")]
    ConnectionClosed(u16),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("authentication failed: {0:?}")]
    Authentication(ErrType),

    #[error("rejected by the RTI: {0:?}")]
    Rejected(ErrType),

    #[error("network error: {0}")]
    Network(#[from] io::Error),

    #[error("peer at {address} unreachable after {attempts} attempts")]
    UnreachablePeer { address: String, attempts: u32 },

    #[error("failed to bind port {port} after {attempts} attempts")]
    BindFailed { port: u16, attempts: u32 },

    #[error("coordination violation by federate {fed_id}: {detail} at tag {tag}")]
    CoordinationViolation { fed_id: u16, tag: Tag, detail: String },

    #[error("federate {0} is in a zero-delay cycle")]
    ZeroDelayCycle(u16),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl RtiError {
    /** True when the error means the peer is gone rather than misbehaving. */
    pub fn is_peer_loss(&self) -> bool {
        match self {
            RtiError::ConnectionClosed(_) => true,
            RtiError::Network(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /** True when a read or write gave up after the socket timeout. */
    pub fn is_timeout(&self) -> bool {
        match self {
            RtiError::Network(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_loss_classification() {
        let eof = RtiError::Network(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(eof.is_peer_loss());
        let timeout = RtiError::Network(io::Error::new(io::ErrorKind::WouldBlock, "timeout"));
        assert!(timeout.is_peer_loss());
        assert!(RtiError::ConnectionClosed(3).is_peer_loss());
        assert!(timeout.is_timeout());
        assert!(!eof.is_timeout());
        assert!(!RtiError::ConnectionClosed(3).is_timeout());
        assert!(!RtiError::Protocol(String::from("bad")).is_peer_loss());
    }

    #[test]
    fn test_decode_error_converts() {
        let err: RtiError = DecodeError::UnknownMessageType(18).into();
        assert_eq!("unknown message type 18", err.to_string());
    }
}
