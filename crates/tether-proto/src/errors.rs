//! Protocol error values.
//!
//! Every failure in the codec and frame layers is a typed error that maps to
//! a CoAP status. The proxy logs the mapped status and decides what the
//! caller sees; nothing in this crate panics on malformed input.

use thiserror::Error;

use crate::{
    status::Status,
    value::{ResourceId, ValueKind},
};

/// Errors produced while encoding or decoding bridge frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input ended before the structure it claims to contain.
    #[error("frame truncated: need {expected} byte(s), {actual} available")]
    Truncated {
        /// Bytes the current field requires.
        expected: usize,
        /// Bytes actually remaining.
        actual: usize,
    },

    /// Resource type tag not in the protocol's set.
    #[error("unknown resource type tag {0:#04x}")]
    UnknownKind(u8),

    /// Integer or float payload did not parse as ASCII decimal.
    #[error("resource {id}: invalid decimal payload {text:?}")]
    InvalidNumber {
        /// Resource carrying the payload.
        id: ResourceId,
        /// Offending payload, lossily decoded for diagnostics.
        text: String,
    },

    /// String payload was not valid UTF-8.
    #[error("resource {id}: string payload is not UTF-8")]
    InvalidText {
        /// Resource carrying the payload.
        id: ResourceId,
    },

    /// Fixed-size payload had the wrong length.
    #[error("resource {id}: payload length {len} invalid for {kind:?}")]
    BadLength {
        /// Resource carrying the payload.
        id: ResourceId,
        /// Payload type expected.
        kind: ValueKind,
        /// Length found on the wire.
        len: usize,
    },

    /// Payload longer than the two-byte length field can carry.
    #[error("resource {id}: payload of {len} bytes exceeds the length field")]
    ValueTooLarge {
        /// Resource carrying the payload.
        id: ResourceId,
        /// Serialised payload length.
        len: usize,
    },

    /// More resources than the two-byte count field can carry.
    #[error("too many resources: {0}")]
    TooManyResources(usize),

    /// Reply frame's direction byte was not `0x02`.
    #[error("reply direction {0:#04x} is not a response")]
    WrongDirection(u8),

    /// Reply frame echoed a different message id than the request carried.
    #[error("reply message id {actual:#04x} does not match request {expected:#04x}")]
    MessageIdMismatch {
        /// Message id the request carried.
        expected: u8,
        /// Message id the reply echoed.
        actual: u8,
    },
}

impl ProtocolError {
    /// CoAP status equivalent of this error, before any caller-facing remap.
    ///
    /// Malformed replies are internal server errors; requests the client
    /// itself could not serialise are bad requests.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::ValueTooLarge { .. } | Self::TooManyResources(_) => Status::BAD_REQUEST,
            _ => Status::INTERNAL_SERVER_ERROR,
        }
    }
}
