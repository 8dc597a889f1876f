//! Wire format for the tether controller bridge.
//!
//! An embedded LWM2M client forwards every resource operation to its parent
//! controller as a compact binary frame. This crate owns that format and
//! nothing else: typed resource values, the TLV codec that serialises them,
//! the fixed request/reply headers, and the CoAP status codes the outcomes
//! map to.
//!
//! Transport (base64 line framing over stdio) and operation orchestration
//! live in `tether-client`; this crate is pure data and stays I/O free.
//!
//! All multi-byte integers on the wire are little-endian.

mod codec;
mod errors;
mod frame;
mod status;
mod value;

pub use codec::{decode_values, encode, encoded_len};
pub use errors::ProtocolError;
pub use frame::{
    DIRECTION_REQUEST, DIRECTION_RESPONSE, Reply, ReplyHeader, RequestHeader, read_request,
    write_request,
};
pub use status::Status;
pub use value::{InstanceId, ObjectId, ResourceId, ResourceValue, Value, ValueKind};
