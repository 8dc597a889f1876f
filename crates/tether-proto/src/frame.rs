//! Request and reply frames.
//!
//! A request carries a fixed 8-byte header ahead of its body; a reply echoes
//! the message id and prepends a status byte, for 9 bytes of header. Both are
//! `#[repr(C, packed)]` with raw little-endian byte-array fields so they can
//! be cast to and from wire bytes without copying.
//!
//! Request layout: `direction | message id | object id | instance id |
//! resource count`. A read body is a packed array of resource ids (count 0
//! meaning "all resources"); a write body is the codec's serialisation of
//! the values.
//!
//! Reply layout: `direction | message id | status | object id | instance id |
//! resource count`, followed by the body. The count field is only meaningful
//! for read-shaped replies; a write reply never has its count consumed.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    codec,
    errors::ProtocolError,
    status::Status,
    value::{InstanceId, ObjectId, ResourceId, ResourceValue},
};

/// Direction byte of a request frame.
pub const DIRECTION_REQUEST: u8 = 0x01;

/// Direction byte of a reply frame.
pub const DIRECTION_RESPONSE: u8 = 0x02;

/// Fixed 8-byte request header (little-endian).
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RequestHeader {
    direction: u8,
    message_id: u8,
    object_id: [u8; 2],
    instance_id: [u8; 2],
    resource_count: [u8; 2],
}

impl RequestHeader {
    /// Size of the serialised header.
    pub const SIZE: usize = 8;

    /// Build a request header.
    #[must_use]
    pub fn new(
        message_id: u8,
        object_id: ObjectId,
        instance_id: InstanceId,
        resource_count: u16,
    ) -> Self {
        Self {
            direction: DIRECTION_REQUEST,
            message_id,
            object_id: object_id.to_le_bytes(),
            instance_id: instance_id.to_le_bytes(),
            resource_count: resource_count.to_le_bytes(),
        }
    }

    /// Serialise to wire bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(IntoBytes::as_bytes(self));
        out
    }
}

/// Fixed 9-byte reply header (little-endian).
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ReplyHeader {
    direction: u8,
    message_id: u8,
    status: u8,
    object_id: [u8; 2],
    instance_id: [u8; 2],
    resource_count: [u8; 2],
}

impl ReplyHeader {
    /// Size of the serialised header.
    pub const SIZE: usize = 9;

    /// Status byte reported by the controller.
    #[must_use]
    pub fn status(&self) -> Status {
        Status::from_byte(self.status)
    }

    /// Object id echoed by the controller.
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        u16::from_le_bytes(self.object_id)
    }

    /// Instance id echoed by the controller.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        u16::from_le_bytes(self.instance_id)
    }

    /// Number of resources the reply body carries.
    #[must_use]
    pub fn resource_count(&self) -> u16 {
        u16::from_le_bytes(self.resource_count)
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for ReplyHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyHeader")
            .field("direction", &self.direction)
            .field("message_id", &self.message_id)
            .field("status", &self.status())
            .field("object_id", &self.object_id())
            .field("instance_id", &self.instance_id())
            .field("resource_count", &self.resource_count())
            .finish()
    }
}

/// Build a read request: header plus a packed array of resource ids.
///
/// An empty `ids` slice asks for all resources; the reply determines the
/// count.
///
/// # Errors
///
/// `ProtocolError::TooManyResources` if `ids` exceeds the count field.
pub fn read_request(
    message_id: u8,
    object_id: ObjectId,
    instance_id: InstanceId,
    ids: &[ResourceId],
) -> Result<Vec<u8>, ProtocolError> {
    let count = u16::try_from(ids.len()).map_err(|_| ProtocolError::TooManyResources(ids.len()))?;
    let mut frame = Vec::with_capacity(RequestHeader::SIZE + ids.len() * 2);
    frame.extend_from_slice(&RequestHeader::new(message_id, object_id, instance_id, count).to_bytes());
    for id in ids {
        frame.extend_from_slice(&id.to_le_bytes());
    }
    Ok(frame)
}

/// Build a write (or create) request: header plus serialised values.
///
/// # Errors
///
/// `ProtocolError` if the values exceed the count field or a payload exceeds
/// its length field.
pub fn write_request(
    message_id: u8,
    object_id: ObjectId,
    instance_id: InstanceId,
    values: &[ResourceValue],
) -> Result<Vec<u8>, ProtocolError> {
    let count =
        u16::try_from(values.len()).map_err(|_| ProtocolError::TooManyResources(values.len()))?;
    let mut frame = Vec::with_capacity(RequestHeader::SIZE + codec::encoded_len(values));
    frame.extend_from_slice(&RequestHeader::new(message_id, object_id, instance_id, count).to_bytes());
    codec::encode(values, &mut frame)?;
    Ok(frame)
}

/// A validated reply frame borrowing the decoded response buffer.
#[derive(Debug)]
pub struct Reply<'a> {
    header: &'a ReplyHeader,
    /// Body bytes following the 9-byte header.
    pub body: &'a [u8],
}

impl<'a> Reply<'a> {
    /// Validate a reply's header and split off its body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Truncated` if fewer than 9 bytes arrived.
    /// - `ProtocolError::WrongDirection` if the direction byte is not `0x02`.
    /// - `ProtocolError::MessageIdMismatch` if the echoed message id differs
    ///   from the request's.
    pub fn parse(bytes: &'a [u8], expected_message_id: u8) -> Result<Self, ProtocolError> {
        let (header, body) = ReplyHeader::ref_from_prefix(bytes).map_err(|_| {
            ProtocolError::Truncated { expected: ReplyHeader::SIZE, actual: bytes.len() }
        })?;
        if header.direction != DIRECTION_RESPONSE {
            return Err(ProtocolError::WrongDirection(header.direction));
        }
        if header.message_id != expected_message_id {
            return Err(ProtocolError::MessageIdMismatch {
                expected: expected_message_id,
                actual: header.message_id,
            });
        }
        Ok(Self { header, body })
    }

    /// Status byte reported by the controller.
    #[must_use]
    pub fn status(&self) -> Status {
        self.header.status()
    }

    /// Object id echoed by the controller.
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.header.object_id()
    }

    /// Instance id echoed by the controller.
    #[must_use]
    pub fn instance_id(&self) -> InstanceId {
        self.header.instance_id()
    }

    /// Number of resources the reply body carries.
    #[must_use]
    pub fn resource_count(&self) -> u16 {
        self.header.resource_count()
    }

    /// Decode the body into resource values using the reply's own count.
    ///
    /// # Errors
    ///
    /// `ProtocolError` if the body is truncated or malformed.
    pub fn values(&self) -> Result<Vec<ResourceValue>, ProtocolError> {
        codec::decode_values(self.body, self.resource_count())
    }
}
