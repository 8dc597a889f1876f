//! TLV codec for resource value vectors.
//!
//! Each resource serialises as `id (2) | tag (1) | length (2) | payload`,
//! little-endian throughout. A multiple resource's payload is a two-byte
//! child count followed by child resources in the same grammar, recursively.
//!
//! # Invariants
//!
//! - `encoded_len(values)` and `encode(values, buf)` agree exactly on the
//!   byte count produced.
//! - `decode_values(encode(values), n)` reproduces `values` for every
//!   well-formed vector, nested multiples included.

use bytes::BufMut;

use crate::{
    errors::ProtocolError,
    value::{ResourceValue, Value, ValueKind},
};

/// Fixed per-resource overhead: id (2) + tag (1) + length (2).
const RESOURCE_OVERHEAD: usize = 5;

/// Byte length `encode` will produce for `values`.
#[must_use]
pub fn encoded_len(values: &[ResourceValue]) -> usize {
    values.iter().map(|rv| RESOURCE_OVERHEAD + payload_len(&rv.value)).sum()
}

fn payload_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.len(),
        Value::Opaque(bytes) => bytes.len(),
        // Decimal text length, sign included; the write side renders the
        // same string so the two always agree.
        Value::Integer(n) => n.to_string().len(),
        Value::Float(x) => x.to_string().len(),
        Value::Boolean(_) => 1,
        Value::ObjectLink { .. } => 4,
        Value::Multiple(children) => 2 + encoded_len(children),
    }
}

/// Serialise `values` into `dst`, returning the bytes written.
///
/// # Errors
///
/// - `ProtocolError::ValueTooLarge` if a payload exceeds the two-byte length
///   field.
/// - `ProtocolError::TooManyResources` if a multiple resource has more
///   children than the two-byte count field can carry.
pub fn encode(values: &[ResourceValue], dst: &mut impl BufMut) -> Result<usize, ProtocolError> {
    let mut written = 0;
    for rv in values {
        let len = payload_len(&rv.value);
        let wire_len =
            u16::try_from(len).map_err(|_| ProtocolError::ValueTooLarge { id: rv.id, len })?;

        dst.put_u16_le(rv.id);
        dst.put_u8(rv.value.kind().to_u8());
        dst.put_u16_le(wire_len);

        match &rv.value {
            Value::String(s) => dst.put_slice(s.as_bytes()),
            Value::Opaque(bytes) => dst.put_slice(bytes),
            Value::Integer(n) => dst.put_slice(n.to_string().as_bytes()),
            Value::Float(x) => dst.put_slice(x.to_string().as_bytes()),
            Value::Boolean(b) => dst.put_u8(u8::from(*b)),
            Value::ObjectLink { object_id, instance_id } => {
                dst.put_u16_le(*object_id);
                dst.put_u16_le(*instance_id);
            },
            Value::Multiple(children) => {
                let count = u16::try_from(children.len())
                    .map_err(|_| ProtocolError::TooManyResources(children.len()))?;
                dst.put_u16_le(count);
                encode(children, dst)?;
            },
        }

        written += RESOURCE_OVERHEAD + len;
    }
    Ok(written)
}

/// Parse exactly `count` resources from `bytes`.
///
/// Trailing bytes beyond the requested count are ignored; the reply header's
/// count field, not the payload length, delimits the vector.
///
/// # Errors
///
/// `ProtocolError` on truncation, unknown tags, malformed decimal payloads,
/// invalid UTF-8 or wrong fixed-size payload lengths.
pub fn decode_values(bytes: &[u8], count: u16) -> Result<Vec<ResourceValue>, ProtocolError> {
    decode_from(&mut Reader::new(bytes), count)
}

fn decode_from(reader: &mut Reader<'_>, count: u16) -> Result<Vec<ResourceValue>, ProtocolError> {
    let mut values = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        values.push(decode_one(reader)?);
    }
    Ok(values)
}

fn decode_one(reader: &mut Reader<'_>) -> Result<ResourceValue, ProtocolError> {
    let id = reader.read_u16_le()?;
    let tag = reader.read_u8()?;
    let kind = ValueKind::from_u8(tag).ok_or(ProtocolError::UnknownKind(tag))?;
    let len = usize::from(reader.read_u16_le()?);
    let payload = reader.take(len)?;

    let value = match kind {
        ValueKind::String => {
            let text = std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidText { id })?;
            Value::String(text.to_owned())
        },
        ValueKind::Opaque => Value::Opaque(payload.to_vec()),
        ValueKind::Integer => Value::Integer(parse_decimal(id, payload)?),
        ValueKind::Float => Value::Float(parse_decimal(id, payload)?),
        ValueKind::Boolean => match payload {
            &[byte] => Value::Boolean(byte == 0x01),
            _ => return Err(ProtocolError::BadLength { id, kind, len }),
        },
        ValueKind::ObjectLink => match payload {
            &[a, b, c, d] => Value::ObjectLink {
                object_id: u16::from_le_bytes([a, b]),
                instance_id: u16::from_le_bytes([c, d]),
            },
            _ => return Err(ProtocolError::BadLength { id, kind, len }),
        },
        ValueKind::Multiple => {
            let mut inner = Reader::new(payload);
            let child_count = inner.read_u16_le()?;
            Value::Multiple(decode_from(&mut inner, child_count)?)
        },
    };

    Ok(ResourceValue { id, value })
}

fn parse_decimal<T: std::str::FromStr>(
    id: u16,
    payload: &[u8],
) -> Result<T, ProtocolError> {
    let malformed = || ProtocolError::InvalidNumber {
        id,
        text: String::from_utf8_lossy(payload).into_owned(),
    };
    let text = std::str::from_utf8(payload).map_err(|_| malformed())?;
    text.parse().map_err(|_| malformed())
}

/// Bounds-checked cursor over a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos.checked_add(n).ok_or(ProtocolError::Truncated {
            expected: n,
            actual: self.bytes.len().saturating_sub(self.pos),
        })?;
        let slice = self.bytes.get(self.pos..end).ok_or(ProtocolError::Truncated {
            expected: n,
            actual: self.bytes.len().saturating_sub(self.pos),
        })?;
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        match self.take(1)? {
            &[byte] => Ok(byte),
            _ => Err(ProtocolError::Truncated { expected: 1, actual: 0 }),
        }
    }

    fn read_u16_le(&mut self) -> Result<u16, ProtocolError> {
        match self.take(2)? {
            &[a, b] => Ok(u16::from_le_bytes([a, b])),
            _ => Err(ProtocolError::Truncated { expected: 2, actual: 0 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(values: &[ResourceValue]) -> Vec<ResourceValue> {
        let mut wire = Vec::new();
        let written = encode(values, &mut wire).expect("should encode");
        assert_eq!(written, wire.len());
        assert_eq!(written, encoded_len(values));
        decode_values(&wire, values.len() as u16).expect("should decode")
    }

    #[test]
    fn integer_wire_form() {
        let values = [ResourceValue::new(5, Value::Integer(42))];
        let mut wire = Vec::new();
        encode(&values, &mut wire).expect("should encode");
        assert_eq!(wire, [0x05, 0x00, 0x01, 0x02, 0x00, b'4', b'2']);
    }

    #[test]
    fn object_link_wire_form() {
        let values =
            [ResourceValue::new(10, Value::ObjectLink { object_id: 3, instance_id: 7 })];
        let mut wire = Vec::new();
        encode(&values, &mut wire).expect("should encode");
        assert_eq!(wire, [0x0A, 0x00, 0x06, 0x04, 0x00, 0x03, 0x00, 0x07, 0x00]);
    }

    #[test]
    fn scalar_round_trips() {
        let values = vec![
            ResourceValue::new(0, Value::String("abc".into())),
            ResourceValue::new(1, Value::Boolean(true)),
            ResourceValue::new(2, Value::Integer(-1234)),
            ResourceValue::new(3, Value::Float(2.5)),
            ResourceValue::new(4, Value::Opaque(vec![0x00, 0xFF, 0x7E])),
            ResourceValue::new(5, Value::ObjectLink { object_id: 1, instance_id: 2 }),
        ];
        assert_eq!(round_trip(&values), values);
    }

    #[test]
    fn nested_multiple_round_trips() {
        let children =
            vec![ResourceValue::new(0, Value::Integer(1)), ResourceValue::new(1, Value::Integer(2))];
        let values = [ResourceValue::new(7, Value::Multiple(children))];
        assert_eq!(round_trip(&values), values);
    }

    #[test]
    fn nested_multiple_wire_form() {
        // id 7 | tag 05 | len 14 | child count 2 | two integer children
        let values = [ResourceValue::new(
            7,
            Value::Multiple(vec![
                ResourceValue::new(0, Value::Integer(1)),
                ResourceValue::new(1, Value::Integer(2)),
            ]),
        )];
        let mut wire = Vec::new();
        encode(&values, &mut wire).expect("should encode");
        assert_eq!(
            wire,
            [
                0x07, 0x00, 0x05, 0x0E, 0x00, // outer resource, 14-byte payload
                0x02, 0x00, // child count
                0x00, 0x00, 0x01, 0x01, 0x00, b'1', // child 0
                0x01, 0x00, 0x01, 0x01, 0x00, b'2', // child 1
            ]
        );
        // Re-encoding the decoded tree reproduces the original bytes.
        let decoded = decode_values(&wire, 1).expect("should decode");
        let mut again = Vec::new();
        encode(&decoded, &mut again).expect("should re-encode");
        assert_eq!(again, wire);
    }

    #[test]
    fn empty_vector_is_empty_wire() {
        assert_eq!(encoded_len(&[]), 0);
        let mut wire = Vec::new();
        assert_eq!(encode(&[], &mut wire).expect("should encode"), 0);
        assert!(wire.is_empty());
        assert!(decode_values(&[], 0).expect("should decode").is_empty());
    }

    #[test]
    fn reject_truncated_payload() {
        // Claims a 5-byte payload but carries 2.
        let wire = [0x05, 0x00, 0x00, 0x05, 0x00, b'a', b'b'];
        let err = decode_values(&wire, 1).expect_err("should reject");
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }

    #[test]
    fn reject_unknown_tag() {
        let wire = [0x05, 0x00, 0x09, 0x01, 0x00, 0x00];
        assert_eq!(decode_values(&wire, 1), Err(ProtocolError::UnknownKind(0x09)));
    }

    #[test]
    fn reject_malformed_digits() {
        let wire = [0x05, 0x00, 0x01, 0x02, 0x00, b'4', b'x'];
        let err = decode_values(&wire, 1).expect_err("should reject");
        assert!(matches!(err, ProtocolError::InvalidNumber { id: 5, .. }));
    }

    #[test]
    fn reject_bad_boolean_length() {
        let wire = [0x05, 0x00, 0x03, 0x02, 0x00, 0x01, 0x01];
        let err = decode_values(&wire, 1).expect_err("should reject");
        assert!(matches!(err, ProtocolError::BadLength { kind: ValueKind::Boolean, .. }));
    }

    #[test]
    fn reject_short_count() {
        // Two resources promised, one present.
        let wire = [0x05, 0x00, 0x03, 0x01, 0x00, 0x01];
        let err = decode_values(&wire, 2).expect_err("should reject");
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut wire = Vec::new();
        encode(&[ResourceValue::new(1, Value::Boolean(false))], &mut wire)
            .expect("should encode");
        wire.extend_from_slice(&[0xAA, 0xBB]);
        let decoded = decode_values(&wire, 1).expect("should decode");
        assert_eq!(decoded, vec![ResourceValue::new(1, Value::Boolean(false))]);
    }
}
