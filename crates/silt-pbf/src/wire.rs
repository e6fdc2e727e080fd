//! Hand-written protobuf wire codec.
//!
//! The PBF message set is small and stable, so the pipeline parses the
//! wire format directly instead of going through generated code: the
//! reader walks `(field number, wire value)` pairs over a borrowed
//! byte slice with no copying, and the writer appends tagged fields to
//! a `Vec<u8>`. Only the wire types the PBF format uses are supported.

use crate::error::PbfError;
use smallvec::SmallVec;

/// Maximum encoded length of a 64-bit varint.
const MAX_VARINT_LEN: usize = 10;

/// Wire type 0: varint.
const WIRE_VARINT: u8 = 0;
/// Wire type 1: 64-bit fixed.
const WIRE_FIXED64: u8 = 1;
/// Wire type 2: length-delimited.
const WIRE_LEN: u8 = 2;
/// Wire type 5: 32-bit fixed.
const WIRE_FIXED32: u8 = 5;

/// One decoded field value, borrowing length-delimited payloads from
/// the input.
#[derive(Clone, Copy, Debug)]
pub enum WireValue<'a> {
    /// Wire type 0.
    Varint(u64),
    /// Wire type 1.
    Fixed64(u64),
    /// Wire type 2: bytes, strings, sub-messages, packed arrays.
    Bytes(&'a [u8]),
    /// Wire type 5.
    Fixed32(u32),
}

impl<'a> WireValue<'a> {
    /// The raw varint payload.
    pub fn as_u64(&self) -> Result<u64, PbfError> {
        match self {
            Self::Varint(v) => Ok(*v),
            _ => Err(PbfError::format("expected varint field")),
        }
    }

    /// The varint payload as a plain (two's-complement) signed value.
    pub fn as_i64(&self) -> Result<i64, PbfError> {
        Ok(self.as_u64()? as i64)
    }

    /// The varint payload as a plain signed 32-bit value.
    pub fn as_i32(&self) -> Result<i32, PbfError> {
        Ok(self.as_u64()? as i32)
    }

    /// The varint payload zigzag-decoded (`sint64`).
    pub fn as_sint64(&self) -> Result<i64, PbfError> {
        Ok(zigzag_decode(self.as_u64()?))
    }

    /// The varint payload as a bool.
    pub fn as_bool(&self) -> Result<bool, PbfError> {
        Ok(self.as_u64()? != 0)
    }

    /// The length-delimited payload.
    pub fn as_bytes(&self) -> Result<&'a [u8], PbfError> {
        match self {
            Self::Bytes(b) => Ok(b),
            _ => Err(PbfError::format("expected length-delimited field")),
        }
    }

    /// The length-delimited payload as UTF-8.
    pub fn as_str(&self) -> Result<&'a str, PbfError> {
        std::str::from_utf8(self.as_bytes()?)
            .map_err(|_| PbfError::format("string field is not valid UTF-8"))
    }
}

/// Decoder over the fields of one protobuf message.
#[derive(Clone, Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Wrap an encoded message.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next `(field number, value)` pair, or `None` at the
    /// end of the message.
    pub fn next_field(&mut self) -> Result<Option<(u32, WireValue<'a>)>, PbfError> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let key = self.read_varint()?;
        let field = (key >> 3) as u32;
        if field == 0 {
            return Err(PbfError::format("field number 0 is reserved"));
        }
        let value = match (key & 0x7) as u8 {
            WIRE_VARINT => WireValue::Varint(self.read_varint()?),
            WIRE_FIXED64 => WireValue::Fixed64(u64::from_le_bytes(
                self.read_array::<8>()?,
            )),
            WIRE_LEN => {
                let len = self.read_varint()? as usize;
                WireValue::Bytes(self.read_slice(len)?)
            }
            WIRE_FIXED32 => WireValue::Fixed32(u32::from_le_bytes(
                self.read_array::<4>()?,
            )),
            wire_type => {
                return Err(PbfError::format(format!(
                    "unsupported wire type {wire_type} in field {field}"
                )));
            }
        };
        Ok(Some((field, value)))
    }

    fn read_varint(&mut self) -> Result<u64, PbfError> {
        let mut value = 0u64;
        for shift in 0..MAX_VARINT_LEN {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| PbfError::format("truncated varint"))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << (shift * 7);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(PbfError::format("varint longer than 10 bytes"))
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], PbfError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| PbfError::format("length-delimited field exceeds message"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], PbfError> {
        let slice = self.read_slice(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(slice);
        Ok(array)
    }
}

/// Decode the elements of a packed varint payload.
///
/// Protobuf permits a repeated scalar field to arrive packed (one
/// length-delimited payload) or expanded (one tag per element), so
/// message decoders call this for `Bytes` values and push single
/// elements for `Varint` values.
pub fn packed_varints(data: &[u8]) -> PackedVarints<'_> {
    PackedVarints {
        reader: WireReader::new(data),
    }
}

/// Iterator over a packed varint payload.
#[derive(Clone, Debug)]
pub struct PackedVarints<'a> {
    reader: WireReader<'a>,
}

impl Iterator for PackedVarints<'_> {
    type Item = Result<u64, PbfError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.pos >= self.reader.data.len() {
            return None;
        }
        Some(self.reader.read_varint())
    }
}

/// Zigzag-decode a `sint32`/`sint64` varint payload.
pub fn zigzag_decode(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Zigzag-encode a signed value for a `sint32`/`sint64` field.
pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

// ── Encoding ────────────────────────────────────────────────────

/// Encode a varint into a small inline buffer.
fn varint_bytes(mut v: u64) -> SmallVec<[u8; MAX_VARINT_LEN]> {
    let mut out = SmallVec::new();
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Append a bare varint.
pub fn put_varint(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&varint_bytes(v));
}

fn put_key(out: &mut Vec<u8>, field: u32, wire_type: u8) {
    put_varint(out, (u64::from(field) << 3) | u64::from(wire_type));
}

/// Append a varint field (`int32`/`int64`/`uint32`/`uint64`/`bool`).
pub fn put_uint_field(out: &mut Vec<u8>, field: u32, v: u64) {
    put_key(out, field, WIRE_VARINT);
    put_varint(out, v);
}

/// Append a plain signed varint field (`int32`/`int64`).
pub fn put_int_field(out: &mut Vec<u8>, field: u32, v: i64) {
    put_uint_field(out, field, v as u64);
}

/// Append a zigzag-encoded field (`sint32`/`sint64`).
pub fn put_sint_field(out: &mut Vec<u8>, field: u32, v: i64) {
    put_uint_field(out, field, zigzag_encode(v));
}

/// Append a length-delimited field (bytes, string, or an encoded
/// sub-message).
pub fn put_bytes_field(out: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    put_key(out, field, WIRE_LEN);
    put_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Append a string field.
pub fn put_str_field(out: &mut Vec<u8>, field: u32, s: &str) {
    put_bytes_field(out, field, s.as_bytes());
}

/// Append a packed varint field from already-mapped raw values.
pub fn put_packed_field(out: &mut Vec<u8>, field: u32, values: impl Iterator<Item = u64>) {
    let mut payload = Vec::new();
    for v in values {
        put_varint(&mut payload, v);
    }
    put_bytes_field(out, field, &payload);
}
