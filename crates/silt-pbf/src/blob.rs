//! Blob framing and compression.
//!
//! The on-disk layout repeats `(u32 big-endian length, BlobHeader,
//! blob payload)`. Reading the frame is inherently sequential; the
//! heavy work (inflate, parse) happens on the worker pool with the
//! payload bytes this module hands over.

use std::borrow::Cow;
use std::io::{Read, Write};

use byteorder::{BigEndian, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::PbfError;
use crate::proto::Blob;
use crate::wire::{put_bytes_field, put_int_field, put_str_field};
use crate::{MAX_BLOB_HEADER_SIZE, MAX_UNCOMPRESSED_BLOB_SIZE};

/// A framed blob read from the stream: its type string and payload.
#[derive(Debug)]
pub struct RawBlob {
    /// `"OSMHeader"` or `"OSMData"`.
    pub blob_type: String,
    /// The encoded Blob message bytes.
    pub payload: Vec<u8>,
}

/// Read one `(length, BlobHeader, blob)` frame.
///
/// Returns `Ok(None)` on clean end of stream (zero bytes available
/// before the length field); a partial length field is a format
/// error. The caller checks the returned type string against what the
/// position in the file requires.
pub fn read_blob<R: Read>(source: &mut R) -> Result<Option<RawBlob>, PbfError> {
    // Read the 4-byte length one chunk at a time so clean EOF can be
    // told apart from truncation.
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        match source.read(&mut len_buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(PbfError::format(format!(
                    "truncated frame: got {filled} of 4 length bytes"
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PbfError::Io(e)),
        }
    }
    let header_len = u32::from_be_bytes(len_buf) as usize;
    if header_len > MAX_BLOB_HEADER_SIZE {
        return Err(PbfError::format(format!(
            "BlobHeader length {header_len} exceeds maximum {MAX_BLOB_HEADER_SIZE}"
        )));
    }

    let mut header_buf = vec![0u8; header_len];
    source.read_exact(&mut header_buf)?;
    let header = crate::proto::BlobHeader::decode(&header_buf)?;

    let datasize = header.datasize;
    if datasize < 0 || datasize as usize > MAX_UNCOMPRESSED_BLOB_SIZE {
        return Err(PbfError::format(format!("invalid blob size: {datasize}")));
    }

    let mut payload = vec![0u8; datasize as usize];
    source.read_exact(&mut payload)?;

    Ok(Some(RawBlob {
        blob_type: header.blob_type.to_owned(),
        payload,
    }))
}

/// Parse a blob payload and return its uncompressed content.
///
/// `raw` content is borrowed; zlib content is inflated and must match
/// the advertised `raw_size` exactly. LZMA is reported as unsupported.
pub fn decode_blob_payload(payload: &[u8]) -> Result<Cow<'_, [u8]>, PbfError> {
    match Blob::decode(payload)? {
        Blob::Raw(data) => {
            if data.len() > MAX_UNCOMPRESSED_BLOB_SIZE {
                return Err(PbfError::format(format!(
                    "raw blob of {} bytes exceeds maximum {MAX_UNCOMPRESSED_BLOB_SIZE}",
                    data.len()
                )));
            }
            Ok(Cow::Borrowed(data))
        }
        Blob::Zlib { data, raw_size } => {
            if raw_size < 0 || raw_size as usize > MAX_UNCOMPRESSED_BLOB_SIZE {
                return Err(PbfError::format(format!("invalid raw_size: {raw_size}")));
            }
            let mut inflated = Vec::with_capacity(raw_size as usize);
            ZlibDecoder::new(data)
                .take(MAX_UNCOMPRESSED_BLOB_SIZE as u64 + 1)
                .read_to_end(&mut inflated)
                .map_err(|e| PbfError::format(format!("zlib inflate failed: {e}")))?;
            if inflated.len() != raw_size as usize {
                return Err(PbfError::format(format!(
                    "inflated to {} bytes, raw_size says {raw_size}",
                    inflated.len()
                )));
            }
            Ok(Cow::Owned(inflated))
        }
        Blob::Lzma => Err(PbfError::unsupported("lzma-compressed blobs")),
    }
}

/// How the writer compresses blob payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    /// Store content uncompressed (`raw`).
    None,
    /// Deflate with zlib (the format default).
    #[default]
    Zlib,
}

/// Encode a complete output frame: compress `content` into a Blob,
/// prefix it with a BlobHeader of the given type and the big-endian
/// length field.
pub fn encode_blob_frame(
    blob_type: &str,
    content: &[u8],
    compression: Compression,
) -> Result<Vec<u8>, PbfError> {
    if content.len() > MAX_UNCOMPRESSED_BLOB_SIZE {
        return Err(PbfError::format(format!(
            "block of {} bytes exceeds maximum blob size {MAX_UNCOMPRESSED_BLOB_SIZE}",
            content.len()
        )));
    }

    let mut blob = Vec::new();
    match compression {
        Compression::None => {
            put_bytes_field(&mut blob, 1, content);
        }
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder
                .write_all(content)
                .and_then(|()| encoder.finish())
                .map(|deflated| {
                    put_int_field(&mut blob, 2, content.len() as i64);
                    put_bytes_field(&mut blob, 3, &deflated);
                })
                .map_err(|e| PbfError::format(format!("zlib deflate failed: {e}")))?;
        }
    }

    let mut header = Vec::new();
    put_str_field(&mut header, 1, blob_type);
    put_int_field(&mut header, 3, blob.len() as i64);
    debug_assert!(header.len() <= MAX_BLOB_HEADER_SIZE);

    let mut frame = Vec::with_capacity(4 + header.len() + blob.len());
    frame
        .write_u32::<BigEndian>(header.len() as u32)
        .expect("writing to a Vec cannot fail");
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&blob);
    Ok(frame)
}
