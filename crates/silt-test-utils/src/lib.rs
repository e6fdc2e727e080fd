//! Test fixtures for silt development.
//!
//! Provides a deliberately independent protobuf writer and PBF file
//! builder so tests can construct wire bytes without going through
//! the production encoder. A test that feeds the reader bytes built
//! here exercises the real parsing path, not an encode/decode pair
//! that could hide a shared mistake.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod wire;

use byteorder::{BigEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use std::io::Write;

/// Builds a PBF byte stream frame by frame.
///
/// Content is framed as uncompressed (`raw`) blobs unless a zlib
/// variant is requested, and arbitrary blob types can be emitted to
/// provoke format errors.
#[derive(Debug, Default)]
pub struct FileBuilder {
    bytes: Vec<u8>,
}

impl FileBuilder {
    /// Start an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an `OSMHeader` frame with the given HeaderBlock bytes.
    pub fn header_block(mut self, content: &[u8]) -> Self {
        self.push_frame("OSMHeader", &raw_blob(content));
        self
    }

    /// Append an `OSMData` frame with the given PrimitiveBlock bytes,
    /// stored raw.
    pub fn data_block(mut self, content: &[u8]) -> Self {
        self.push_frame("OSMData", &raw_blob(content));
        self
    }

    /// Append an `OSMData` frame with the given PrimitiveBlock bytes,
    /// zlib-compressed.
    pub fn data_block_zlib(mut self, content: &[u8]) -> Self {
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(content).expect("writing to a Vec");
        let deflated = encoder.finish().expect("finishing an in-memory stream");

        let mut blob = Vec::new();
        wire::int_field(&mut blob, 2, content.len() as i64);
        wire::bytes_field(&mut blob, 3, &deflated);
        self.push_frame("OSMData", &blob);
        self
    }

    /// Append a frame whose blob claims LZMA compression.
    pub fn data_block_lzma(mut self) -> Self {
        let mut blob = Vec::new();
        wire::bytes_field(&mut blob, 4, b"opaque");
        self.push_frame("OSMData", &blob);
        self
    }

    /// Append a frame with an arbitrary blob type string.
    pub fn frame_with_type(mut self, blob_type: &str, content: &[u8]) -> Self {
        self.push_frame(blob_type, &raw_blob(content));
        self
    }

    /// The assembled byte stream.
    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    fn push_frame(&mut self, blob_type: &str, blob: &[u8]) {
        let mut header = Vec::new();
        wire::str_field(&mut header, 1, blob_type);
        wire::int_field(&mut header, 3, blob.len() as i64);

        self.bytes
            .write_u32::<BigEndian>(header.len() as u32)
            .expect("writing to a Vec");
        self.bytes.extend_from_slice(&header);
        self.bytes.extend_from_slice(blob);
    }
}

fn raw_blob(content: &[u8]) -> Vec<u8> {
    let mut blob = Vec::new();
    wire::bytes_field(&mut blob, 1, content);
    blob
}

/// Encode a HeaderBlock with the given required features and writing
/// program.
pub fn header_block(required_features: &[&str], writingprogram: Option<&str>) -> Vec<u8> {
    let mut out = Vec::new();
    for feature in required_features {
        wire::str_field(&mut out, 4, feature);
    }
    if let Some(program) = writingprogram {
        wire::str_field(&mut out, 16, program);
    }
    out
}

/// Encode a stringtable message from the given entries. Index 0
/// should be the empty sentinel string.
pub fn stringtable(entries: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        wire::bytes_field(&mut out, 1, entry.as_bytes());
    }
    out
}

/// Wrap a stringtable and encoded groups into a PrimitiveBlock with
/// default granularity and offsets.
pub fn primitive_block(strings: &[&str], groups: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    wire::bytes_field(&mut out, 1, &stringtable(strings));
    for group in groups {
        wire::bytes_field(&mut out, 2, group);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_length_prefixed() {
        let stream = FileBuilder::new()
            .header_block(&header_block(&["OsmSchema-V0.6"], Some("test")))
            .build();

        let header_len =
            u32::from_be_bytes([stream[0], stream[1], stream[2], stream[3]]) as usize;
        assert!(header_len > 0);
        assert!(stream.len() > 4 + header_len);
    }

    #[test]
    fn zlib_block_deflates() {
        let content = vec![7u8; 4096];
        let stream = FileBuilder::new().data_block_zlib(&content).build();
        // Compressed stream of repeated bytes must be much smaller
        // than the content plus framing.
        assert!(stream.len() < content.len() / 2);
    }
}
