//! OSM PBF reading and writing for the silt OSM data library.
//!
//! The read path is a bounded producer/consumer pipeline: a framing
//! thread splits the file into length-prefixed blobs, a worker pool
//! decompresses and decodes each blob into an arena [`Buffer`], and a
//! sorted reorder queue hands the buffers to the caller in file order.
//! The write path mirrors it: encoder workers turn buffers into
//! compressed blobs, the reorder queue restores submission order, and
//! a dedicated I/O thread drains frames to the sink.
//!
//! # Architecture
//!
//! - [`PbfReader`] drives the framing thread, worker pool, and reorder
//!   queue; [`PbfReader::next_buffer`] blocks for the next in-order
//!   buffer
//! - [`PbfWriter`] batches items, encodes blocks on the pool, and
//!   writes frames from its I/O thread
//! - All protobuf parsing uses a hand-written zero-copy wire codec
//!
//! [`Buffer`]: silt_arena::Buffer

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod blob;
pub mod decode;
pub mod encode;
pub mod error;
pub mod header;
pub mod pool;
pub mod proto;
pub mod reader;
pub mod sorted_queue;
pub mod wire;
pub mod writer;

pub use blob::Compression;
pub use error::PbfError;
pub use header::Header;
pub use reader::{BufferIter, PbfReader};
pub use writer::PbfWriter;

/// Maximum encoded size of a BlobHeader message, per the PBF format.
pub const MAX_BLOB_HEADER_SIZE: usize = 64 * 1024;

/// Maximum size of a blob payload before and after decompression, per
/// the PBF format.
pub const MAX_UNCOMPRESSED_BLOB_SIZE: usize = 32 * 1024 * 1024;

/// Nanodegrees per degree: the resolution PBF coordinates are defined
/// against before granularity scaling.
pub const LONLAT_RESOLUTION: i64 = 1_000_000_000;

/// Divisor converting granularity-scaled nanodegrees to the canonical
/// 10⁻⁷-degree precision.
pub const RESOLUTION_DIVISOR: i64 = LONLAT_RESOLUTION / silt_core::location::COORDINATE_PRECISION;

/// BlobHeader type string of the single leading header blob.
pub const BLOB_TYPE_HEADER: &str = "OSMHeader";

/// BlobHeader type string of every data blob.
pub const BLOB_TYPE_DATA: &str = "OSMData";
