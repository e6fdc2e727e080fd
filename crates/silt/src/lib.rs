//! Silt: streaming access to OpenStreetMap data in the PBF format.
//!
//! This is the top-level facade crate that re-exports the public API
//! from the silt sub-crates. For most users, adding `silt` as a
//! single dependency is sufficient.
//!
//! # Quick start
//!
//! ```no_run
//! use silt::prelude::*;
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! # fn main() -> Result<(), silt::pbf::PbfError> {
//! let file = BufReader::new(File::open("extract.osm.pbf").expect("open file"));
//! let mut reader = PbfReader::open(file, ReadTypes::NODE | ReadTypes::WAY)?;
//!
//! let mut nodes = 0u64;
//! while let Some(buffer) = reader.next_buffer()? {
//!     for item in buffer.items() {
//!         if let Item::Node(_) = item {
//!             nodes += 1;
//!         }
//!     }
//! }
//! println!("{nodes} nodes");
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in
//! the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `silt-core` | Locations, entity kinds, read masks, bounding boxes |
//! | [`arena`] | `silt-arena` | Buffers, builders, typed item views |
//! | [`pbf`] | `silt-pbf` | The PBF reader and writer pipeline |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types: locations, kinds, read masks (`silt-core`).
pub use silt_core as types;

/// Arena buffers, builders, and item views (`silt-arena`).
pub use silt_arena as arena;

/// The PBF reader and writer pipeline (`silt-pbf`).
pub use silt_pbf as pbf;

/// Common imports for typical silt usage.
///
/// ```rust
/// use silt::prelude::*;
/// ```
pub mod prelude {
    pub use silt_arena::{
        AreaBuilder, Buffer, ChangesetBuilder, GrowPolicy, Item, NodeBuilder, NodeRef,
        RelationBuilder, WayBuilder,
    };
    pub use silt_core::{BoundingBox, ItemKind, Location, ReadTypes};
    pub use silt_pbf::{Compression, Header, PbfError, PbfReader, PbfWriter};
}
