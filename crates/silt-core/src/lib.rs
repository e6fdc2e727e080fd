//! Core types for the silt OSM data library.
//!
//! This is the leaf crate with zero internal silt dependencies. It
//! defines the fundamental vocabulary shared by the arena and the PBF
//! pipeline: fixed-point coordinates, the entity-kind discriminant,
//! the read-type mask, and bounding boxes.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bbox;
pub mod kind;
pub mod location;
pub mod types;

pub use bbox::BoundingBox;
pub use kind::ItemKind;
pub use location::Location;
pub use types::{ObjectId, ReadTypes, Timestamp};
