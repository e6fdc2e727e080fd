//! Append-only entity arena for the silt OSM data library.
//!
//! Decoded OSM entities are materialised into [`Buffer`]s: contiguous,
//! 8-byte-aligned byte regions that downstream consumers iterate
//! without per-entity allocation. Builders append well-formed records
//! under strict size and padding invariants; typed views read them
//! back without copying.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod builder;
pub mod error;
pub mod item;
pub(crate) mod layout;

pub use buffer::{Buffer, GrowPolicy, ItemIter};
pub use builder::{
    AreaBuilder, ChangesetBuilder, NodeBuilder, NodeRefListBuilder, RelationBuilder,
    RelationMemberListBuilder, TagListBuilder, WayBuilder,
};
pub use error::ArenaError;
pub use item::{
    Area, Changeset, Item, MemberIter, Node, NodeRef, NodeRefIter, Relation, RelationMemberRef,
    RingIter, TagIter, Way,
};
