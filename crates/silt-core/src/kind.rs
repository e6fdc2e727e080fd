//! The entity-kind discriminant stored with every arena item.

use std::fmt;

/// Identifies the kind of an item stored in an arena buffer.
///
/// The numeric value is the 1-byte discriminant written into the item
/// header on the arena, so it is part of the in-memory format. Values
/// below `0x10` are top-level entities; values at `0x10` and above are
/// sub-items that only ever appear nested inside an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ItemKind {
    /// A point with coordinates.
    Node = 0x01,
    /// An ordered list of node references.
    Way = 0x02,
    /// A group of typed, role-tagged members.
    Relation = 0x03,
    /// A closed polygon assembled from ways or a relation.
    Area = 0x04,
    /// An edit-session record.
    Changeset = 0x05,
    /// Key/value string pairs attached to an entity.
    TagList = 0x11,
    /// The node references of a way.
    WayNodeList = 0x12,
    /// The members of a relation.
    RelationMemberList = 0x13,
    /// An outer ring of an area.
    OuterRing = 0x14,
    /// An inner ring (hole) of an area.
    InnerRing = 0x15,
}

impl ItemKind {
    /// Decode a discriminant byte read from an arena buffer.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Node),
            0x02 => Some(Self::Way),
            0x03 => Some(Self::Relation),
            0x04 => Some(Self::Area),
            0x05 => Some(Self::Changeset),
            0x11 => Some(Self::TagList),
            0x12 => Some(Self::WayNodeList),
            0x13 => Some(Self::RelationMemberList),
            0x14 => Some(Self::OuterRing),
            0x15 => Some(Self::InnerRing),
            _ => None,
        }
    }

    /// The discriminant byte written into the item header.
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    /// Whether this kind is a top-level entity (as opposed to a
    /// sub-item nested inside one).
    pub const fn is_entity(self) -> bool {
        (self as u8) < 0x10
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
            Self::Area => "area",
            Self::Changeset => "changeset",
            Self::TagList => "tag_list",
            Self::WayNodeList => "way_node_list",
            Self::RelationMemberList => "relation_member_list",
            Self::OuterRing => "outer_ring",
            Self::InnerRing => "inner_ring",
        };
        f.write_str(name)
    }
}
