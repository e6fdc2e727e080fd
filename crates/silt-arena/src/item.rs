//! Read-only typed views over items stored in a [`Buffer`].
//!
//! A view is a thin wrapper over the item's byte slice; all accessors
//! decode on the fly and no allocation happens during iteration.
//! Polymorphism over the entity kinds is provided by the [`Item`]
//! enum, which the buffer iterator yields after decoding the kind
//! discriminant.
//!
//! [`Buffer`]: crate::buffer::Buffer

use crate::layout::{self, align_up};
use silt_core::{ItemKind, Location, ObjectId, Timestamp};

/// A reference to a node: its id and (possibly undefined) location.
///
/// This is the decoded form of the 16-byte record stored in way-node
/// lists and rings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeRef {
    /// The referenced node id.
    pub id: ObjectId,
    /// The node location, undefined when not filled in.
    pub location: Location,
}

/// One relation member: kind, target id, role, and the optional
/// attached full copy of the referenced object.
#[derive(Clone, Debug)]
pub struct RelationMemberRef<'a> {
    /// The kind of the referenced object.
    pub kind: ItemKind,
    /// The referenced object id.
    pub id: ObjectId,
    /// The member role, possibly empty.
    pub role: &'a str,
    /// The full member item, when one was attached at build time.
    pub full: Option<Item<'a>>,
}

/// A typed view of one item in a buffer.
#[derive(Clone, Debug)]
pub enum Item<'a> {
    /// A node entity.
    Node(Node<'a>),
    /// A way entity.
    Way(Way<'a>),
    /// A relation entity.
    Relation(Relation<'a>),
    /// An area entity.
    Area(Area<'a>),
    /// A changeset entity.
    Changeset(Changeset<'a>),
}

impl<'a> Item<'a> {
    /// Wrap an entity byte slice in its typed view. Returns `None`
    /// for sub-item kinds, which never appear at the top level.
    pub(crate) fn from_parts(kind: ItemKind, data: &'a [u8]) -> Option<Self> {
        match kind {
            ItemKind::Node => Some(Self::Node(Node { data })),
            ItemKind::Way => Some(Self::Way(Way { data })),
            ItemKind::Relation => Some(Self::Relation(Relation { data })),
            ItemKind::Area => Some(Self::Area(Area { data })),
            ItemKind::Changeset => Some(Self::Changeset(Changeset { data })),
            _ => None,
        }
    }

    /// The entity kind.
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Node(_) => ItemKind::Node,
            Self::Way(_) => ItemKind::Way,
            Self::Relation(_) => ItemKind::Relation,
            Self::Area(_) => ItemKind::Area,
            Self::Changeset(_) => ItemKind::Changeset,
        }
    }

    /// Total byte size of the item, padding included.
    pub fn size(&self) -> usize {
        self.as_bytes().len()
    }

    /// The raw item bytes (used to copy items between buffers).
    pub fn as_bytes(&self) -> &'a [u8] {
        match self {
            Self::Node(v) => v.data,
            Self::Way(v) => v.data,
            Self::Relation(v) => v.data,
            Self::Area(v) => v.data,
            Self::Changeset(v) => v.data,
        }
    }
}

/// Decode a NUL-terminated string from the start of `data`.
///
/// Builders only accept `&str`, so stored strings are always valid
/// UTF-8; the fallback covers only hand-corrupted buffers.
fn cstr(data: &[u8]) -> &str {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    std::str::from_utf8(&data[..end]).unwrap_or("")
}

/// Iterator over the sub-items of an entity, yielding
/// `(kind, exact-size slice)` pairs.
#[derive(Clone, Debug)]
struct SubItemIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for SubItemIter<'a> {
    type Item = (ItemKind, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }
        let size = layout::get_u32(self.data, self.offset + layout::OFF_SIZE) as usize;
        debug_assert!(size >= layout::SUBITEM_HEADER_LEN);
        debug_assert!(self.offset + size <= self.data.len());
        let kind = ItemKind::from_byte(self.data[self.offset + layout::OFF_KIND])?;
        let slice = &self.data[self.offset..self.offset + size];
        self.offset += align_up(size);
        Some((kind, slice))
    }
}

macro_rules! impl_object_view {
    ($view:ident, $header_len:expr) => {
        impl<'a> $view<'a> {
            /// The object id.
            pub fn id(&self) -> ObjectId {
                layout::get_i64(self.data, layout::OFF_ID)
            }

            /// The object version (0 when no metadata was present).
            pub fn version(&self) -> u32 {
                layout::get_u32(self.data, layout::OFF_VERSION)
            }

            /// The uid of the last editor (0 for anonymous edits).
            pub fn uid(&self) -> u32 {
                layout::get_u32(self.data, layout::OFF_UID)
            }

            /// The changeset this version was created in.
            pub fn changeset(&self) -> i64 {
                layout::get_i64(self.data, layout::OFF_CHANGESET)
            }

            /// Milliseconds since the epoch.
            pub fn timestamp(&self) -> Timestamp {
                layout::get_i64(self.data, layout::OFF_TIMESTAMP)
            }

            /// Whether the object is visible (false only in history
            /// files).
            pub fn visible(&self) -> bool {
                self.data[layout::OFF_VISIBLE] != 0
            }

            /// The user name of the last editor, possibly empty.
            pub fn user(&self) -> &'a str {
                let user_len = layout::get_u16(self.data, layout::OFF_USER_LEN) as usize;
                if user_len == 0 {
                    return "";
                }
                cstr(&self.data[$header_len..$header_len + user_len])
            }

            fn sub_items(&self) -> SubItemIter<'a> {
                let user_len = layout::get_u16(self.data, layout::OFF_USER_LEN) as usize;
                let start = align_up($header_len + user_len);
                SubItemIter {
                    data: self.data,
                    offset: start.min(self.data.len()),
                }
            }

            fn find_sub_item(&self, kind: ItemKind) -> Option<&'a [u8]> {
                self.sub_items().find(|(k, _)| *k == kind).map(|(_, s)| s)
            }

            /// Iterate the object's tags as key/value pairs.
            pub fn tags(&self) -> TagIter<'a> {
                TagIter {
                    data: self
                        .find_sub_item(ItemKind::TagList)
                        .map(|s| &s[layout::SUBITEM_HEADER_LEN..])
                        .unwrap_or(&[]),
                    pos: 0,
                }
            }
        }
    };
}

/// View of a node entity.
#[derive(Clone, Copy, Debug)]
pub struct Node<'a> {
    data: &'a [u8],
}

impl<'a> Node<'a> {
    /// The node location; undefined when the node is not visible or
    /// carries no coordinates.
    pub fn location(&self) -> Location {
        Location::new(
            layout::get_i32(self.data, layout::OFF_NODE_LON),
            layout::get_i32(self.data, layout::OFF_NODE_LAT),
        )
    }
}

impl_object_view!(Node, layout::NODE_HEADER_LEN);

/// View of a way entity.
#[derive(Clone, Copy, Debug)]
pub struct Way<'a> {
    data: &'a [u8],
}

impl<'a> Way<'a> {
    /// Iterate the way's node references, in file order.
    pub fn nodes(&self) -> NodeRefIter<'a> {
        NodeRefIter {
            data: self
                .find_sub_item(ItemKind::WayNodeList)
                .map(|s| &s[layout::SUBITEM_HEADER_LEN..])
                .unwrap_or(&[]),
            pos: 0,
        }
    }
}

impl_object_view!(Way, layout::OBJECT_HEADER_LEN);

/// View of a relation entity.
#[derive(Clone, Copy, Debug)]
pub struct Relation<'a> {
    data: &'a [u8],
}

impl<'a> Relation<'a> {
    /// Iterate the relation's members, in file order.
    pub fn members(&self) -> MemberIter<'a> {
        MemberIter {
            data: self
                .find_sub_item(ItemKind::RelationMemberList)
                .map(|s| &s[layout::SUBITEM_HEADER_LEN..])
                .unwrap_or(&[]),
            pos: 0,
        }
    }
}

impl_object_view!(Relation, layout::OBJECT_HEADER_LEN);

/// View of an area entity.
#[derive(Clone, Copy, Debug)]
pub struct Area<'a> {
    data: &'a [u8],
}

impl<'a> Area<'a> {
    /// Iterate the area's rings as `(kind, node refs)` pairs, outer
    /// and inner rings in build order.
    pub fn rings(&self) -> RingIter<'a> {
        RingIter {
            inner: self.sub_items(),
        }
    }
}

impl_object_view!(Area, layout::OBJECT_HEADER_LEN);

/// View of a changeset entity. The common `timestamp` field holds the
/// creation time.
#[derive(Clone, Copy, Debug)]
pub struct Changeset<'a> {
    data: &'a [u8],
}

impl<'a> Changeset<'a> {
    /// Milliseconds since the epoch at which the changeset closed.
    pub fn closed_at(&self) -> Timestamp {
        layout::get_i64(self.data, layout::OFF_CHANGESET_CLOSED)
    }

    /// The changeset bounds as (bottom-left, top-right), undefined
    /// when not set.
    pub fn bounds(&self) -> (Location, Location) {
        let off = layout::OFF_CHANGESET_BOUNDS;
        (
            Location::new(
                layout::get_i32(self.data, off),
                layout::get_i32(self.data, off + 4),
            ),
            Location::new(
                layout::get_i32(self.data, off + 8),
                layout::get_i32(self.data, off + 12),
            ),
        )
    }
}

impl_object_view!(Changeset, layout::CHANGESET_HEADER_LEN);

/// Iterator over the key/value pairs of a tag list.
#[derive(Clone, Debug)]
pub struct TagIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for TagIter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let key = cstr(&self.data[self.pos..]);
        self.pos += key.len() + 1;
        debug_assert!(self.pos < self.data.len(), "tag list holds key/value pairs");
        let value = cstr(&self.data[self.pos.min(self.data.len())..]);
        self.pos += value.len() + 1;
        Some((key, value))
    }
}

/// Iterator over the records of a node-reference list.
#[derive(Clone, Debug)]
pub struct NodeRefIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for NodeRefIter<'a> {
    type Item = NodeRef;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + layout::NODE_REF_LEN > self.data.len() {
            return None;
        }
        let record = &self.data[self.pos..self.pos + layout::NODE_REF_LEN];
        self.pos += layout::NODE_REF_LEN;
        Some(NodeRef {
            id: layout::get_i64(record, 0),
            location: Location::new(layout::get_i32(record, 8), layout::get_i32(record, 12)),
        })
    }
}

/// Iterator over the members of a relation member list.
#[derive(Clone, Debug)]
pub struct MemberIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for MemberIter<'a> {
    type Item = RelationMemberRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + layout::MEMBER_FIXED_LEN > self.data.len() {
            return None;
        }
        let record = &self.data[self.pos..];
        let id = layout::get_i64(record, 0);
        let kind = ItemKind::from_byte(record[layout::OFF_MEMBER_KIND])?;
        let has_full = record[layout::OFF_MEMBER_FULL] != 0;
        let role_len = layout::get_u16(record, layout::OFF_MEMBER_ROLE_LEN) as usize;
        let role = cstr(&record[layout::MEMBER_FIXED_LEN..layout::MEMBER_FIXED_LEN + role_len]);
        self.pos += align_up(layout::MEMBER_FIXED_LEN + role_len);

        let full = if has_full {
            let item_data = &self.data[self.pos..];
            let size = layout::get_u32(item_data, layout::OFF_SIZE) as usize;
            let item_kind = ItemKind::from_byte(item_data[layout::OFF_KIND])?;
            self.pos += align_up(size);
            Item::from_parts(item_kind, &item_data[..size])
        } else {
            None
        };

        Some(RelationMemberRef {
            kind,
            id,
            role,
            full,
        })
    }
}

/// Iterator over the rings of an area.
#[derive(Clone, Debug)]
pub struct RingIter<'a> {
    inner: SubItemIter<'a>,
}

impl<'a> Iterator for RingIter<'a> {
    type Item = (ItemKind, NodeRefIter<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        for (kind, slice) in self.inner.by_ref() {
            if matches!(kind, ItemKind::OuterRing | ItemKind::InnerRing) {
                return Some((
                    kind,
                    NodeRefIter {
                        data: &slice[layout::SUBITEM_HEADER_LEN..],
                        pos: 0,
                    },
                ));
            }
        }
        None
    }
}
