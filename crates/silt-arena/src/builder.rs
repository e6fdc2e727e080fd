//! Scoped builders that append well-formed items to a [`Buffer`].
//!
//! An entity builder reserves its fixed header at construction,
//! accumulates the user string and sub-items, and on `finish()` writes
//! the final padded size into the header and commits the buffer
//! atomically. Sub-list builders borrow their parent mutably, so the
//! borrow checker enforces the strict LIFO discipline: a parent cannot
//! be touched (or finished) while a child builder is alive, and a
//! child's `finish()` propagates its padded size into the parent's
//! accumulator. Dropping a builder without finishing leaves the
//! buffer's committed watermark untouched; the abandoned scratch bytes
//! are discarded when the next build starts.

use crate::buffer::Buffer;
use crate::error::ArenaError;
use crate::item::Item;
use crate::layout::{self, align_up};
use silt_core::{ItemKind, Location, ObjectId, Timestamp};

/// Low-level append state for one item: the buffer, the item's start
/// offset, and the byte count accumulated so far (header included).
#[derive(Debug)]
struct ItemBuilder<'a> {
    buffer: &'a mut Buffer,
    start: usize,
    size: usize,
}

impl<'a> ItemBuilder<'a> {
    /// Start a top-level entity, discarding any scratch left behind by
    /// an abandoned build. The header is reserved and zeroed, the kind
    /// byte written, and the visible flag defaulted to true.
    fn new_entity(
        buffer: &'a mut Buffer,
        kind: ItemKind,
        header_len: usize,
    ) -> Result<Self, ArenaError> {
        buffer.rollback();
        debug_assert_eq!(buffer.written() % layout::ALIGNMENT, 0);
        let start = buffer.reserve(header_len)?;
        let mut builder = Self {
            buffer,
            start,
            size: header_len,
        };
        builder.put_byte(layout::OFF_KIND, kind.to_byte());
        builder.put_byte(layout::OFF_VISIBLE, 1);
        Ok(builder)
    }

    fn put_byte(&mut self, off: usize, v: u8) {
        self.buffer.slice_mut(self.start + off, 1)[0] = v;
    }

    fn put_u16(&mut self, off: usize, v: u16) {
        layout::put_u16(self.buffer.slice_mut(self.start + off, 2), 0, v);
    }

    fn put_u32(&mut self, off: usize, v: u32) {
        layout::put_u32(self.buffer.slice_mut(self.start + off, 4), 0, v);
    }

    fn put_i32(&mut self, off: usize, v: i32) {
        layout::put_i32(self.buffer.slice_mut(self.start + off, 4), 0, v);
    }

    fn put_i64(&mut self, off: usize, v: i64) {
        layout::put_i64(self.buffer.slice_mut(self.start + off, 8), 0, v);
    }

    /// Reserve `n` bytes for this item and return their offset.
    fn reserve(&mut self, n: usize) -> Result<usize, ArenaError> {
        let offset = self.buffer.reserve(n)?;
        self.size += n;
        Ok(offset)
    }

    /// Append a NUL-terminated copy of `s`; returns bytes written.
    fn append_cstr(&mut self, s: &str) -> Result<usize, ArenaError> {
        let n = s.len() + 1;
        let offset = self.reserve(n)?;
        self.buffer.slice_mut(offset, s.len()).copy_from_slice(s.as_bytes());
        // The reserved region is zeroed, so the terminator is already
        // in place.
        Ok(n)
    }

    /// Reserve zeroed padding so the accumulated size is a multiple of
    /// the item alignment.
    fn add_padding(&mut self) -> Result<(), ArenaError> {
        let padded = align_up(self.size);
        if padded > self.size {
            self.buffer.reserve(padded - self.size)?;
            self.size = padded;
        }
        Ok(())
    }

    /// Write the user string directly after the fixed header and
    /// record its length. Must be called before any sub-list is added.
    fn add_user(&mut self, user: &str) -> Result<(), ArenaError> {
        let n = user.len() + 1;
        if n > u16::MAX as usize {
            return Err(ArenaError::StringTooLong { length: n });
        }
        self.append_cstr(user)?;
        self.put_u16(layout::OFF_USER_LEN, n as u16);
        self.add_padding()
    }

    /// Pad, write the final size into the header, and commit.
    fn finish_entity(mut self) -> Result<(), ArenaError> {
        self.add_padding()?;
        let size = self.size;
        self.put_u32(layout::OFF_SIZE, size as u32);
        self.buffer.commit();
        Ok(())
    }
}

/// Append state for a sub-list nested inside an entity. Holds the
/// parent mutably so builds are strictly LIFO.
struct SubBuilder<'p, 'a> {
    parent: &'p mut ItemBuilder<'a>,
    start: usize,
    size: usize,
}

impl<'p, 'a> SubBuilder<'p, 'a> {
    fn new(parent: &'p mut ItemBuilder<'a>, kind: ItemKind) -> Result<Self, ArenaError> {
        debug_assert_eq!(parent.size % layout::ALIGNMENT, 0);
        let start = parent.buffer.reserve(layout::SUBITEM_HEADER_LEN)?;
        parent.buffer.slice_mut(start + layout::OFF_KIND, 1)[0] = kind.to_byte();
        Ok(Self {
            parent,
            start,
            size: layout::SUBITEM_HEADER_LEN,
        })
    }

    fn reserve(&mut self, n: usize) -> Result<usize, ArenaError> {
        let offset = self.parent.buffer.reserve(n)?;
        self.size += n;
        Ok(offset)
    }

    fn append_cstr(&mut self, s: &str) -> Result<usize, ArenaError> {
        let n = s.len() + 1;
        let offset = self.reserve(n)?;
        self.parent
            .buffer
            .slice_mut(offset, s.len())
            .copy_from_slice(s.as_bytes());
        Ok(n)
    }

    fn add_padding(&mut self) -> Result<(), ArenaError> {
        let padded = align_up(self.size);
        if padded > self.size {
            self.parent.buffer.reserve(padded - self.size)?;
            self.size = padded;
        }
        Ok(())
    }

    /// Write the exact content size into the sub-item header, emit
    /// trailing padding, and add the padded total to the parent's size
    /// accumulator.
    ///
    /// The recorded size excludes the trailing padding so that string
    /// payloads (tag lists) end exactly where the size says; iteration
    /// advances by the aligned size. Interior padding (member roles)
    /// is part of the record structure and is counted.
    fn finish(self) -> Result<(), ArenaError> {
        let size = self.size;
        let padded = align_up(size);
        if padded > size {
            self.parent.buffer.reserve(padded - size)?;
        }
        layout::put_u32(self.parent.buffer.slice_mut(self.start, 4), 0, size as u32);
        self.parent.size += padded;
        Ok(())
    }
}

macro_rules! impl_object_methods {
    ($builder:ident) => {
        impl<'a> $builder<'a> {
            /// Set the object id.
            pub fn set_id(&mut self, id: ObjectId) -> &mut Self {
                self.item.put_i64(layout::OFF_ID, id);
                self
            }

            /// Set the object version.
            pub fn set_version(&mut self, version: u32) -> &mut Self {
                self.item.put_u32(layout::OFF_VERSION, version);
                self
            }

            /// Set the uid of the last editor.
            pub fn set_uid(&mut self, uid: u32) -> &mut Self {
                self.item.put_u32(layout::OFF_UID, uid);
                self
            }

            /// Set the uid from a signed value; negative uids
            /// (anonymous edits) are clamped to 0.
            pub fn set_uid_from_signed(&mut self, uid: i32) -> &mut Self {
                self.set_uid(uid.max(0) as u32)
            }

            /// Set the changeset id.
            pub fn set_changeset(&mut self, changeset: i64) -> &mut Self {
                self.item.put_i64(layout::OFF_CHANGESET, changeset);
                self
            }

            /// Set the timestamp in milliseconds since the epoch.
            pub fn set_timestamp(&mut self, timestamp: Timestamp) -> &mut Self {
                self.item.put_i64(layout::OFF_TIMESTAMP, timestamp);
                self
            }

            /// Set the visible flag (defaults to true).
            pub fn set_visible(&mut self, visible: bool) -> &mut Self {
                self.item.put_byte(layout::OFF_VISIBLE, visible as u8);
                self
            }

            /// Append the user name. Must be called before any
            /// sub-list is added; call with `""` when there is no
            /// user information.
            pub fn add_user(&mut self, user: &str) -> Result<(), ArenaError> {
                self.item.add_user(user)
            }

            /// Open a tag-list builder for this object.
            pub fn tags(&mut self) -> Result<TagListBuilder<'_, 'a>, ArenaError> {
                TagListBuilder::new(&mut self.item)
            }

            /// Pad, write the final size into the header, and commit
            /// the entity to the buffer.
            pub fn finish(self) -> Result<(), ArenaError> {
                self.item.finish_entity()
            }
        }
    };
}

/// Builds a node entity.
#[derive(Debug)]
pub struct NodeBuilder<'a> {
    item: ItemBuilder<'a>,
}

impl<'a> NodeBuilder<'a> {
    /// Start a node in `buffer`. The location defaults to undefined.
    pub fn new(buffer: &'a mut Buffer) -> Result<Self, ArenaError> {
        let mut item = ItemBuilder::new_entity(buffer, ItemKind::Node, layout::NODE_HEADER_LEN)?;
        let undefined = Location::undefined();
        item.put_i32(layout::OFF_NODE_LON, undefined.lon());
        item.put_i32(layout::OFF_NODE_LAT, undefined.lat());
        Ok(Self { item })
    }

    /// Set the node location.
    pub fn set_location(&mut self, location: Location) -> &mut Self {
        self.item.put_i32(layout::OFF_NODE_LON, location.lon());
        self.item.put_i32(layout::OFF_NODE_LAT, location.lat());
        self
    }
}

impl_object_methods!(NodeBuilder);

/// Builds a way entity.
pub struct WayBuilder<'a> {
    item: ItemBuilder<'a>,
}

impl<'a> WayBuilder<'a> {
    /// Start a way in `buffer`.
    pub fn new(buffer: &'a mut Buffer) -> Result<Self, ArenaError> {
        let item = ItemBuilder::new_entity(buffer, ItemKind::Way, layout::OBJECT_HEADER_LEN)?;
        Ok(Self { item })
    }

    /// Open a builder for the way's node-reference list.
    pub fn nodes(&mut self) -> Result<NodeRefListBuilder<'_, 'a>, ArenaError> {
        NodeRefListBuilder::new(&mut self.item, ItemKind::WayNodeList)
    }
}

impl_object_methods!(WayBuilder);

/// Builds a relation entity.
pub struct RelationBuilder<'a> {
    item: ItemBuilder<'a>,
}

impl<'a> RelationBuilder<'a> {
    /// Start a relation in `buffer`.
    pub fn new(buffer: &'a mut Buffer) -> Result<Self, ArenaError> {
        let item = ItemBuilder::new_entity(buffer, ItemKind::Relation, layout::OBJECT_HEADER_LEN)?;
        Ok(Self { item })
    }

    /// Open a builder for the relation's member list.
    pub fn members(&mut self) -> Result<RelationMemberListBuilder<'_, 'a>, ArenaError> {
        RelationMemberListBuilder::new(&mut self.item)
    }
}

impl_object_methods!(RelationBuilder);

/// Builds an area entity (tag list plus outer and inner rings).
pub struct AreaBuilder<'a> {
    item: ItemBuilder<'a>,
}

impl<'a> AreaBuilder<'a> {
    /// Start an area in `buffer`.
    pub fn new(buffer: &'a mut Buffer) -> Result<Self, ArenaError> {
        let item = ItemBuilder::new_entity(buffer, ItemKind::Area, layout::OBJECT_HEADER_LEN)?;
        Ok(Self { item })
    }

    /// Open a builder for an outer ring.
    pub fn outer_ring(&mut self) -> Result<NodeRefListBuilder<'_, 'a>, ArenaError> {
        NodeRefListBuilder::new(&mut self.item, ItemKind::OuterRing)
    }

    /// Open a builder for an inner ring.
    pub fn inner_ring(&mut self) -> Result<NodeRefListBuilder<'_, 'a>, ArenaError> {
        NodeRefListBuilder::new(&mut self.item, ItemKind::InnerRing)
    }
}

impl_object_methods!(AreaBuilder);

/// Builds a changeset entity.
pub struct ChangesetBuilder<'a> {
    item: ItemBuilder<'a>,
}

impl<'a> ChangesetBuilder<'a> {
    /// Start a changeset in `buffer`. The bounds default to undefined.
    pub fn new(buffer: &'a mut Buffer) -> Result<Self, ArenaError> {
        let mut item =
            ItemBuilder::new_entity(buffer, ItemKind::Changeset, layout::CHANGESET_HEADER_LEN)?;
        let undefined = Location::undefined();
        for corner in 0..2 {
            let off = layout::OFF_CHANGESET_BOUNDS + corner * 8;
            item.put_i32(off, undefined.lon());
            item.put_i32(off + 4, undefined.lat());
        }
        Ok(Self { item })
    }

    /// Set the closing timestamp in milliseconds since the epoch.
    pub fn set_closed_at(&mut self, timestamp: Timestamp) -> &mut Self {
        self.item.put_i64(layout::OFF_CHANGESET_CLOSED, timestamp);
        self
    }

    /// Set the changeset bounds.
    pub fn set_bounds(&mut self, bottom_left: Location, top_right: Location) -> &mut Self {
        self.item.put_i32(layout::OFF_CHANGESET_BOUNDS, bottom_left.lon());
        self.item.put_i32(layout::OFF_CHANGESET_BOUNDS + 4, bottom_left.lat());
        self.item.put_i32(layout::OFF_CHANGESET_BOUNDS + 8, top_right.lon());
        self.item.put_i32(layout::OFF_CHANGESET_BOUNDS + 12, top_right.lat());
        self
    }
}

impl_object_methods!(ChangesetBuilder);

/// Builds a tag list: alternating NUL-terminated key and value
/// strings, padded to the item alignment at the end.
pub struct TagListBuilder<'p, 'a> {
    sub: SubBuilder<'p, 'a>,
}

impl<'p, 'a> TagListBuilder<'p, 'a> {
    fn new(parent: &'p mut ItemBuilder<'a>) -> Result<Self, ArenaError> {
        Ok(Self {
            sub: SubBuilder::new(parent, ItemKind::TagList)?,
        })
    }

    /// Append one key/value pair.
    pub fn add_tag(&mut self, key: &str, value: &str) -> Result<(), ArenaError> {
        self.sub.append_cstr(key)?;
        self.sub.append_cstr(value)?;
        Ok(())
    }

    /// Close the list, writing its size into the parent.
    pub fn finish(self) -> Result<(), ArenaError> {
        self.sub.finish()
    }
}

/// Builds a node-reference list: way node lists, outer rings, and
/// inner rings share the record layout and differ only in kind.
pub struct NodeRefListBuilder<'p, 'a> {
    sub: SubBuilder<'p, 'a>,
}

impl<'p, 'a> NodeRefListBuilder<'p, 'a> {
    fn new(parent: &'p mut ItemBuilder<'a>, kind: ItemKind) -> Result<Self, ArenaError> {
        debug_assert!(matches!(
            kind,
            ItemKind::WayNodeList | ItemKind::OuterRing | ItemKind::InnerRing
        ));
        Ok(Self {
            sub: SubBuilder::new(parent, kind)?,
        })
    }

    /// Append one node reference.
    pub fn add_node_ref(&mut self, id: ObjectId, location: Location) -> Result<(), ArenaError> {
        let offset = self.sub.reserve(layout::NODE_REF_LEN)?;
        let record = self.sub.parent.buffer.slice_mut(offset, layout::NODE_REF_LEN);
        layout::put_i64(record, 0, id);
        layout::put_i32(record, 8, location.lon());
        layout::put_i32(record, 12, location.lat());
        Ok(())
    }

    /// Close the list, writing its size into the parent.
    pub fn finish(self) -> Result<(), ArenaError> {
        self.sub.finish()
    }
}

/// Builds a relation member list. Each member record is followed by
/// its NUL-terminated role string and padding; an optional full-member
/// item may be attached after the padding.
pub struct RelationMemberListBuilder<'p, 'a> {
    sub: SubBuilder<'p, 'a>,
}

impl<'p, 'a> RelationMemberListBuilder<'p, 'a> {
    fn new(parent: &'p mut ItemBuilder<'a>) -> Result<Self, ArenaError> {
        Ok(Self {
            sub: SubBuilder::new(parent, ItemKind::RelationMemberList)?,
        })
    }

    /// Append one member: its kind, target id, role string, and an
    /// optional full copy of the referenced object.
    pub fn add_member(
        &mut self,
        kind: ItemKind,
        id: ObjectId,
        role: &str,
        full_member: Option<&Item<'_>>,
    ) -> Result<(), ArenaError> {
        debug_assert!(kind.is_entity());
        let role_len = role.len() + 1;
        if role_len > u16::MAX as usize {
            return Err(ArenaError::StringTooLong { length: role_len });
        }

        let offset = self.sub.reserve(layout::MEMBER_FIXED_LEN)?;
        let record = self.sub.parent.buffer.slice_mut(offset, layout::MEMBER_FIXED_LEN);
        layout::put_i64(record, 0, id);
        record[layout::OFF_MEMBER_KIND] = kind.to_byte();
        record[layout::OFF_MEMBER_FULL] = full_member.is_some() as u8;
        layout::put_u16(record, layout::OFF_MEMBER_ROLE_LEN, role_len as u16);

        self.sub.append_cstr(role)?;
        self.sub.add_padding()?;

        if let Some(item) = full_member {
            let bytes = item.as_bytes();
            debug_assert_eq!(bytes.len() % layout::ALIGNMENT, 0);
            let offset = self.sub.reserve(bytes.len())?;
            self.sub
                .parent
                .buffer
                .slice_mut(offset, bytes.len())
                .copy_from_slice(bytes);
        }
        Ok(())
    }

    /// Close the list, writing its size into the parent.
    pub fn finish(self) -> Result<(), ArenaError> {
        self.sub.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::GrowPolicy;

    fn collect_one(buffer: &Buffer) -> Item<'_> {
        let mut iter = buffer.items();
        let item = iter.next().expect("one item");
        assert!(iter.next().is_none());
        item
    }

    #[test]
    fn node_roundtrip_through_views() {
        let mut buffer = Buffer::new(4096, GrowPolicy::Fixed);
        let mut builder = NodeBuilder::new(&mut buffer).unwrap();
        builder
            .set_id(17)
            .set_version(3)
            .set_uid(99)
            .set_changeset(1234)
            .set_timestamp(1_500_000_000_000)
            .set_location(Location::new(100, 200));
        builder.add_user("mapper").unwrap();
        let mut tags = builder.tags().unwrap();
        tags.add_tag("highway", "residential").unwrap();
        tags.add_tag("name", "Elm Street").unwrap();
        tags.finish().unwrap();
        builder.finish().unwrap();

        match collect_one(&buffer) {
            Item::Node(node) => {
                assert_eq!(node.id(), 17);
                assert_eq!(node.version(), 3);
                assert_eq!(node.uid(), 99);
                assert_eq!(node.changeset(), 1234);
                assert_eq!(node.timestamp(), 1_500_000_000_000);
                assert!(node.visible());
                assert_eq!(node.user(), "mapper");
                assert_eq!(node.location(), Location::new(100, 200));
                let tags: Vec<_> = node.tags().collect();
                assert_eq!(
                    tags,
                    vec![("highway", "residential"), ("name", "Elm Street")]
                );
            }
            other => panic!("expected node, got {:?}", other.kind()),
        }
    }

    #[test]
    fn node_without_user_or_tags() {
        let mut buffer = Buffer::new(4096, GrowPolicy::Fixed);
        let mut builder = NodeBuilder::new(&mut buffer).unwrap();
        builder.set_id(1);
        builder.add_user("").unwrap();
        builder.finish().unwrap();

        match collect_one(&buffer) {
            Item::Node(node) => {
                assert_eq!(node.user(), "");
                assert_eq!(node.tags().count(), 0);
                assert!(node.location().is_undefined());
            }
            other => panic!("expected node, got {:?}", other.kind()),
        }
    }

    #[test]
    fn way_refs_preserve_order() {
        let mut buffer = Buffer::new(4096, GrowPolicy::Fixed);
        let mut builder = WayBuilder::new(&mut buffer).unwrap();
        builder.set_id(5);
        builder.add_user("w").unwrap();
        let mut nodes = builder.nodes().unwrap();
        for id in [100, 101, 100, 102] {
            nodes.add_node_ref(id, Location::undefined()).unwrap();
        }
        nodes.finish().unwrap();
        builder.finish().unwrap();

        match collect_one(&buffer) {
            Item::Way(way) => {
                let refs: Vec<_> = way.nodes().map(|r| r.id).collect();
                assert_eq!(refs, vec![100, 101, 100, 102]);
            }
            other => panic!("expected way, got {:?}", other.kind()),
        }
    }

    #[test]
    fn way_with_zero_refs_is_valid() {
        let mut buffer = Buffer::new(4096, GrowPolicy::Fixed);
        let mut builder = WayBuilder::new(&mut buffer).unwrap();
        builder.set_id(9);
        builder.add_user("").unwrap();
        let nodes = builder.nodes().unwrap();
        nodes.finish().unwrap();
        builder.finish().unwrap();

        match collect_one(&buffer) {
            Item::Way(way) => assert_eq!(way.nodes().count(), 0),
            other => panic!("expected way, got {:?}", other.kind()),
        }
    }

    #[test]
    fn relation_members_with_roles() {
        let mut buffer = Buffer::new(4096, GrowPolicy::Fixed);
        let mut builder = RelationBuilder::new(&mut buffer).unwrap();
        builder.set_id(8);
        builder.add_user("r").unwrap();
        let mut members = builder.members().unwrap();
        members.add_member(ItemKind::Node, 5, "a", None).unwrap();
        members.add_member(ItemKind::Way, 6, "", None).unwrap();
        members
            .add_member(ItemKind::Relation, 7, "role\u{2603}", None)
            .unwrap();
        members.finish().unwrap();
        builder.finish().unwrap();

        match collect_one(&buffer) {
            Item::Relation(relation) => {
                let members: Vec<_> = relation.members().collect();
                assert_eq!(members.len(), 3);
                assert_eq!(members[0].kind, ItemKind::Node);
                assert_eq!(members[0].id, 5);
                assert_eq!(members[0].role, "a");
                assert_eq!(members[1].kind, ItemKind::Way);
                assert_eq!(members[1].role, "");
                assert_eq!(members[2].kind, ItemKind::Relation);
                assert_eq!(members[2].role, "role\u{2603}");
                assert!(members.iter().all(|m| m.full.is_none()));
            }
            other => panic!("expected relation, got {:?}", other.kind()),
        }
    }

    #[test]
    fn relation_member_with_full_member_item() {
        // Build a node in a side buffer, then attach it as a full
        // member of a relation.
        let mut side = Buffer::new(4096, GrowPolicy::Fixed);
        let mut node = NodeBuilder::new(&mut side).unwrap();
        node.set_id(5);
        node.set_location(Location::new(1, 2));
        node.add_user("n").unwrap();
        node.finish().unwrap();
        let node_item = side.items().next().unwrap();

        let mut buffer = Buffer::new(4096, GrowPolicy::Fixed);
        let mut builder = RelationBuilder::new(&mut buffer).unwrap();
        builder.set_id(8);
        builder.add_user("").unwrap();
        let mut members = builder.members().unwrap();
        members
            .add_member(ItemKind::Node, 5, "stop", Some(&node_item))
            .unwrap();
        members.finish().unwrap();
        builder.finish().unwrap();

        match collect_one(&buffer) {
            Item::Relation(relation) => {
                let members: Vec<_> = relation.members().collect();
                assert_eq!(members.len(), 1);
                assert_eq!(members[0].role, "stop");
                match members[0].full {
                    Some(Item::Node(full)) => {
                        assert_eq!(full.id(), 5);
                        assert_eq!(full.location(), Location::new(1, 2));
                    }
                    _ => panic!("expected attached full member"),
                }
            }
            other => panic!("expected relation, got {:?}", other.kind()),
        }
    }

    #[test]
    fn changeset_bounds_roundtrip() {
        let mut buffer = Buffer::new(4096, GrowPolicy::Fixed);
        let mut builder = ChangesetBuilder::new(&mut buffer).unwrap();
        builder
            .set_id(1000)
            .set_timestamp(10)
            .set_closed_at(20)
            .set_bounds(Location::new(-10, -20), Location::new(30, 40));
        builder.add_user("c").unwrap();
        builder.finish().unwrap();

        match collect_one(&buffer) {
            Item::Changeset(cs) => {
                assert_eq!(cs.id(), 1000);
                assert_eq!(cs.closed_at(), 20);
                assert_eq!(cs.bounds(), (Location::new(-10, -20), Location::new(30, 40)));
            }
            other => panic!("expected changeset, got {:?}", other.kind()),
        }
    }

    #[test]
    fn area_with_rings() {
        let mut buffer = Buffer::new(4096, GrowPolicy::Fixed);
        let mut builder = AreaBuilder::new(&mut buffer).unwrap();
        builder.set_id(23);
        builder.add_user("").unwrap();
        let mut outer = builder.outer_ring().unwrap();
        outer.add_node_ref(1, Location::new(0, 0)).unwrap();
        outer.add_node_ref(2, Location::new(10, 0)).unwrap();
        outer.add_node_ref(3, Location::new(0, 10)).unwrap();
        outer.add_node_ref(1, Location::new(0, 0)).unwrap();
        outer.finish().unwrap();
        let mut inner = builder.inner_ring().unwrap();
        inner.add_node_ref(4, Location::new(2, 2)).unwrap();
        inner.finish().unwrap();
        builder.finish().unwrap();

        match collect_one(&buffer) {
            Item::Area(area) => {
                let rings: Vec<_> = area.rings().collect();
                assert_eq!(rings.len(), 2);
                assert_eq!(rings[0].0, ItemKind::OuterRing);
                assert_eq!(rings[0].1.clone().count(), 4);
                assert_eq!(rings[1].0, ItemKind::InnerRing);
                assert_eq!(rings[1].1.clone().count(), 1);
            }
            other => panic!("expected area, got {:?}", other.kind()),
        }
    }

    #[test]
    fn abandoned_builder_leaves_no_trace() {
        let mut buffer = Buffer::new(4096, GrowPolicy::Fixed);
        {
            let mut builder = NodeBuilder::new(&mut buffer).unwrap();
            builder.set_id(1);
            // Dropped without finish.
        }
        assert_eq!(buffer.committed(), 0);

        // The next build starts clean and commits normally.
        let mut builder = NodeBuilder::new(&mut buffer).unwrap();
        builder.set_id(2);
        builder.add_user("").unwrap();
        builder.finish().unwrap();

        let ids: Vec<_> = buffer
            .items()
            .map(|item| match item {
                Item::Node(n) => n.id(),
                other => panic!("unexpected {:?}", other.kind()),
            })
            .collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn fixed_buffer_too_small_fails_cleanly() {
        let mut buffer = Buffer::new(16, GrowPolicy::Fixed);
        let err = NodeBuilder::new(&mut buffer).unwrap_err();
        assert!(matches!(err, ArenaError::BufferFull { .. }));
        assert_eq!(buffer.committed(), 0);
    }

    #[test]
    fn entity_sizes_are_aligned() {
        let mut buffer = Buffer::new(4096, GrowPolicy::Fixed);
        let mut builder = NodeBuilder::new(&mut buffer).unwrap();
        builder.set_id(1);
        builder.add_user("odd").unwrap();
        let mut tags = builder.tags().unwrap();
        tags.add_tag("k", "v").unwrap();
        tags.finish().unwrap();
        builder.finish().unwrap();

        assert_eq!(buffer.committed() % layout::ALIGNMENT, 0);
        let item = buffer.items().next().unwrap();
        assert_eq!(item.size() % layout::ALIGNMENT, 0);
        assert_eq!(item.size(), buffer.committed());
    }
}
