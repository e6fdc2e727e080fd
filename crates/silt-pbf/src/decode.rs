//! PrimitiveBlock decoding: materialise one blob's entities into an
//! arena buffer.
//!
//! Runs entirely on a worker thread. The decoder owns its target
//! buffer exclusively and transfers it by move at the end; the
//! stringtable lives in the parsed block on the worker's stack, and
//! every string an entity needs is copied into the buffer, so the
//! block can be dropped when the worker finishes.

use silt_arena::{Buffer, GrowPolicy, NodeBuilder, RelationBuilder, WayBuilder};
use silt_core::{ItemKind, Location, ReadTypes};

use crate::error::PbfError;
use crate::proto::{DenseNodes, PbfNode, PbfRelation, PbfWay, PrimitiveBlock, PrimitiveGroup};
use crate::RESOLUTION_DIVISOR;

/// Initial size of the buffer each decoded block is materialised into.
/// The buffer grows if a block decodes larger.
pub const INITIAL_BUFFER_SIZE: usize = 10 * 1000 * 1000;

/// Per-block decode context: the stringtable and the coordinate and
/// date scaling declared in the block.
struct BlockContext<'a> {
    stringtable: &'a [&'a [u8]],
    granularity: i64,
    lon_offset: i64,
    lat_offset: i64,
    date_factor: i64,
}

impl BlockContext<'_> {
    fn str_at(&self, index: i64) -> Result<&str, PbfError> {
        let bytes = usize::try_from(index)
            .ok()
            .and_then(|i| self.stringtable.get(i))
            .ok_or_else(|| {
                PbfError::format(format!(
                    "stringtable index {index} out of range ({} entries)",
                    self.stringtable.len()
                ))
            })?;
        std::str::from_utf8(bytes)
            .map_err(|_| PbfError::format("stringtable entry is not valid UTF-8"))
    }

    fn location(&self, raw_lon: i64, raw_lat: i64) -> Location {
        Location::new(
            ((raw_lon * self.granularity + self.lon_offset) / RESOLUTION_DIVISOR) as i32,
            ((raw_lat * self.granularity + self.lat_offset) / RESOLUTION_DIVISOR) as i32,
        )
    }

    fn timestamp_ms(&self, raw: i64) -> i64 {
        raw * self.date_factor
    }
}

/// Decode one uncompressed PrimitiveBlock into a fresh buffer.
///
/// Groups whose kind is not in `read_types` are skipped without
/// building anything. Any malformed content aborts the whole block;
/// no partial results are returned.
pub fn decode_primitive_block(data: &[u8], read_types: ReadTypes) -> Result<Buffer, PbfError> {
    let block = PrimitiveBlock::decode(data)?;
    let ctx = BlockContext {
        stringtable: &block.stringtable,
        granularity: i64::from(block.granularity),
        lon_offset: block.lon_offset,
        lat_offset: block.lat_offset,
        // Integer division, preserved for compatibility: a
        // date_granularity that is not a multiple of 1000 floors.
        date_factor: i64::from(block.date_granularity / 1000),
    };

    let mut buffer = Buffer::new(INITIAL_BUFFER_SIZE, GrowPolicy::AutoGrow);
    for group_data in &block.groups {
        let group = PrimitiveGroup::decode(group_data)?;
        if let Some(dense) = group.dense {
            if read_types.contains(ReadTypes::NODE) {
                decode_dense_group(dense, &ctx, &mut buffer)?;
            }
        } else if !group.ways.is_empty() {
            if read_types.contains(ReadTypes::WAY) {
                decode_way_group(&group, &ctx, &mut buffer)?;
            }
        } else if !group.relations.is_empty() {
            if read_types.contains(ReadTypes::RELATION) {
                decode_relation_group(&group, &ctx, &mut buffer)?;
            }
        } else if !group.nodes.is_empty() {
            if read_types.contains(ReadTypes::NODE) {
                decode_node_group(&group, &ctx, &mut buffer)?;
            }
        } else {
            return Err(PbfError::format("primitive group of unknown type"));
        }
    }
    Ok(buffer)
}

fn column<T: Copy>(values: &[T], i: usize, what: &str) -> Result<T, PbfError> {
    values
        .get(i)
        .copied()
        .ok_or_else(|| PbfError::format(format!("dense {what} column shorter than id column")))
}

fn decode_dense_group(
    data: &[u8],
    ctx: &BlockContext<'_>,
    buffer: &mut Buffer,
) -> Result<(), PbfError> {
    let dense = DenseNodes::decode(data)?;

    let mut id: i64 = 0;
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;
    let mut uid: i64 = 0;
    let mut user_sid: i64 = 0;
    let mut changeset: i64 = 0;
    let mut timestamp: i64 = 0;
    let mut kv: usize = 0;

    for i in 0..dense.ids.len() {
        id += dense.ids[i];
        lat += column(&dense.lats, i, "lat")?;
        lon += column(&dense.lons, i, "lon")?;

        let mut visible = true;
        let mut builder = NodeBuilder::new(buffer)?;
        builder.set_id(id);

        if let Some(info) = &dense.info {
            changeset += column(&info.changesets, i, "changeset")?;
            timestamp += column(&info.timestamps, i, "timestamp")?;
            uid += i64::from(column(&info.uids, i, "uid")?);
            user_sid += i64::from(column(&info.user_sids, i, "user_sid")?);
            if !info.visibles.is_empty() {
                visible = column(&info.visibles, i, "visible")?;
            }
            builder
                .set_version(column(&info.versions, i, "version")?.max(0) as u32)
                .set_changeset(changeset)
                .set_timestamp(ctx.timestamp_ms(timestamp))
                .set_uid_from_signed(uid as i32)
                .set_visible(visible);
            builder.add_user(ctx.str_at(user_sid)?)?;
        } else {
            builder.add_user("")?;
        }

        if visible {
            builder.set_location(ctx.location(lon, lat));
        }

        // One cursor runs over the flat keys_vals array for the whole
        // group; a 0 where a key is expected ends the node's tags.
        if kv < dense.keys_vals.len() {
            if dense.keys_vals[kv] == 0 {
                kv += 1;
            } else {
                let mut tags = builder.tags()?;
                while kv < dense.keys_vals.len() {
                    let key = dense.keys_vals[kv];
                    kv += 1;
                    if key == 0 {
                        break;
                    }
                    let value = *dense
                        .keys_vals
                        .get(kv)
                        .ok_or_else(|| PbfError::format("dense tag key without value"))?;
                    kv += 1;
                    tags.add_tag(ctx.str_at(i64::from(key))?, ctx.str_at(i64::from(value))?)?;
                }
                tags.finish()?;
            }
        }

        builder.finish()?;
    }
    Ok(())
}

fn decode_node_group(
    group: &PrimitiveGroup<'_>,
    ctx: &BlockContext<'_>,
    buffer: &mut Buffer,
) -> Result<(), PbfError> {
    for data in &group.nodes {
        let node = PbfNode::decode(data)?;
        let mut builder = NodeBuilder::new(buffer)?;
        builder.set_id(node.id);

        let mut visible = true;
        if let Some(info) = node.info {
            visible = info.visible.unwrap_or(true);
            builder
                .set_version(info.version.max(0) as u32)
                .set_changeset(info.changeset)
                .set_timestamp(ctx.timestamp_ms(info.timestamp))
                .set_uid_from_signed(info.uid)
                .set_visible(visible);
            builder.add_user(ctx.str_at(i64::from(info.user_sid))?)?;
        } else {
            builder.add_user("")?;
        }

        if visible {
            builder.set_location(ctx.location(node.lon, node.lat));
        }

        add_tags(&mut builder, &node.keys, &node.vals, ctx)?;
        builder.finish()?;
    }
    Ok(())
}

fn decode_way_group(
    group: &PrimitiveGroup<'_>,
    ctx: &BlockContext<'_>,
    buffer: &mut Buffer,
) -> Result<(), PbfError> {
    for data in &group.ways {
        let way = PbfWay::decode(data)?;
        let mut builder = WayBuilder::new(buffer)?;
        builder.set_id(way.id);

        if let Some(info) = way.info {
            builder
                .set_version(info.version.max(0) as u32)
                .set_changeset(info.changeset)
                .set_timestamp(ctx.timestamp_ms(info.timestamp))
                .set_uid_from_signed(info.uid)
                .set_visible(info.visible.unwrap_or(true));
            builder.add_user(ctx.str_at(i64::from(info.user_sid))?)?;
        } else {
            builder.add_user("")?;
        }

        if !way.refs.is_empty() {
            let mut nodes = builder.nodes()?;
            let mut node_ref: i64 = 0;
            for delta in &way.refs {
                node_ref += delta;
                nodes.add_node_ref(node_ref, Location::undefined())?;
            }
            nodes.finish()?;
        }

        add_tags(&mut builder, &way.keys, &way.vals, ctx)?;
        builder.finish()?;
    }
    Ok(())
}

fn member_kind(pbf_type: i32) -> Result<ItemKind, PbfError> {
    match pbf_type {
        0 => Ok(ItemKind::Node),
        1 => Ok(ItemKind::Way),
        2 => Ok(ItemKind::Relation),
        other => Err(PbfError::format(format!(
            "unknown relation member type {other}"
        ))),
    }
}

fn decode_relation_group(
    group: &PrimitiveGroup<'_>,
    ctx: &BlockContext<'_>,
    buffer: &mut Buffer,
) -> Result<(), PbfError> {
    for data in &group.relations {
        let relation = PbfRelation::decode(data)?;
        let mut builder = RelationBuilder::new(buffer)?;
        builder.set_id(relation.id);

        if let Some(info) = relation.info {
            builder
                .set_version(info.version.max(0) as u32)
                .set_changeset(info.changeset)
                .set_timestamp(ctx.timestamp_ms(info.timestamp))
                .set_uid_from_signed(info.uid)
                .set_visible(info.visible.unwrap_or(true));
            builder.add_user(ctx.str_at(i64::from(info.user_sid))?)?;
        } else {
            builder.add_user("")?;
        }

        if !relation.types.is_empty() {
            if relation.memids.len() != relation.types.len()
                || relation.roles_sid.len() != relation.types.len()
            {
                return Err(PbfError::format(
                    "relation member columns have differing lengths",
                ));
            }
            let mut members = builder.members()?;
            let mut member_ref: i64 = 0;
            for i in 0..relation.types.len() {
                member_ref += relation.memids[i];
                members.add_member(
                    member_kind(relation.types[i])?,
                    member_ref,
                    ctx.str_at(i64::from(relation.roles_sid[i]))?,
                    None,
                )?;
            }
            members.finish()?;
        }

        add_tags(&mut builder, &relation.keys, &relation.vals, ctx)?;
        builder.finish()?;
    }
    Ok(())
}

macro_rules! impl_add_tags {
    ($builder:ty) => {
        impl AddTags for $builder {
            fn add_tag_list(
                &mut self,
                keys: &[u32],
                vals: &[u32],
                ctx: &BlockContext<'_>,
            ) -> Result<(), PbfError> {
                let mut tags = self.tags()?;
                for (key, value) in keys.iter().zip(vals) {
                    tags.add_tag(ctx.str_at(i64::from(*key))?, ctx.str_at(i64::from(*value))?)?;
                }
                tags.finish()?;
                Ok(())
            }
        }
    };
}

/// Internal helper trait so the per-group decoders can share the tag
/// handling across the distinct builder types.
trait AddTags {
    fn add_tag_list(
        &mut self,
        keys: &[u32],
        vals: &[u32],
        ctx: &BlockContext<'_>,
    ) -> Result<(), PbfError>;
}

impl_add_tags!(NodeBuilder<'_>);
impl_add_tags!(WayBuilder<'_>);
impl_add_tags!(RelationBuilder<'_>);

fn add_tags<B: AddTags>(
    builder: &mut B,
    keys: &[u32],
    vals: &[u32],
    ctx: &BlockContext<'_>,
) -> Result<(), PbfError> {
    if keys.is_empty() {
        return Ok(());
    }
    if keys.len() != vals.len() {
        return Err(PbfError::format("tag key and value columns differ in length"));
    }
    builder.add_tag_list(keys, vals, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use silt_arena::Item;
    use silt_test_utils::wire;

    /// Encode a stringtable message from the given entries.
    fn stringtable(entries: &[&str]) -> Vec<u8> {
        let mut st = Vec::new();
        for entry in entries {
            wire::bytes_field(&mut st, 1, entry.as_bytes());
        }
        st
    }

    /// Wrap encoded groups and a stringtable into a PrimitiveBlock.
    fn block(strings: &[&str], groups: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        wire::bytes_field(&mut out, 1, &stringtable(strings));
        for group in groups {
            wire::bytes_field(&mut out, 2, group);
        }
        out
    }

    fn dense_group(dense: &[u8]) -> Vec<u8> {
        let mut group = Vec::new();
        wire::bytes_field(&mut group, 2, dense);
        group
    }

    fn nodes(buffer: &Buffer) -> Vec<silt_arena::Node<'_>> {
        buffer
            .items()
            .map(|item| match item {
                Item::Node(n) => n,
                other => panic!("expected node, got {:?}", other.kind()),
            })
            .collect()
    }

    #[test]
    fn dense_nodes_delta_decode() {
        // Three nodes with ids 10, 11, 12 (deltas 10, 1, 1), raw
        // coordinates (0,0), (100,200), (-50,50) at granularity 100.
        let mut dense = Vec::new();
        wire::packed_sint_field(&mut dense, 1, &[10, 1, 1]);
        wire::packed_sint_field(&mut dense, 8, &[0, 200, -150]);
        wire::packed_sint_field(&mut dense, 9, &[0, 100, -150]);
        let block = block(&[""], &[dense_group(&dense)]);

        let buffer = decode_primitive_block(&block, ReadTypes::ALL).unwrap();
        let nodes = nodes(&buffer);
        assert_eq!(nodes.len(), 3);
        assert_eq!(
            nodes.iter().map(|n| n.id()).collect::<Vec<_>>(),
            vec![10, 11, 12]
        );
        // granularity 100 nanodegrees: raw 100 → 10_000 nano → 1
        // canonical unit per 100 raw.
        assert_eq!(nodes[0].location(), Location::new(0, 0));
        assert_eq!(nodes[1].location(), Location::new(100, 200));
        assert_eq!(nodes[2].location(), Location::new(-50, 50));
        assert!(nodes.iter().all(|n| n.tags().count() == 0));
        assert!(nodes.iter().all(|n| n.user().is_empty()));
        assert!(nodes.iter().all(|n| n.visible()));
    }

    #[test]
    fn dense_tags_share_one_cursor() {
        // keys_vals [1,2,0,0,3,4,0] over stringtable
        // ["","a","b","c","d"]: node 0 has {a→b}, node 1 nothing,
        // node 2 has {c→d}.
        let mut dense = Vec::new();
        wire::packed_sint_field(&mut dense, 1, &[1, 1, 1]);
        wire::packed_sint_field(&mut dense, 8, &[0, 0, 0]);
        wire::packed_sint_field(&mut dense, 9, &[0, 0, 0]);
        wire::packed_int_field(&mut dense, 10, &[1, 2, 0, 0, 3, 4, 0]);
        let block = block(&["", "a", "b", "c", "d"], &[dense_group(&dense)]);

        let buffer = decode_primitive_block(&block, ReadTypes::ALL).unwrap();
        let nodes = nodes(&buffer);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].tags().collect::<Vec<_>>(), vec![("a", "b")]);
        assert_eq!(nodes[1].tags().count(), 0);
        assert_eq!(nodes[2].tags().collect::<Vec<_>>(), vec![("c", "d")]);
    }

    #[test]
    fn dense_tags_on_last_node_only() {
        let mut dense = Vec::new();
        wire::packed_sint_field(&mut dense, 1, &[1, 1]);
        wire::packed_sint_field(&mut dense, 8, &[0, 0]);
        wire::packed_sint_field(&mut dense, 9, &[0, 0]);
        wire::packed_int_field(&mut dense, 10, &[0, 1, 2, 0]);
        let block = block(&["", "k", "v"], &[dense_group(&dense)]);

        let buffer = decode_primitive_block(&block, ReadTypes::ALL).unwrap();
        let nodes = nodes(&buffer);
        assert_eq!(nodes[0].tags().count(), 0);
        assert_eq!(nodes[1].tags().collect::<Vec<_>>(), vec![("k", "v")]);
    }

    #[test]
    fn invisible_dense_node_has_undefined_location() {
        let mut info = Vec::new();
        wire::packed_int_field(&mut info, 1, &[1, 1]);
        wire::packed_sint_field(&mut info, 2, &[5, 0]);
        wire::packed_sint_field(&mut info, 3, &[7, 0]);
        wire::packed_sint_field(&mut info, 4, &[3, 0]);
        wire::packed_sint_field(&mut info, 5, &[1, 0]);
        wire::packed_int_field(&mut info, 6, &[0, 1]);

        let mut dense = Vec::new();
        wire::packed_sint_field(&mut dense, 1, &[1, 1]);
        wire::bytes_field(&mut dense, 5, &info);
        wire::packed_sint_field(&mut dense, 8, &[500, 0]);
        wire::packed_sint_field(&mut dense, 9, &[600, 0]);
        let block = block(&["", "someone"], &[dense_group(&dense)]);

        let buffer = decode_primitive_block(&block, ReadTypes::ALL).unwrap();
        let nodes = nodes(&buffer);
        assert!(!nodes[0].visible());
        assert!(nodes[0].location().is_undefined());
        assert_eq!(nodes[0].user(), "someone");
        assert!(nodes[1].visible());
        assert!(nodes[1].location().is_defined());
    }

    #[test]
    fn dense_timestamps_scale_by_date_factor() {
        let mut info = Vec::new();
        wire::packed_int_field(&mut info, 1, &[2]);
        wire::packed_sint_field(&mut info, 2, &[1_234_567]);
        wire::packed_sint_field(&mut info, 3, &[42]);
        wire::packed_sint_field(&mut info, 4, &[-5]);
        wire::packed_sint_field(&mut info, 5, &[0]);

        let mut dense = Vec::new();
        wire::packed_sint_field(&mut dense, 1, &[9]);
        wire::bytes_field(&mut dense, 5, &info);
        wire::packed_sint_field(&mut dense, 8, &[0]);
        wire::packed_sint_field(&mut dense, 9, &[0]);
        let block = block(&[""], &[dense_group(&dense)]);

        let buffer = decode_primitive_block(&block, ReadTypes::ALL).unwrap();
        let nodes = nodes(&buffer);
        assert_eq!(nodes[0].version(), 2);
        // date_granularity defaults to 1000, so the factor is 1.
        assert_eq!(nodes[0].timestamp(), 1_234_567);
        assert_eq!(nodes[0].changeset(), 42);
        // Negative (anonymous) uid clamps to 0.
        assert_eq!(nodes[0].uid(), 0);
    }

    #[test]
    fn way_refs_delta_decode() {
        let mut way = Vec::new();
        wire::int_field(&mut way, 1, 77);
        wire::packed_varint_field(&mut way, 2, &[1]);
        wire::packed_varint_field(&mut way, 3, &[2]);
        wire::packed_sint_field(&mut way, 8, &[100, 1, -1, 2]);
        let mut group = Vec::new();
        wire::bytes_field(&mut group, 3, &way);
        let block = block(&["", "highway", "primary"], &[group]);

        let buffer = decode_primitive_block(&block, ReadTypes::ALL).unwrap();
        let items: Vec<_> = buffer.items().collect();
        assert_eq!(items.len(), 1);
        let Item::Way(way) = &items[0] else {
            panic!("expected way");
        };
        assert_eq!(way.id(), 77);
        assert_eq!(
            way.nodes().map(|r| r.id).collect::<Vec<_>>(),
            vec![100, 101, 100, 102]
        );
        assert_eq!(
            way.tags().collect::<Vec<_>>(),
            vec![("highway", "primary")]
        );
    }

    #[test]
    fn relation_members_decode() {
        let mut relation = Vec::new();
        wire::int_field(&mut relation, 1, 8);
        wire::packed_int_field(&mut relation, 8, &[1, 0, 2]);
        wire::packed_sint_field(&mut relation, 9, &[5, 1, 1]);
        wire::packed_int_field(&mut relation, 10, &[0, 1, 2]);
        let mut group = Vec::new();
        wire::bytes_field(&mut group, 4, &relation);
        let block = block(&["", "outer", "inner"], &[group]);

        let buffer = decode_primitive_block(&block, ReadTypes::ALL).unwrap();
        let items: Vec<_> = buffer.items().collect();
        let Item::Relation(relation) = &items[0] else {
            panic!("expected relation");
        };
        assert_eq!(relation.id(), 8);
        let members: Vec<_> = relation.members().collect();
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].kind, ItemKind::Node);
        assert_eq!(members[0].id, 5);
        assert_eq!(members[0].role, "outer");
        assert_eq!(members[1].kind, ItemKind::Way);
        assert_eq!(members[1].id, 6);
        assert_eq!(members[1].role, "");
        assert_eq!(members[2].kind, ItemKind::Relation);
        assert_eq!(members[2].id, 7);
        assert_eq!(members[2].role, "inner");
    }

    #[test]
    fn plain_node_group_decodes() {
        let mut node = Vec::new();
        wire::sint_field(&mut node, 1, 4);
        wire::sint_field(&mut node, 8, 1000);
        wire::sint_field(&mut node, 9, 2000);
        let mut group = Vec::new();
        wire::bytes_field(&mut group, 1, &node);
        let block = block(&[""], &[group]);

        let buffer = decode_primitive_block(&block, ReadTypes::ALL).unwrap();
        let nodes = nodes(&buffer);
        assert_eq!(nodes[0].id(), 4);
        assert_eq!(nodes[0].location(), Location::new(1000, 2000));
        assert_eq!(nodes[0].version(), 0);
        assert!(nodes[0].visible());
    }

    #[test]
    fn read_types_filters_whole_groups() {
        let mut dense = Vec::new();
        wire::packed_sint_field(&mut dense, 1, &[1]);
        wire::packed_sint_field(&mut dense, 8, &[0]);
        wire::packed_sint_field(&mut dense, 9, &[0]);
        let block = block(&[""], &[dense_group(&dense)]);

        let buffer = decode_primitive_block(&block, ReadTypes::WAY).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn empty_group_is_a_format_error() {
        let block = block(&[""], &[Vec::new()]);
        assert!(matches!(
            decode_primitive_block(&block, ReadTypes::ALL),
            Err(PbfError::Format { .. })
        ));
    }

    #[test]
    fn out_of_range_stringtable_index_is_fatal() {
        let mut dense = Vec::new();
        wire::packed_sint_field(&mut dense, 1, &[1]);
        wire::packed_sint_field(&mut dense, 8, &[0]);
        wire::packed_sint_field(&mut dense, 9, &[0]);
        wire::packed_int_field(&mut dense, 10, &[9, 9, 0]);
        let block = block(&["", "a"], &[dense_group(&dense)]);

        assert!(matches!(
            decode_primitive_block(&block, ReadTypes::ALL),
            Err(PbfError::Format { .. })
        ));
    }

    #[test]
    fn custom_granularity_and_offsets() {
        let mut dense = Vec::new();
        wire::packed_sint_field(&mut dense, 1, &[1]);
        wire::packed_sint_field(&mut dense, 8, &[10]);
        wire::packed_sint_field(&mut dense, 9, &[20]);
        let mut group = Vec::new();
        wire::bytes_field(&mut group, 2, &dense);

        let mut out = Vec::new();
        wire::bytes_field(&mut out, 1, &stringtable(&[""]));
        wire::bytes_field(&mut out, 2, &group);
        wire::int_field(&mut out, 17, 1000);
        wire::int_field(&mut out, 19, 50_000);
        wire::int_field(&mut out, 20, 150_000);

        let buffer = decode_primitive_block(&out, ReadTypes::ALL).unwrap();
        let nodes = nodes(&buffer);
        // lon: (20*1000 + 150000)/100 = 1700; lat: (10*1000+50000)/100 = 600.
        assert_eq!(nodes[0].location(), Location::new(1700, 600));
    }
}
