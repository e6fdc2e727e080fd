//! PrimitiveBlock encoding: serialise one arena buffer into a data
//! blob.
//!
//! The encoder walks the buffer's items in order, batching each
//! consecutive run of same-kind entities into one PrimitiveGroup so
//! the file preserves the submission order exactly. Nodes are written
//! in the dense form; ways and relations as plain messages. Blocks
//! are written with the default granularity (100 nanodegrees), zero
//! offsets, and the default date granularity, so raw coordinates
//! equal the canonical fixed-point values.

use indexmap::IndexMap;

use silt_arena::{Buffer, Item, Node, Relation, Way};
use silt_core::ItemKind;

use crate::blob::{encode_blob_frame, Compression};
use crate::error::PbfError;
use crate::wire::{
    put_bytes_field, put_int_field, put_packed_field, put_uint_field, zigzag_encode,
};
use crate::BLOB_TYPE_DATA;

/// Interns strings into the per-block stringtable, index 0 reserved
/// for the empty sentinel.
struct StringTable {
    indices: IndexMap<Vec<u8>, u32>,
}

impl StringTable {
    fn new() -> Self {
        let mut indices = IndexMap::new();
        indices.insert(Vec::new(), 0);
        Self { indices }
    }

    fn intern(&mut self, s: &str) -> u32 {
        let next = self.indices.len() as u32;
        *self.indices.entry(s.as_bytes().to_vec()).or_insert(next)
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in self.indices.keys() {
            put_bytes_field(&mut out, 1, entry);
        }
        out
    }
}

/// Encode the committed items of `buffer` into PrimitiveBlock bytes.
///
/// Changesets and areas have no PBF representation and are rejected
/// with [`PbfError::Unsupported`].
pub fn encode_primitive_block(buffer: &Buffer) -> Result<Vec<u8>, PbfError> {
    let mut strings = StringTable::new();
    let mut groups: Vec<Vec<u8>> = Vec::new();

    let items: Vec<Item<'_>> = buffer.items().collect();
    let mut start = 0;
    while start < items.len() {
        let kind = items[start].kind();
        let mut end = start + 1;
        while end < items.len() && items[end].kind() == kind {
            end += 1;
        }
        let run = &items[start..end];
        let group = match kind {
            ItemKind::Node => encode_dense_group(run, &mut strings),
            ItemKind::Way => encode_way_group(run, &mut strings)?,
            ItemKind::Relation => encode_relation_group(run, &mut strings)?,
            other => {
                return Err(PbfError::unsupported(format!(
                    "the PBF format cannot carry {other} entities"
                )));
            }
        };
        groups.push(group);
        start = end;
    }

    let mut out = Vec::new();
    put_bytes_field(&mut out, 1, &strings.encode());
    for group in &groups {
        put_bytes_field(&mut out, 2, group);
    }
    Ok(out)
}

/// Encode a buffer into a complete framed `OSMData` blob.
pub fn encode_data_blob(buffer: &Buffer, compression: Compression) -> Result<Vec<u8>, PbfError> {
    let block = encode_primitive_block(buffer)?;
    encode_blob_frame(BLOB_TYPE_DATA, &block, compression)
}

/// Delta-encoder for one column.
struct Delta {
    previous: i64,
}

impl Delta {
    fn new() -> Self {
        Self { previous: 0 }
    }

    fn push(&mut self, value: i64) -> i64 {
        let delta = value - self.previous;
        self.previous = value;
        delta
    }
}

fn encode_dense_group(run: &[Item<'_>], strings: &mut StringTable) -> Vec<u8> {
    let nodes: Vec<&Node<'_>> = run
        .iter()
        .map(|item| match item {
            Item::Node(node) => node,
            _ => unreachable!("run contains only nodes"),
        })
        .collect();

    let mut ids = Delta::new();
    let mut lats = Delta::new();
    let mut lons = Delta::new();
    let mut timestamps = Delta::new();
    let mut changesets = Delta::new();
    let mut uids = Delta::new();
    let mut user_sids = Delta::new();

    let mut id_column = Vec::with_capacity(nodes.len());
    let mut lat_column = Vec::with_capacity(nodes.len());
    let mut lon_column = Vec::with_capacity(nodes.len());
    let mut version_column = Vec::with_capacity(nodes.len());
    let mut timestamp_column = Vec::with_capacity(nodes.len());
    let mut changeset_column = Vec::with_capacity(nodes.len());
    let mut uid_column = Vec::with_capacity(nodes.len());
    let mut user_sid_column = Vec::with_capacity(nodes.len());
    let mut visible_column = Vec::with_capacity(nodes.len());
    let mut keys_vals: Vec<u32> = Vec::new();
    let mut any_tags = false;
    let mut any_invisible = false;

    for node in &nodes {
        id_column.push(ids.push(node.id()));
        // Granularity 100 and zero offsets make the raw coordinate
        // equal the canonical value; undefined locations are stored
        // as (0, 0) and restored from the visible flag on decode.
        let location = node.location();
        let (lon, lat) = if location.is_defined() {
            (i64::from(location.lon()), i64::from(location.lat()))
        } else {
            (0, 0)
        };
        lat_column.push(lats.push(lat));
        lon_column.push(lons.push(lon));

        version_column.push(u64::from(node.version()));
        timestamp_column.push(timestamps.push(node.timestamp()));
        changeset_column.push(changesets.push(node.changeset()));
        uid_column.push(uids.push(i64::from(node.uid())));
        user_sid_column.push(user_sids.push(i64::from(strings.intern(node.user()))));
        visible_column.push(node.visible());
        any_invisible |= !node.visible();

        for (key, value) in node.tags() {
            any_tags = true;
            keys_vals.push(strings.intern(key));
            keys_vals.push(strings.intern(value));
        }
        keys_vals.push(0);
    }

    let mut info = Vec::new();
    put_packed_field(&mut info, 1, version_column.iter().copied());
    put_packed_field(&mut info, 2, timestamp_column.iter().map(|&v| zigzag_encode(v)));
    put_packed_field(&mut info, 3, changeset_column.iter().map(|&v| zigzag_encode(v)));
    put_packed_field(&mut info, 4, uid_column.iter().map(|&v| zigzag_encode(v)));
    put_packed_field(&mut info, 5, user_sid_column.iter().map(|&v| zigzag_encode(v)));
    if any_invisible {
        put_packed_field(&mut info, 6, visible_column.iter().map(|&v| u64::from(v)));
    }

    let mut dense = Vec::new();
    put_packed_field(&mut dense, 1, id_column.iter().map(|&v| zigzag_encode(v)));
    put_bytes_field(&mut dense, 5, &info);
    put_packed_field(&mut dense, 8, lat_column.iter().map(|&v| zigzag_encode(v)));
    put_packed_field(&mut dense, 9, lon_column.iter().map(|&v| zigzag_encode(v)));
    if any_tags {
        put_packed_field(&mut dense, 10, keys_vals.iter().map(|&v| u64::from(v)));
    }

    let mut group = Vec::new();
    put_bytes_field(&mut group, 2, &dense);
    group
}

fn encode_info<T: ObjectFields>(object: &T, strings: &mut StringTable) -> Vec<u8> {
    let mut info = Vec::new();
    put_int_field(&mut info, 1, i64::from(object.version()));
    put_int_field(&mut info, 2, object.timestamp());
    put_int_field(&mut info, 3, object.changeset());
    put_int_field(&mut info, 4, i64::from(object.uid()));
    put_uint_field(&mut info, 5, u64::from(strings.intern(object.user())));
    if !object.visible() {
        put_uint_field(&mut info, 6, 0);
    }
    info
}

fn encode_tags<T: ObjectFields>(out: &mut Vec<u8>, object: &T, strings: &mut StringTable) {
    let pairs = object.tag_pairs();
    if pairs.is_empty() {
        return;
    }
    let keys: Vec<u32> = pairs.iter().map(|(k, _)| strings.intern(k)).collect();
    let vals: Vec<u32> = pairs.iter().map(|(_, v)| strings.intern(v)).collect();
    put_packed_field(out, 2, keys.into_iter().map(u64::from));
    put_packed_field(out, 3, vals.into_iter().map(u64::from));
}

/// Internal access to the header fields shared by the view types.
trait ObjectFields {
    fn version(&self) -> u32;
    fn timestamp(&self) -> i64;
    fn changeset(&self) -> i64;
    fn uid(&self) -> u32;
    fn user(&self) -> &str;
    fn visible(&self) -> bool;
    fn tag_pairs(&self) -> Vec<(&str, &str)>;
}

macro_rules! impl_object_fields {
    ($view:ty) => {
        impl ObjectFields for $view {
            fn version(&self) -> u32 {
                <$view>::version(self)
            }
            fn timestamp(&self) -> i64 {
                <$view>::timestamp(self)
            }
            fn changeset(&self) -> i64 {
                <$view>::changeset(self)
            }
            fn uid(&self) -> u32 {
                <$view>::uid(self)
            }
            fn user(&self) -> &str {
                <$view>::user(self)
            }
            fn visible(&self) -> bool {
                <$view>::visible(self)
            }
            fn tag_pairs(&self) -> Vec<(&str, &str)> {
                <$view>::tags(self).collect()
            }
        }
    };
}

impl_object_fields!(Node<'_>);
impl_object_fields!(Way<'_>);
impl_object_fields!(Relation<'_>);

fn encode_way_group(run: &[Item<'_>], strings: &mut StringTable) -> Result<Vec<u8>, PbfError> {
    let mut group = Vec::new();
    for item in run {
        let Item::Way(way) = item else {
            unreachable!("run contains only ways");
        };
        let mut message = Vec::new();
        put_int_field(&mut message, 1, way.id());
        encode_tags(&mut message, way, strings);
        put_bytes_field(&mut message, 4, &encode_info(way, strings));

        let mut refs = Delta::new();
        let deltas: Vec<i64> = way.nodes().map(|r| refs.push(r.id)).collect();
        if !deltas.is_empty() {
            put_packed_field(&mut message, 8, deltas.into_iter().map(zigzag_encode));
        }
        put_bytes_field(&mut group, 3, &message);
    }
    Ok(group)
}

fn member_type(kind: ItemKind) -> Result<i64, PbfError> {
    match kind {
        ItemKind::Node => Ok(0),
        ItemKind::Way => Ok(1),
        ItemKind::Relation => Ok(2),
        other => Err(PbfError::unsupported(format!(
            "relation member of kind {other} cannot be encoded"
        ))),
    }
}

fn encode_relation_group(
    run: &[Item<'_>],
    strings: &mut StringTable,
) -> Result<Vec<u8>, PbfError> {
    let mut group = Vec::new();
    for item in run {
        let Item::Relation(relation) = item else {
            unreachable!("run contains only relations");
        };
        let mut message = Vec::new();
        put_int_field(&mut message, 1, relation.id());
        encode_tags(&mut message, relation, strings);
        put_bytes_field(&mut message, 4, &encode_info(relation, strings));

        let mut roles = Vec::new();
        let mut memid_deltas = Vec::new();
        let mut types = Vec::new();
        let mut memids = Delta::new();
        for member in relation.members() {
            roles.push(u64::from(strings.intern(member.role)));
            memid_deltas.push(zigzag_encode(memids.push(member.id)));
            types.push(member_type(member.kind)? as u64);
        }
        if !types.is_empty() {
            put_packed_field(&mut message, 8, roles.into_iter());
            put_packed_field(&mut message, 9, memid_deltas.into_iter());
            put_packed_field(&mut message, 10, types.into_iter());
        }
        put_bytes_field(&mut group, 4, &message);
    }
    Ok(group)
}
