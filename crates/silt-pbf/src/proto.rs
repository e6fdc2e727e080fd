//! Decoded forms of the PBF protobuf messages.
//!
//! Each struct mirrors one message from the OSM PBF schema and is
//! parsed with the zero-copy wire codec: string and sub-message
//! payloads borrow from the (decompressed) blob bytes, while packed
//! numeric arrays are materialised into vectors. Unknown fields are
//! skipped, matching protobuf semantics.

use crate::error::PbfError;
use crate::wire::{packed_varints, zigzag_decode, WireReader, WireValue};

fn collect_u32(value: WireValue<'_>, out: &mut Vec<u32>) -> Result<(), PbfError> {
    match value {
        WireValue::Bytes(data) => {
            for v in packed_varints(data) {
                out.push(v? as u32);
            }
            Ok(())
        }
        _ => {
            out.push(value.as_u64()? as u32);
            Ok(())
        }
    }
}

fn collect_i32(value: WireValue<'_>, out: &mut Vec<i32>) -> Result<(), PbfError> {
    match value {
        WireValue::Bytes(data) => {
            for v in packed_varints(data) {
                out.push(v? as i32);
            }
            Ok(())
        }
        _ => {
            out.push(value.as_i32()?);
            Ok(())
        }
    }
}

fn collect_sint32(value: WireValue<'_>, out: &mut Vec<i32>) -> Result<(), PbfError> {
    match value {
        WireValue::Bytes(data) => {
            for v in packed_varints(data) {
                out.push(zigzag_decode(v?) as i32);
            }
            Ok(())
        }
        _ => {
            out.push(value.as_sint64()? as i32);
            Ok(())
        }
    }
}

fn collect_sint64(value: WireValue<'_>, out: &mut Vec<i64>) -> Result<(), PbfError> {
    match value {
        WireValue::Bytes(data) => {
            for v in packed_varints(data) {
                out.push(zigzag_decode(v?));
            }
            Ok(())
        }
        _ => {
            out.push(value.as_sint64()?);
            Ok(())
        }
    }
}

fn collect_bool(value: WireValue<'_>, out: &mut Vec<bool>) -> Result<(), PbfError> {
    match value {
        WireValue::Bytes(data) => {
            for v in packed_varints(data) {
                out.push(v? != 0);
            }
            Ok(())
        }
        _ => {
            out.push(value.as_bool()?);
            Ok(())
        }
    }
}

/// The framing message preceding every blob.
#[derive(Debug)]
pub struct BlobHeader<'a> {
    /// `"OSMHeader"` for the first blob, `"OSMData"` afterwards.
    pub blob_type: &'a str,
    /// Size of the following blob message in bytes.
    pub datasize: i32,
}

impl<'a> BlobHeader<'a> {
    /// Parse a BlobHeader message.
    pub fn decode(data: &'a [u8]) -> Result<Self, PbfError> {
        let mut blob_type = None;
        let mut datasize = None;
        let mut reader = WireReader::new(data);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => blob_type = Some(value.as_str()?),
                3 => datasize = Some(value.as_i32()?),
                // indexdata (2) and unknown fields are ignored.
                _ => {}
            }
        }
        Ok(Self {
            blob_type: blob_type.ok_or_else(|| PbfError::format("BlobHeader without type"))?,
            datasize: datasize
                .ok_or_else(|| PbfError::format("BlobHeader without datasize"))?,
        })
    }
}

/// The payload variants a blob can carry.
#[derive(Debug)]
pub enum Blob<'a> {
    /// Uncompressed bytes.
    Raw(&'a [u8]),
    /// zlib-compressed bytes with the advertised inflated size.
    Zlib {
        /// The compressed payload.
        data: &'a [u8],
        /// Size the payload must inflate to, in bytes.
        raw_size: i32,
    },
    /// LZMA-compressed bytes. Recognised but not supported.
    Lzma,
}

impl<'a> Blob<'a> {
    /// Parse a Blob message.
    pub fn decode(data: &'a [u8]) -> Result<Self, PbfError> {
        let mut raw = None;
        let mut raw_size = None;
        let mut zlib_data = None;
        let mut lzma = false;
        let mut reader = WireReader::new(data);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => raw = Some(value.as_bytes()?),
                2 => raw_size = Some(value.as_i32()?),
                3 => zlib_data = Some(value.as_bytes()?),
                4 => lzma = true,
                _ => {}
            }
        }
        if let Some(data) = raw {
            Ok(Self::Raw(data))
        } else if let Some(data) = zlib_data {
            Ok(Self::Zlib {
                data,
                raw_size: raw_size
                    .ok_or_else(|| PbfError::format("zlib blob without raw_size"))?,
            })
        } else if lzma {
            Ok(Self::Lzma)
        } else {
            Err(PbfError::format("blob contains no data"))
        }
    }
}

/// The bounding box of a header block, in nanodegrees.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderBBox {
    /// Western edge.
    pub left: i64,
    /// Eastern edge.
    pub right: i64,
    /// Northern edge.
    pub top: i64,
    /// Southern edge.
    pub bottom: i64,
}

impl HeaderBBox {
    fn decode(data: &[u8]) -> Result<Self, PbfError> {
        let mut bbox = Self::default();
        let mut reader = WireReader::new(data);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => bbox.left = value.as_sint64()?,
                2 => bbox.right = value.as_sint64()?,
                3 => bbox.top = value.as_sint64()?,
                4 => bbox.bottom = value.as_sint64()?,
                _ => {}
            }
        }
        Ok(bbox)
    }
}

/// The single HeaderBlock at the start of a PBF file.
#[derive(Debug, Default)]
pub struct HeaderBlock<'a> {
    /// Optional file bounding box.
    pub bbox: Option<HeaderBBox>,
    /// Features a reader must understand to process the file.
    pub required_features: Vec<&'a str>,
    /// Informational features.
    pub optional_features: Vec<&'a str>,
    /// The program that wrote the file.
    pub writingprogram: Option<&'a str>,
}

impl<'a> HeaderBlock<'a> {
    /// Parse a HeaderBlock message.
    pub fn decode(data: &'a [u8]) -> Result<Self, PbfError> {
        let mut block = Self::default();
        let mut reader = WireReader::new(data);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => block.bbox = Some(HeaderBBox::decode(value.as_bytes()?)?),
                4 => block.required_features.push(value.as_str()?),
                5 => block.optional_features.push(value.as_str()?),
                16 => block.writingprogram = Some(value.as_str()?),
                _ => {}
            }
        }
        Ok(block)
    }
}

/// The inner message of every data blob.
#[derive(Debug)]
pub struct PrimitiveBlock<'a> {
    /// Interned strings; index 0 is the reserved empty sentinel.
    pub stringtable: Vec<&'a [u8]>,
    /// Encoded PrimitiveGroup messages, in file order.
    pub groups: Vec<&'a [u8]>,
    /// Coordinate granularity in nanodegrees.
    pub granularity: i32,
    /// Timestamp granularity in milliseconds.
    pub date_granularity: i32,
    /// Latitude offset in nanodegrees.
    pub lat_offset: i64,
    /// Longitude offset in nanodegrees.
    pub lon_offset: i64,
}

impl<'a> PrimitiveBlock<'a> {
    /// Parse a PrimitiveBlock message.
    pub fn decode(data: &'a [u8]) -> Result<Self, PbfError> {
        let mut block = Self {
            stringtable: Vec::new(),
            groups: Vec::new(),
            granularity: 100,
            date_granularity: 1000,
            lat_offset: 0,
            lon_offset: 0,
        };
        let mut reader = WireReader::new(data);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => {
                    let mut st = WireReader::new(value.as_bytes()?);
                    while let Some((field, value)) = st.next_field()? {
                        if field == 1 {
                            block.stringtable.push(value.as_bytes()?);
                        }
                    }
                }
                2 => block.groups.push(value.as_bytes()?),
                17 => block.granularity = value.as_i32()?,
                18 => block.date_granularity = value.as_i32()?,
                19 => block.lat_offset = value.as_i64()?,
                20 => block.lon_offset = value.as_i64()?,
                _ => {}
            }
        }
        Ok(block)
    }
}

/// One group of same-kind entities within a PrimitiveBlock.
#[derive(Debug, Default)]
pub struct PrimitiveGroup<'a> {
    /// Plain node messages.
    pub nodes: Vec<&'a [u8]>,
    /// The dense-node column block, if this is a dense group.
    pub dense: Option<&'a [u8]>,
    /// Way messages.
    pub ways: Vec<&'a [u8]>,
    /// Relation messages.
    pub relations: Vec<&'a [u8]>,
}

impl<'a> PrimitiveGroup<'a> {
    /// Parse a PrimitiveGroup message.
    pub fn decode(data: &'a [u8]) -> Result<Self, PbfError> {
        let mut group = Self::default();
        let mut reader = WireReader::new(data);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => group.nodes.push(value.as_bytes()?),
                2 => group.dense = Some(value.as_bytes()?),
                3 => group.ways.push(value.as_bytes()?),
                4 => group.relations.push(value.as_bytes()?),
                _ => {}
            }
        }
        Ok(group)
    }
}

/// Metadata attached to a plain node, way, or relation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Info {
    /// Object version.
    pub version: i32,
    /// Timestamp in date-granularity units.
    pub timestamp: i64,
    /// Changeset id.
    pub changeset: i64,
    /// Signed uid; negative means anonymous.
    pub uid: i32,
    /// Stringtable index of the user name.
    pub user_sid: u32,
    /// Visibility; absent means visible.
    pub visible: Option<bool>,
}

impl Info {
    fn decode(data: &[u8]) -> Result<Self, PbfError> {
        let mut info = Self::default();
        let mut reader = WireReader::new(data);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => info.version = value.as_i32()?,
                2 => info.timestamp = value.as_i64()?,
                3 => info.changeset = value.as_i64()?,
                4 => info.uid = value.as_i32()?,
                5 => info.user_sid = value.as_u64()? as u32,
                6 => info.visible = Some(value.as_bool()?),
                _ => {}
            }
        }
        Ok(info)
    }
}

/// A plain (non-dense) node message.
#[derive(Debug, Default)]
pub struct PbfNode {
    /// Absolute node id.
    pub id: i64,
    /// Stringtable indices of tag keys.
    pub keys: Vec<u32>,
    /// Stringtable indices of tag values.
    pub vals: Vec<u32>,
    /// Optional metadata.
    pub info: Option<Info>,
    /// Raw latitude in granularity units.
    pub lat: i64,
    /// Raw longitude in granularity units.
    pub lon: i64,
}

impl PbfNode {
    /// Parse a Node message.
    pub fn decode(data: &[u8]) -> Result<Self, PbfError> {
        let mut node = Self::default();
        let mut reader = WireReader::new(data);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => node.id = value.as_sint64()?,
                2 => collect_u32(value, &mut node.keys)?,
                3 => collect_u32(value, &mut node.vals)?,
                4 => node.info = Some(Info::decode(value.as_bytes()?)?),
                8 => node.lat = value.as_sint64()?,
                9 => node.lon = value.as_sint64()?,
                _ => {}
            }
        }
        Ok(node)
    }
}

/// Per-node metadata columns of a dense group, delta-encoded where
/// the schema says so.
#[derive(Debug, Default)]
pub struct DenseInfo {
    /// Versions (absolute).
    pub versions: Vec<i32>,
    /// Timestamps (delta-encoded).
    pub timestamps: Vec<i64>,
    /// Changesets (delta-encoded).
    pub changesets: Vec<i64>,
    /// Uids (delta-encoded).
    pub uids: Vec<i32>,
    /// User stringtable indices (delta-encoded).
    pub user_sids: Vec<i32>,
    /// Visibility flags; empty means all visible.
    pub visibles: Vec<bool>,
}

impl DenseInfo {
    fn decode(data: &[u8]) -> Result<Self, PbfError> {
        let mut info = Self::default();
        let mut reader = WireReader::new(data);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => collect_i32(value, &mut info.versions)?,
                2 => collect_sint64(value, &mut info.timestamps)?,
                3 => collect_sint64(value, &mut info.changesets)?,
                4 => collect_sint32(value, &mut info.uids)?,
                5 => collect_sint32(value, &mut info.user_sids)?,
                6 => collect_bool(value, &mut info.visibles)?,
                _ => {}
            }
        }
        Ok(info)
    }
}

/// The column-oriented dense-node block.
#[derive(Debug, Default)]
pub struct DenseNodes {
    /// Node ids (delta-encoded).
    pub ids: Vec<i64>,
    /// Optional metadata columns.
    pub info: Option<DenseInfo>,
    /// Raw latitudes in granularity units (delta-encoded).
    pub lats: Vec<i64>,
    /// Raw longitudes in granularity units (delta-encoded).
    pub lons: Vec<i64>,
    /// Flattened tag indices: (key, value) pairs per node, each node
    /// terminated by a 0 sentinel.
    pub keys_vals: Vec<i32>,
}

impl DenseNodes {
    /// Parse a DenseNodes message.
    pub fn decode(data: &[u8]) -> Result<Self, PbfError> {
        let mut dense = Self::default();
        let mut reader = WireReader::new(data);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => collect_sint64(value, &mut dense.ids)?,
                5 => dense.info = Some(DenseInfo::decode(value.as_bytes()?)?),
                8 => collect_sint64(value, &mut dense.lats)?,
                9 => collect_sint64(value, &mut dense.lons)?,
                10 => collect_i32(value, &mut dense.keys_vals)?,
                _ => {}
            }
        }
        Ok(dense)
    }
}

/// A way message.
#[derive(Debug, Default)]
pub struct PbfWay {
    /// Absolute way id.
    pub id: i64,
    /// Stringtable indices of tag keys.
    pub keys: Vec<u32>,
    /// Stringtable indices of tag values.
    pub vals: Vec<u32>,
    /// Optional metadata.
    pub info: Option<Info>,
    /// Referenced node ids (delta-encoded).
    pub refs: Vec<i64>,
}

impl PbfWay {
    /// Parse a Way message.
    pub fn decode(data: &[u8]) -> Result<Self, PbfError> {
        let mut way = Self::default();
        let mut reader = WireReader::new(data);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => way.id = value.as_i64()?,
                2 => collect_u32(value, &mut way.keys)?,
                3 => collect_u32(value, &mut way.vals)?,
                4 => way.info = Some(Info::decode(value.as_bytes()?)?),
                8 => collect_sint64(value, &mut way.refs)?,
                _ => {}
            }
        }
        Ok(way)
    }
}

/// A relation message.
#[derive(Debug, Default)]
pub struct PbfRelation {
    /// Absolute relation id.
    pub id: i64,
    /// Stringtable indices of tag keys.
    pub keys: Vec<u32>,
    /// Stringtable indices of tag values.
    pub vals: Vec<u32>,
    /// Optional metadata.
    pub info: Option<Info>,
    /// Stringtable indices of member roles.
    pub roles_sid: Vec<i32>,
    /// Member ids (delta-encoded).
    pub memids: Vec<i64>,
    /// Member types: 0 node, 1 way, 2 relation.
    pub types: Vec<i32>,
}

impl PbfRelation {
    /// Parse a Relation message.
    pub fn decode(data: &[u8]) -> Result<Self, PbfError> {
        let mut relation = Self::default();
        let mut reader = WireReader::new(data);
        while let Some((field, value)) = reader.next_field()? {
            match field {
                1 => relation.id = value.as_i64()?,
                2 => collect_u32(value, &mut relation.keys)?,
                3 => collect_u32(value, &mut relation.vals)?,
                4 => relation.info = Some(Info::decode(value.as_bytes()?)?),
                8 => collect_i32(value, &mut relation.roles_sid)?,
                9 => collect_sint64(value, &mut relation.memids)?,
                10 => collect_i32(value, &mut relation.types)?,
                _ => {}
            }
        }
        Ok(relation)
    }
}
