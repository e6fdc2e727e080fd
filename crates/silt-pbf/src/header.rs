//! File header decoding and encoding.
//!
//! The single `OSMHeader` blob at the start of a PBF file carries the
//! required-feature list, the writing program, and an optional
//! bounding box. Unknown required features are fatal; everything else
//! is informational.

use silt_core::{BoundingBox, Location};

use crate::error::PbfError;
use crate::proto::HeaderBlock;
use crate::wire::{put_bytes_field, put_sint_field, put_str_field};
use crate::RESOLUTION_DIVISOR;

/// Required feature: the v0.6 object schema.
const FEATURE_SCHEMA: &str = "OsmSchema-V0.6";
/// Required feature: the file contains dense-node groups.
const FEATURE_DENSE: &str = "DenseNodes";
/// Required feature: the file may contain several versions of one
/// object (history and change files).
const FEATURE_HISTORY: &str = "HistoricalInformation";

/// Meta information from the header of an OSM file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    /// The program that generated the file.
    pub generator: Option<String>,
    /// The file bounding box, when declared.
    pub bounding_box: Option<BoundingBox>,
    /// Whether the file declared the DenseNodes feature.
    pub pbf_has_dense_nodes: bool,
    /// Whether the file may contain multiple versions of the same
    /// object (set by the HistoricalInformation feature).
    pub has_multiple_object_versions: bool,
}

/// Decode the content of an `OSMHeader` blob.
pub fn decode_header_block(data: &[u8]) -> Result<Header, PbfError> {
    let block = HeaderBlock::decode(data)?;
    let mut header = Header::default();

    for feature in &block.required_features {
        match *feature {
            FEATURE_SCHEMA => {}
            FEATURE_DENSE => header.pbf_has_dense_nodes = true,
            FEATURE_HISTORY => header.has_multiple_object_versions = true,
            other => {
                return Err(PbfError::unsupported(format!(
                    "required feature {other:?}"
                )));
            }
        }
    }

    if let Some(program) = block.writingprogram {
        header.generator = Some(program.to_owned());
    }

    if let Some(bbox) = block.bbox {
        let mut bounds = BoundingBox::new();
        bounds.extend(Location::new(
            (bbox.left / RESOLUTION_DIVISOR) as i32,
            (bbox.bottom / RESOLUTION_DIVISOR) as i32,
        ));
        bounds.extend(Location::new(
            (bbox.right / RESOLUTION_DIVISOR) as i32,
            (bbox.top / RESOLUTION_DIVISOR) as i32,
        ));
        header.bounding_box = Some(bounds);
    }

    Ok(header)
}

/// Encode a [`Header`] into the content of an `OSMHeader` blob.
pub fn encode_header_block(header: &Header) -> Vec<u8> {
    let mut out = Vec::new();

    if let Some(bounds) = &header.bounding_box {
        if bounds.is_defined() {
            let mut bbox = Vec::new();
            let bl = bounds.bottom_left();
            let tr = bounds.top_right();
            put_sint_field(&mut bbox, 1, i64::from(bl.lon()) * RESOLUTION_DIVISOR);
            put_sint_field(&mut bbox, 2, i64::from(tr.lon()) * RESOLUTION_DIVISOR);
            put_sint_field(&mut bbox, 3, i64::from(tr.lat()) * RESOLUTION_DIVISOR);
            put_sint_field(&mut bbox, 4, i64::from(bl.lat()) * RESOLUTION_DIVISOR);
            put_bytes_field(&mut out, 1, &bbox);
        }
    }

    put_str_field(&mut out, 4, FEATURE_SCHEMA);
    put_str_field(&mut out, 4, FEATURE_DENSE);
    if header.has_multiple_object_versions {
        put_str_field(&mut out, 4, FEATURE_HISTORY);
    }

    if let Some(generator) = &header.generator {
        put_str_field(&mut out, 16, generator);
    }

    out
}
