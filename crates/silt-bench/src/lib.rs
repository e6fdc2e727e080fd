//! Benchmark helpers for silt.
//!
//! Fixture builders shared by the criterion benches: synthetic dense
//! blocks and arena buffers of configurable size.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use silt_arena::{Buffer, GrowPolicy, NodeBuilder, WayBuilder};
use silt_core::Location;

/// Build a buffer of `count` tagged nodes on a small coordinate grid.
pub fn node_fixture(count: usize) -> Buffer {
    let mut buffer = Buffer::new(1 << 20, GrowPolicy::AutoGrow);
    for i in 0..count {
        let mut builder = NodeBuilder::new(&mut buffer).expect("fixture build");
        builder
            .set_id(i as i64 + 1)
            .set_version(1)
            .set_changeset(900 + i as i64 / 100)
            .set_timestamp(1_600_000_000 + i as i64)
            .set_location(Location::new((i % 1000) as i32 * 100, (i / 1000) as i32 * 100));
        builder.add_user("bench").expect("fixture build");
        let mut tags = builder.tags().expect("fixture build");
        tags.add_tag("natural", "tree").expect("fixture build");
        tags.finish().expect("fixture build");
        builder.finish().expect("fixture build");
    }
    buffer
}

/// Build a buffer of `count` ways with `refs_per_way` node refs each.
pub fn way_fixture(count: usize, refs_per_way: usize) -> Buffer {
    let mut buffer = Buffer::new(1 << 20, GrowPolicy::AutoGrow);
    for i in 0..count {
        let mut builder = WayBuilder::new(&mut buffer).expect("fixture build");
        builder.set_id(i as i64 + 1).set_version(1);
        builder.add_user("bench").expect("fixture build");
        let mut nodes = builder.nodes().expect("fixture build");
        for r in 0..refs_per_way {
            nodes
                .add_node_ref((i * refs_per_way + r) as i64, Location::undefined())
                .expect("fixture build");
        }
        nodes.finish().expect("fixture build");
        builder.finish().expect("fixture build");
    }
    buffer
}
