//! Scalar type aliases and the read-type mask.

use crate::kind::ItemKind;
use std::fmt;

/// A signed 64-bit OSM object id.
pub type ObjectId = i64;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Bitmask selecting which entity kinds a reader should decode.
///
/// Groups whose kind is not in the mask are skipped entirely during
/// decoding, so a nodes-only read of a planet file never materialises
/// a single way or relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReadTypes(u8);

impl ReadTypes {
    /// Decode nothing (header only).
    pub const NOTHING: Self = Self(0);
    /// Decode nodes (plain and dense).
    pub const NODE: Self = Self(1 << 0);
    /// Decode ways.
    pub const WAY: Self = Self(1 << 1);
    /// Decode relations.
    pub const RELATION: Self = Self(1 << 2);
    /// Decode changesets.
    pub const CHANGESET: Self = Self(1 << 3);
    /// Decode every entity kind.
    pub const ALL: Self = Self(0b1111);

    /// Whether every kind in `other` is also in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the mask selects nothing.
    pub const fn is_nothing(self) -> bool {
        self.0 == 0
    }

    /// Whether the mask selects the given entity kind. Sub-item kinds
    /// are never selected.
    pub fn wants(self, kind: ItemKind) -> bool {
        let bit = match kind {
            ItemKind::Node => Self::NODE,
            ItemKind::Way => Self::WAY,
            ItemKind::Relation => Self::RELATION,
            ItemKind::Changeset => Self::CHANGESET,
            _ => return false,
        };
        self.contains(bit)
    }
}

impl Default for ReadTypes {
    fn default() -> Self {
        Self::ALL
    }
}

impl std::ops::BitOr for ReadTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for ReadTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (bit, name) in [
            (Self::NODE, "node"),
            (Self::WAY, "way"),
            (Self::RELATION, "relation"),
            (Self::CHANGESET, "changeset"),
        ] {
            if self.contains(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("nothing")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_contains_each_kind() {
        for mask in [
            ReadTypes::NODE,
            ReadTypes::WAY,
            ReadTypes::RELATION,
            ReadTypes::CHANGESET,
        ] {
            assert!(ReadTypes::ALL.contains(mask));
        }
    }

    #[test]
    fn or_combines_masks() {
        let mask = ReadTypes::NODE | ReadTypes::WAY;
        assert!(mask.contains(ReadTypes::NODE));
        assert!(mask.contains(ReadTypes::WAY));
        assert!(!mask.contains(ReadTypes::RELATION));
    }

    #[test]
    fn wants_maps_entity_kinds() {
        let mask = ReadTypes::WAY;
        assert!(mask.wants(ItemKind::Way));
        assert!(!mask.wants(ItemKind::Node));
        assert!(!mask.wants(ItemKind::TagList));
    }

    #[test]
    fn nothing_selects_nothing() {
        assert!(ReadTypes::NOTHING.is_nothing());
        assert!(!ReadTypes::NOTHING.wants(ItemKind::Node));
        assert_eq!(ReadTypes::NOTHING.to_string(), "nothing");
    }

    #[test]
    fn display_lists_selected_kinds() {
        assert_eq!((ReadTypes::NODE | ReadTypes::RELATION).to_string(), "node|relation");
        assert_eq!(ReadTypes::ALL.to_string(), "node|way|relation|changeset");
    }
}
