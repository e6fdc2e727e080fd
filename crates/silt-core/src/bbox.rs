//! Geographic bounding boxes.

use crate::location::Location;
use std::fmt;

/// An axis-aligned bounding box over fixed-point coordinates.
///
/// A default-constructed box is empty; extending it with locations
/// grows it to cover them. Undefined locations are ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundingBox {
    bottom_left: Location,
    top_right: Location,
}

impl BoundingBox {
    /// Create an empty bounding box.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the box to cover `location`. Undefined locations leave
    /// the box unchanged.
    pub fn extend(&mut self, location: Location) -> &mut Self {
        if location.is_defined() {
            if self.bottom_left.is_defined() {
                self.bottom_left = Location::new(
                    self.bottom_left.lon().min(location.lon()),
                    self.bottom_left.lat().min(location.lat()),
                );
                self.top_right = Location::new(
                    self.top_right.lon().max(location.lon()),
                    self.top_right.lat().max(location.lat()),
                );
            } else {
                self.bottom_left = location;
                self.top_right = location;
            }
        }
        self
    }

    /// Whether the box covers at least one point.
    pub fn is_defined(&self) -> bool {
        self.bottom_left.is_defined()
    }

    /// The south-west corner, undefined for an empty box.
    pub fn bottom_left(&self) -> Location {
        self.bottom_left
    }

    /// The north-east corner, undefined for an empty box.
    pub fn top_right(&self) -> Location {
        self.top_right
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}]", self.bottom_left, self.top_right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_is_undefined() {
        let bbox = BoundingBox::new();
        assert!(!bbox.is_defined());
        assert!(bbox.bottom_left().is_undefined());
    }

    #[test]
    fn extend_grows_to_cover() {
        let mut bbox = BoundingBox::new();
        bbox.extend(Location::new(100, 200));
        bbox.extend(Location::new(-50, 400));
        assert_eq!(bbox.bottom_left(), Location::new(-50, 200));
        assert_eq!(bbox.top_right(), Location::new(100, 400));
    }

    #[test]
    fn extend_ignores_undefined() {
        let mut bbox = BoundingBox::new();
        bbox.extend(Location::undefined());
        assert!(!bbox.is_defined());

        bbox.extend(Location::new(1, 2));
        bbox.extend(Location::undefined());
        assert_eq!(bbox.bottom_left(), Location::new(1, 2));
        assert_eq!(bbox.top_right(), Location::new(1, 2));
    }
}
