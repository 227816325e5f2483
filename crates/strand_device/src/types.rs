//! Shared geometry, timing, and binding-strength types.
//!
//! These are the structural vocabulary of the device model: grid locations,
//! bounding boxes (used both for routing search windows and placement
//! wirelength), min/typ/max delays, binding strengths, and BEL pin
//! directions.

use crate::ids::BelId;
use serde::{Deserialize, Serialize};

/// A location in the device grid.
///
/// `x`/`y` index the tile grid; `z` disambiguates co-located resources
/// (e.g. the four LUTs of one slice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Loc {
    /// Column index.
    pub x: i32,
    /// Row index.
    pub y: i32,
    /// Sub-tile index.
    pub z: i32,
}

impl Loc {
    /// Creates a location from its coordinates.
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Manhattan distance to another location, ignoring `z`.
    pub fn manhattan(&self, other: &Loc) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// An inclusive axis-aligned bounding box over grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum column.
    pub x0: i32,
    /// Minimum row.
    pub y0: i32,
    /// Maximum column.
    pub x1: i32,
    /// Maximum row.
    pub y1: i32,
}

impl BoundingBox {
    /// An inverted box that any union will collapse to a real extent.
    pub const EMPTY: Self = Self {
        x0: i32::MAX,
        y0: i32::MAX,
        x1: i32::MIN,
        y1: i32::MIN,
    };

    /// Creates a box from its corner coordinates.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// A degenerate box covering a single point.
    pub fn point(x: i32, y: i32) -> Self {
        Self {
            x0: x,
            y0: y,
            x1: x,
            y1: y,
        }
    }

    /// Grows the box to include the given point.
    pub fn extend(&mut self, x: i32, y: i32) {
        self.x0 = self.x0.min(x);
        self.y0 = self.y0.min(y);
        self.x1 = self.x1.max(x);
        self.y1 = self.y1.max(y);
    }

    /// Grows the box to include another box.
    pub fn union(&mut self, other: &BoundingBox) {
        self.x0 = self.x0.min(other.x0);
        self.y0 = self.y0.min(other.y0);
        self.x1 = self.x1.max(other.x1);
        self.y1 = self.y1.max(other.y1);
    }

    /// Returns whether the point lies inside the box (inclusive).
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Returns whether the point lies on the box perimeter.
    pub fn touches_edge(&self, x: i32, y: i32) -> bool {
        x == self.x0 || x == self.x1 || y == self.y0 || y == self.y1
    }

    /// Returns whether the point lies inside the box expanded by `margin`
    /// on every side.
    pub fn contains_with_margin(&self, x: i32, y: i32, margin: i32) -> bool {
        x >= self.x0 - margin && x <= self.x1 + margin && y >= self.y0 - margin && y <= self.y1 + margin
    }

    /// Half-perimeter wirelength of the box.
    pub fn hpwl(&self) -> i64 {
        i64::from(self.x1 - self.x0) + i64::from(self.y1 - self.y0)
    }

    /// Box width in grid units.
    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    /// Box height in grid units.
    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::point(0, 0)
    }
}

/// A timing delay with min/typical/max corners in nanoseconds.
///
/// Routing and placement costs consume the `max_ns` (slow corner)
/// projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Delay {
    /// Minimum delay in nanoseconds (fast corner).
    pub min_ns: f64,
    /// Typical delay in nanoseconds (nominal corner).
    pub typ_ns: f64,
    /// Maximum delay in nanoseconds (slow corner).
    pub max_ns: f64,
}

impl Delay {
    /// A zero delay.
    pub const ZERO: Self = Self {
        min_ns: 0.0,
        typ_ns: 0.0,
        max_ns: 0.0,
    };

    /// Creates a new delay with the given min/typ/max values.
    pub fn new(min_ns: f64, typ_ns: f64, max_ns: f64) -> Self {
        Self {
            min_ns,
            typ_ns,
            max_ns,
        }
    }

    /// Creates a delay with all three corners equal.
    pub fn flat(ns: f64) -> Self {
        Self::new(ns, ns, ns)
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::ZERO
    }
}

/// The strength of a resource binding.
///
/// The cores overwrite WEAK bindings freely, keep STRONG bindings unless
/// forced, and never touch USER bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Strength {
    /// A binding placed by an optimizer; may be ripped up at any time.
    Weak,
    /// A binding placed by an earlier pass (e.g. a global clock router).
    Strong,
    /// A binding pinned by the user; immovable.
    User,
}

/// The direction of a BEL pin relative to the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDir {
    /// The pin consumes a signal from the routing fabric.
    Input,
    /// The pin drives a signal onto the routing fabric.
    Output,
    /// The pin is bidirectional.
    Inout,
}

/// A BEL pin attached to a routing wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BelPin {
    /// The BEL the pin belongs to.
    pub bel: BelId,
    /// The pin's direction.
    pub dir: PinDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loc_manhattan() {
        let a = Loc::new(1, 2, 0);
        let b = Loc::new(4, 0, 3);
        assert_eq!(a.manhattan(&b), 5);
        assert_eq!(b.manhattan(&a), 5);
        assert_eq!(a.manhattan(&a), 0);
    }

    #[test]
    fn bbox_extend_from_empty() {
        let mut bb = BoundingBox::EMPTY;
        bb.extend(3, 7);
        assert_eq!(bb, BoundingBox::point(3, 7));
        bb.extend(1, 9);
        assert_eq!(bb, BoundingBox::new(1, 7, 3, 9));
    }

    #[test]
    fn bbox_union() {
        let mut a = BoundingBox::new(0, 0, 2, 2);
        let b = BoundingBox::new(1, 1, 5, 4);
        a.union(&b);
        assert_eq!(a, BoundingBox::new(0, 0, 5, 4));
    }

    #[test]
    fn bbox_contains() {
        let bb = BoundingBox::new(1, 1, 4, 4);
        assert!(bb.contains(1, 1));
        assert!(bb.contains(4, 4));
        assert!(bb.contains(2, 3));
        assert!(!bb.contains(0, 2));
        assert!(!bb.contains(5, 2));
    }

    #[test]
    fn bbox_touches_edge() {
        let bb = BoundingBox::new(1, 1, 4, 4);
        assert!(bb.touches_edge(1, 2));
        assert!(bb.touches_edge(3, 4));
        assert!(!bb.touches_edge(2, 2));
    }

    #[test]
    fn bbox_margin() {
        let bb = BoundingBox::new(2, 2, 3, 3);
        assert!(bb.contains_with_margin(0, 2, 2));
        assert!(bb.contains_with_margin(5, 5, 2));
        assert!(!bb.contains_with_margin(6, 2, 2));
    }

    #[test]
    fn bbox_hpwl() {
        assert_eq!(BoundingBox::new(0, 0, 3, 2).hpwl(), 5);
        assert_eq!(BoundingBox::point(7, 7).hpwl(), 0);
    }

    #[test]
    fn delay_corners() {
        let d = Delay::new(0.1, 0.2, 0.3);
        assert_eq!(d.max_ns, 0.3);
        assert_eq!(Delay::flat(0.5).min_ns, 0.5);
        assert_eq!(Delay::default(), Delay::ZERO);
    }

    #[test]
    fn strength_ordering() {
        assert!(Strength::Weak < Strength::Strong);
        assert!(Strength::Strong < Strength::User);
    }

    #[test]
    fn serde_roundtrips() {
        let bb = BoundingBox::new(-1, 0, 3, 9);
        let json = serde_json::to_string(&bb).unwrap();
        assert_eq!(bb, serde_json::from_str::<BoundingBox>(&json).unwrap());

        let d = Delay::new(0.5, 1.0, 1.5);
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(d, serde_json::from_str::<Delay>(&json).unwrap());

        let s = Strength::Strong;
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(s, serde_json::from_str::<Strength>(&json).unwrap());
    }
}
