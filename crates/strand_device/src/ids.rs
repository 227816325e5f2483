//! Opaque ID newtypes for fabric and netlist entities.
//!
//! Each ID is a thin `u32` wrapper that is `Copy`, `Hash`, and
//! `Serialize`/`Deserialize`. Fabric IDs ([`BelId`], [`WireId`], [`PipId`],
//! [`BelTypeId`]) reference resources inside a device model. Netlist IDs
//! ([`CellId`], [`NetId`], [`RegionId`]) are stamped by the host netlist but
//! live here so the device binding contract can reference them without a
//! dependency cycle.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }

            /// Returns the raw index widened to `usize` for table lookups.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID for a BEL (basic element of logic) in the fabric.
    BelId
);

define_id!(
    /// Opaque, copyable ID for a routing wire in the device fabric.
    WireId
);

define_id!(
    /// Opaque, copyable ID for a programmable interconnect point (PIP) connecting wires.
    PipId
);

define_id!(
    /// Opaque, copyable ID for a BEL type (the resource class a cell maps onto).
    BelTypeId
);

define_id!(
    /// Opaque, copyable ID for a cell in the host netlist.
    CellId
);

define_id!(
    /// Opaque, copyable ID for a net in the host netlist.
    NetId
);

define_id!(
    /// Opaque, copyable ID for a placement region in the host netlist.
    RegionId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn id_roundtrip() {
        let id = WireId::from_raw(42);
        assert_eq!(id.as_raw(), 42);
        assert_eq!(id.index(), 42);
    }

    #[test]
    fn id_equality() {
        let a = PipId::from_raw(7);
        let b = PipId::from_raw(7);
        let c = PipId::from_raw(8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn id_ordering() {
        assert!(NetId::from_raw(1) < NetId::from_raw(2));
    }

    #[test]
    fn id_hash_in_set() {
        let mut set = HashSet::new();
        set.insert(BelId::from_raw(1));
        set.insert(BelId::from_raw(2));
        set.insert(BelId::from_raw(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn id_serde_roundtrip() {
        let id = CellId::from_raw(99);
        let json = serde_json::to_string(&id).unwrap();
        let restored: CellId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn id_display() {
        assert_eq!(format!("{}", WireId::from_raw(5)), "5");
    }

    #[test]
    fn all_id_types_construct() {
        let _ = BelId::from_raw(0);
        let _ = WireId::from_raw(0);
        let _ = PipId::from_raw(0);
        let _ = BelTypeId::from_raw(0);
        let _ = CellId::from_raw(0);
        let _ = NetId::from_raw(0);
        let _ = RegionId::from_raw(0);
    }
}
