//! Shared per-wire congestion state.
//!
//! One [`PerWireData`] exists for every device wire for the lifetime of a
//! routing run. During an iteration, quadrant workers read and mutate the
//! entries of spatially disjoint wires concurrently; each entry sits
//! behind its own `RwLock` so the sharing is sound without a global lock,
//! and the locks stay uncontended as long as the dispatch partitioning
//! holds.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use strand_device::ids::{PipId, WireId};

/// A net's claim on one wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BoundRef {
    /// Number of distinct arcs of the net traversing this wire.
    pub refcount: u32,
    /// The PIP driving the wire within the net (`None` on the source).
    pub pip: Option<PipId>,
}

/// Congestion and reservation state for a single wire.
#[derive(Debug, Default)]
pub(crate) struct PerWireData {
    /// net udata → (arc refcount, driving pip).
    pub bound_nets: HashMap<u32, BoundRef>,
    /// Accumulated cost of past over-subscription; never decreases.
    pub hist_cong_cost: f32,
    /// Wire is locked by a binding stronger than STRONG.
    pub unavailable: bool,
    /// If set, only this net (by udata) may use the wire.
    pub reserved_net: Option<u32>,
}

impl PerWireData {
    pub(crate) fn new() -> Self {
        Self {
            bound_nets: HashMap::new(),
            hist_cong_cost: 1.0,
            unavailable: false,
            reserved_net: None,
        }
    }

    /// Number of nets other than `udata` currently on this wire.
    pub(crate) fn other_sources(&self, udata: u32) -> usize {
        let mut n = self.bound_nets.len();
        if self.bound_nets.contains_key(&udata) {
            n -= 1;
        }
        n
    }

    /// This net's arc refcount on the wire (0 if absent).
    pub(crate) fn source_uses(&self, udata: u32) -> u32 {
        self.bound_nets.get(&udata).map_or(0, |b| b.refcount)
    }

    /// Whether the wire would be congested for the given net: more than
    /// one net present, or one net that is not `udata`.
    pub(crate) fn congested_for(&self, udata: u32) -> bool {
        self.bound_nets.len() > 1
            || (self.bound_nets.len() == 1 && !self.bound_nets.contains_key(&udata))
    }
}

/// The present-congestion multiplier for routing `udata` through a wire.
pub(crate) fn present_wire_cost(wd: &PerWireData, udata: u32, curr_cong_weight: f32) -> f32 {
    let other = wd.other_sources(udata);
    if other == 0 {
        1.0
    } else {
        1.0 + other as f32 * curr_cong_weight
    }
}

/// Per-wire state for the whole device, indexed densely by wire.
pub(crate) struct WireStates {
    slots: Vec<RwLock<PerWireData>>,
    index: HashMap<WireId, u32>,
    order: Vec<WireId>,
}

impl WireStates {
    /// Allocates a fresh entry for every device wire.
    pub(crate) fn new(wires: &[WireId]) -> Self {
        let mut index = HashMap::with_capacity(wires.len());
        let mut slots = Vec::with_capacity(wires.len());
        for (i, &w) in wires.iter().enumerate() {
            index.insert(w, i as u32);
            slots.push(RwLock::new(PerWireData::new()));
        }
        Self {
            slots,
            index,
            order: wires.to_vec(),
        }
    }

    /// Read access to one wire's state.
    pub(crate) fn read(&self, wire: WireId) -> RwLockReadGuard<'_, PerWireData> {
        self.slots[self.index[&wire] as usize].read().unwrap()
    }

    /// Write access to one wire's state.
    pub(crate) fn write(&self, wire: WireId) -> RwLockWriteGuard<'_, PerWireData> {
        self.slots[self.index[&wire] as usize].write().unwrap()
    }

    /// The device wires in allocation order.
    pub(crate) fn wires(&self) -> &[WireId] {
        &self.order
    }
}

/// Aggregate congestion statistics for one negotiation iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CongestionStats {
    /// Sum of `bound_nets` sizes over all wires.
    pub total_wire_use: usize,
    /// Number of wires with more than one net bound.
    pub overused_wires: usize,
    /// Sum of per-wire overuse counts.
    pub total_overuse: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(n: u32) -> WireId {
        WireId::from_raw(n)
    }

    #[test]
    fn fresh_wire_state() {
        let wd = PerWireData::new();
        assert_eq!(wd.hist_cong_cost, 1.0);
        assert!(!wd.unavailable);
        assert_eq!(wd.reserved_net, None);
        assert_eq!(wd.other_sources(0), 0);
        assert_eq!(wd.source_uses(0), 0);
        assert!(!wd.congested_for(0));
    }

    #[test]
    fn other_sources_excludes_self() {
        let mut wd = PerWireData::new();
        wd.bound_nets.insert(
            3,
            BoundRef {
                refcount: 2,
                pip: None,
            },
        );
        wd.bound_nets.insert(
            5,
            BoundRef {
                refcount: 1,
                pip: None,
            },
        );
        assert_eq!(wd.other_sources(3), 1);
        assert_eq!(wd.other_sources(9), 2);
        assert_eq!(wd.source_uses(3), 2);
    }

    #[test]
    fn congested_for_semantics() {
        let mut wd = PerWireData::new();
        wd.bound_nets.insert(
            1,
            BoundRef {
                refcount: 1,
                pip: None,
            },
        );
        assert!(!wd.congested_for(1));
        assert!(wd.congested_for(2));
        wd.bound_nets.insert(
            2,
            BoundRef {
                refcount: 1,
                pip: None,
            },
        );
        assert!(wd.congested_for(1));
        assert!(wd.congested_for(2));
    }

    #[test]
    fn present_cost_scales_with_contention() {
        let mut wd = PerWireData::new();
        assert_eq!(present_wire_cost(&wd, 0, 0.5), 1.0);
        wd.bound_nets.insert(
            0,
            BoundRef {
                refcount: 1,
                pip: None,
            },
        );
        // own net only: free
        assert_eq!(present_wire_cost(&wd, 0, 0.5), 1.0);
        wd.bound_nets.insert(
            1,
            BoundRef {
                refcount: 1,
                pip: None,
            },
        );
        assert_eq!(present_wire_cost(&wd, 0, 0.5), 1.5);
        assert_eq!(present_wire_cost(&wd, 2, 0.5), 2.0);
        // weight escalation
        assert_eq!(present_wire_cost(&wd, 2, 2.0), 5.0);
    }

    #[test]
    fn wire_states_indexing() {
        let wires = vec![wire(10), wire(20), wire(30)];
        let ws = WireStates::new(&wires);
        assert_eq!(ws.wires(), &wires[..]);
        {
            let mut wd = ws.write(wire(20));
            wd.hist_cong_cost = 2.5;
        }
        assert_eq!(ws.read(wire(20)).hist_cong_cost, 2.5);
        assert_eq!(ws.read(wire(10)).hist_cong_cost, 1.0);
    }
}
