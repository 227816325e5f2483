//! Per-net and per-arc routing state.

use std::collections::HashMap;
use strand_device::ids::{PipId, WireId};
use strand_device::types::BoundingBox;

/// The routing tree of one (net, user-pin) arc: every wire the arc
/// traverses, mapped to the PIP driving it (the source wire maps to
/// `None`).
#[derive(Debug, Default)]
pub(crate) struct PerArcData {
    pub wires: HashMap<WireId, Option<PipId>>,
    pub bb: BoundingBox,
}

/// Routing state for one net.
#[derive(Debug)]
pub(crate) struct PerNetData {
    /// One entry per user pin, ordered by user index.
    pub arcs: Vec<PerArcData>,
    /// Union of the arc bounding boxes.
    pub bb: BoundingBox,
    /// Centroid of driver and user locations.
    pub cx: i32,
    /// Centroid of driver and user locations.
    pub cy: i32,
    /// Half-perimeter wirelength of the net box; at least 1.
    pub hpwl: i32,
    /// Per-user criticality from the last oracle refresh.
    pub crit: Vec<f32>,
}

impl PerNetData {
    pub(crate) fn new(users: usize) -> Self {
        let mut arcs = Vec::with_capacity(users);
        arcs.resize_with(users, PerArcData::default);
        Self {
            arcs,
            bb: BoundingBox::EMPTY,
            cx: 0,
            cy: 0,
            hpwl: 1,
            crit: vec![0.0; users],
        }
    }
}

/// The net-level facts the scoring functions need, copied out so no net
/// lock is held while wire locks are taken.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NetSummary {
    pub cx: i32,
    pub cy: i32,
    pub hpwl: i32,
    pub fanout: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_net_data_sizes_arcs() {
        let nd = PerNetData::new(3);
        assert_eq!(nd.arcs.len(), 3);
        assert_eq!(nd.crit.len(), 3);
        assert_eq!(nd.hpwl, 1);
        assert!(nd.arcs.iter().all(|a| a.wires.is_empty()));
    }

    #[test]
    fn arc_tree_maps_source_to_none() {
        let mut ad = PerArcData::default();
        ad.wires.insert(WireId::from_raw(0), None);
        ad.wires
            .insert(WireId::from_raw(1), Some(PipId::from_raw(7)));
        assert_eq!(ad.wires[&WireId::from_raw(0)], None);
        assert_eq!(ad.wires[&WireId::from_raw(1)], Some(PipId::from_raw(7)));
    }
}
