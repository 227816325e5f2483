//! Core netlist data structures.
//!
//! Defines the physical netlist mutated by placement and routing: cells
//! (with current BEL assignment, constraints, and chain structure), nets
//! (driver, users, and committed wire/PIP bindings), and placement regions.
//! The [`Netlist`] is the central structure both cores operate on.

use serde::{Deserialize, Serialize};
use strand_device::ids::{BelId, BelTypeId, CellId, NetId, PipId, RegionId, WireId};
use strand_device::types::{Delay, Loc, Strength};
use std::collections::HashMap;

/// A cell in the netlist.
///
/// Each cell occupies at most one BEL. Chain membership is expressed with
/// `constr_parent`/`constr_children` and a fixed offset relative to the
/// parent; chains are moved atomically by the placer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// The unique ID of this cell.
    pub id: CellId,
    /// Human-readable cell name.
    pub name: String,
    /// The BEL type this cell must be placed on.
    pub ty: BelTypeId,
    /// The BEL this cell currently occupies (`None` = unplaced).
    pub bel: Option<BelId>,
    /// Strength of the current BEL binding.
    pub bel_strength: Strength,
    /// A user-pinned BEL; placed first and never moved.
    pub pinned_bel: Option<BelId>,
    /// The region this cell is constrained to, if any.
    pub region: Option<RegionId>,
    /// Parent cell in a placement chain.
    pub constr_parent: Option<CellId>,
    /// Child cells in a placement chain.
    pub constr_children: Vec<CellId>,
    /// Required location offset relative to the chain parent.
    pub constr_offset: Option<Loc>,
}

impl Cell {
    /// Whether this cell participates in a placement chain.
    pub fn is_constrained(&self) -> bool {
        self.constr_parent.is_some() || !self.constr_children.is_empty()
    }

    /// Whether this cell is the basis (root) of a placement chain.
    pub fn is_chain_basis(&self) -> bool {
        self.constr_parent.is_none()
            && (!self.constr_children.is_empty() || self.constr_offset.is_some())
    }
}

/// The driving port of a net.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetDriver {
    /// The cell whose output drives the net.
    pub cell: CellId,
    /// The output port name, for diagnostics.
    pub port: String,
    /// The fabric wire the driver launches onto.
    pub source_wire: Option<WireId>,
}

/// One user (sink) of a net.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetUser {
    /// The cell whose input consumes the net.
    pub cell: CellId,
    /// The input port name, for diagnostics.
    pub port: String,
    /// The fabric wire the signal must reach.
    pub sink_wire: Option<WireId>,
    /// Slack budget for this arc (budget-based timing cost).
    pub budget: Delay,
}

/// A committed routing entry: one wire of a net's tree and the PIP
/// driving it (`None` for the source wire).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetWire {
    /// The bound wire.
    pub wire: WireId,
    /// The PIP driving the wire within this net, if not the source.
    pub pip: Option<PipId>,
    /// Binding strength.
    pub strength: Strength,
}

/// A net in the netlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Net {
    /// The unique ID of this net.
    pub id: NetId,
    /// Human-readable net name.
    pub name: String,
    /// The driver, if the net is driven.
    pub driver: Option<NetDriver>,
    /// The users of this net, in stable order.
    pub users: Vec<NetUser>,
    /// Committed routing: every wire of the net's tree.
    pub wires: Vec<NetWire>,
    /// Whether this net rides a dedicated global network and is skipped
    /// by the general-purpose router.
    pub is_global: bool,
    /// Dense index stamped at core setup for array-indexed lookup.
    pub udata: u32,
}

impl Net {
    /// Looks up the committed entry for a wire, if present.
    pub fn wire_entry(&self, wire: WireId) -> Option<&NetWire> {
        self.wires.iter().find(|w| w.wire == wire)
    }

    /// Adds or replaces a committed routing entry.
    pub fn set_wire_entry(&mut self, entry: NetWire) {
        match self.wires.iter_mut().find(|w| w.wire == entry.wire) {
            Some(slot) => *slot = entry,
            None => self.wires.push(entry),
        }
    }

    /// Removes a committed routing entry.
    pub fn remove_wire_entry(&mut self, wire: WireId) {
        self.wires.retain(|w| w.wire != wire);
    }
}

/// A placement region constraining the cells assigned to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    /// The unique ID of this region.
    pub id: RegionId,
    /// Human-readable region name.
    pub name: String,
    /// Whether the region restricts BEL choice to its BEL list.
    pub constr_bels: bool,
    /// BELs belonging to the region.
    pub bels: Vec<BelId>,
}

/// The netlist operated on by placement and routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Netlist {
    /// All cells.
    pub cells: Vec<Cell>,
    /// All nets.
    pub nets: Vec<Net>,
    /// All regions.
    pub regions: Vec<Region>,
    /// Auxiliary index: cell name to ID (rebuilt on deserialization).
    #[serde(skip)]
    pub cell_by_name: HashMap<String, CellId>,
    /// Auxiliary index: net name to ID (rebuilt on deserialization).
    #[serde(skip)]
    pub net_by_name: HashMap<String, NetId>,
}

impl Netlist {
    /// Creates an empty netlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cell and returns its ID.
    pub fn add_cell(&mut self, mut cell: Cell) -> CellId {
        let id = CellId::from_raw(self.cells.len() as u32);
        cell.id = id;
        self.cell_by_name.insert(cell.name.clone(), id);
        self.cells.push(cell);
        id
    }

    /// Adds a net and returns its ID.
    pub fn add_net(&mut self, mut net: Net) -> NetId {
        let id = NetId::from_raw(self.nets.len() as u32);
        net.id = id;
        self.net_by_name.insert(net.name.clone(), id);
        self.nets.push(net);
        id
    }

    /// Adds a region and returns its ID.
    pub fn add_region(&mut self, mut region: Region) -> RegionId {
        let id = RegionId::from_raw(self.regions.len() as u32);
        region.id = id;
        self.regions.push(region);
        id
    }

    /// Returns the cell with the given ID.
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.index()]
    }

    /// Returns a mutable reference to the cell with the given ID.
    pub fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        &mut self.cells[id.index()]
    }

    /// Returns the net with the given ID.
    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.index()]
    }

    /// Returns a mutable reference to the net with the given ID.
    pub fn net_mut(&mut self, id: NetId) -> &mut Net {
        &mut self.nets[id.index()]
    }

    /// Returns the region with the given ID.
    pub fn region(&self, id: RegionId) -> &Region {
        &self.regions[id.index()]
    }

    /// Returns the number of cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Returns the number of nets.
    pub fn net_count(&self) -> usize {
        self.nets.len()
    }

    /// The source wire of a net (the sink wire for undriven nets).
    pub fn source_wire(&self, net: NetId) -> Option<WireId> {
        let n = self.net(net);
        match &n.driver {
            Some(d) => d.source_wire,
            None => n.users.first().and_then(|u| u.sink_wire),
        }
    }

    /// The sink wire for one user of a net.
    pub fn sink_wire(&self, net: NetId, user: usize) -> Option<WireId> {
        self.net(net).users.get(user).and_then(|u| u.sink_wire)
    }

    /// Returns whether every cell has a BEL assignment.
    pub fn is_fully_placed(&self) -> bool {
        self.cells.iter().all(|c| c.bel.is_some())
    }

    /// Returns whether every net with users has committed routing.
    pub fn is_fully_routed(&self) -> bool {
        self.nets
            .iter()
            .all(|n| n.users.is_empty() || n.is_global || !n.wires.is_empty())
    }

    /// Rebuilds auxiliary name indices after deserialization.
    pub fn rebuild_indices(&mut self) {
        self.cell_by_name.clear();
        for (i, cell) in self.cells.iter().enumerate() {
            self.cell_by_name
                .insert(cell.name.clone(), CellId::from_raw(i as u32));
        }
        self.net_by_name.clear();
        for (i, net) in self.nets.iter().enumerate() {
            self.net_by_name
                .insert(net.name.clone(), NetId::from_raw(i as u32));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_cell(name: &str) -> Cell {
        Cell {
            id: CellId::from_raw(0),
            name: name.into(),
            ty: BelTypeId::from_raw(0),
            bel: None,
            bel_strength: Strength::Weak,
            pinned_bel: None,
            region: None,
            constr_parent: None,
            constr_children: Vec::new(),
            constr_offset: None,
        }
    }

    fn blank_net(name: &str, driver: Option<CellId>) -> Net {
        Net {
            id: NetId::from_raw(0),
            name: name.into(),
            driver: driver.map(|cell| NetDriver {
                cell,
                port: "O".into(),
                source_wire: None,
            }),
            users: Vec::new(),
            wires: Vec::new(),
            is_global: false,
            udata: 0,
        }
    }

    #[test]
    fn empty_netlist() {
        let nl = Netlist::new();
        assert_eq!(nl.cell_count(), 0);
        assert_eq!(nl.net_count(), 0);
        assert!(nl.is_fully_placed());
        assert!(nl.is_fully_routed());
    }

    #[test]
    fn add_and_lookup_cell() {
        let mut nl = Netlist::new();
        let id = nl.add_cell(blank_cell("lc_0"));
        assert_eq!(nl.cell(id).name, "lc_0");
        assert_eq!(nl.cell_by_name.get("lc_0"), Some(&id));
        assert!(!nl.is_fully_placed());
        nl.cell_mut(id).bel = Some(BelId::from_raw(3));
        assert!(nl.is_fully_placed());
    }

    #[test]
    fn add_and_lookup_net() {
        let mut nl = Netlist::new();
        let c = nl.add_cell(blank_cell("drv"));
        let id = nl.add_net(blank_net("n0", Some(c)));
        assert_eq!(nl.net(id).name, "n0");
        assert_eq!(nl.net_by_name.get("n0"), Some(&id));
    }

    #[test]
    fn source_wire_falls_back_to_sink_for_undriven_nets() {
        let mut nl = Netlist::new();
        let c = nl.add_cell(blank_cell("snk"));
        let mut net = blank_net("n0", None);
        net.users.push(NetUser {
            cell: c,
            port: "I".into(),
            sink_wire: Some(WireId::from_raw(5)),
            budget: Delay::ZERO,
        });
        let id = nl.add_net(net);
        assert_eq!(nl.source_wire(id), Some(WireId::from_raw(5)));
        assert_eq!(nl.sink_wire(id, 0), Some(WireId::from_raw(5)));
        assert_eq!(nl.sink_wire(id, 1), None);
    }

    #[test]
    fn wire_entries() {
        let mut net = blank_net("n0", None);
        let w = WireId::from_raw(1);
        net.set_wire_entry(NetWire {
            wire: w,
            pip: None,
            strength: Strength::Weak,
        });
        assert!(net.wire_entry(w).is_some());
        net.set_wire_entry(NetWire {
            wire: w,
            pip: Some(PipId::from_raw(2)),
            strength: Strength::Weak,
        });
        assert_eq!(net.wires.len(), 1);
        assert_eq!(net.wire_entry(w).unwrap().pip, Some(PipId::from_raw(2)));
        net.remove_wire_entry(w);
        assert!(net.wire_entry(w).is_none());
    }

    #[test]
    fn routed_tracking_ignores_sinkless_and_global_nets() {
        let mut nl = Netlist::new();
        let c = nl.add_cell(blank_cell("drv"));
        nl.add_net(blank_net("dangling", Some(c)));
        let mut clk = blank_net("clk", Some(c));
        clk.is_global = true;
        clk.users.push(NetUser {
            cell: c,
            port: "CLK".into(),
            sink_wire: None,
            budget: Delay::ZERO,
        });
        nl.add_net(clk);
        assert!(nl.is_fully_routed());
    }

    #[test]
    fn chain_classification() {
        let mut parent = blank_cell("p");
        parent.constr_children.push(CellId::from_raw(1));
        assert!(parent.is_constrained());
        assert!(parent.is_chain_basis());

        let mut child = blank_cell("c");
        child.constr_parent = Some(CellId::from_raw(0));
        child.constr_offset = Some(Loc::new(0, 1, 0));
        assert!(child.is_constrained());
        assert!(!child.is_chain_basis());

        assert!(!blank_cell("free").is_constrained());
    }

    #[test]
    fn serde_roundtrip_rebuilds_indices() {
        let mut nl = Netlist::new();
        let c = nl.add_cell(blank_cell("lc_0"));
        let mut net = blank_net("n0", Some(c));
        net.wires.push(NetWire {
            wire: WireId::from_raw(9),
            pip: Some(PipId::from_raw(4)),
            strength: Strength::Weak,
        });
        nl.add_net(net);

        let json = serde_json::to_string(&nl).unwrap();
        let mut restored: Netlist = serde_json::from_str(&json).unwrap();
        assert!(restored.cell_by_name.is_empty());
        restored.rebuild_indices();
        assert!(restored.cell_by_name.contains_key("lc_0"));
        assert!(restored.net_by_name.contains_key("n0"));
        assert_eq!(restored.net(NetId::from_raw(0)).wires.len(), 1);
    }
}
