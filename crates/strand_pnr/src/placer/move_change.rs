//! Incremental cost accounting for placement moves.
//!
//! Every candidate move gathers the nets whose bounding box may change and
//! the arcs whose timing cost must be re-evaluated into a
//! [`MoveChangeData`]. Deduplication uses parallel boolean arrays that the
//! same structure resets, so it is reused across millions of moves without
//! reallocation. Shadow moves (worker proposals) are expressed as a
//! `movedCells` overlay instead of touching the netlist.

use crate::placer::Placer;
use std::collections::HashMap;
use strand_device::ids::{BelId, CellId};
use strand_device::types::BoundingBox;
use strand_netlist::Net;

/// Shadow placement overlay: cell → BEL it would occupy if the move under
/// evaluation were applied.
pub(crate) type MovedCells = HashMap<CellId, BelId>;

/// Which side of a net a cell's port is on.
#[derive(Debug, Clone, Copy)]
pub(crate) enum PortSlot {
    /// The cell drives the net (all arcs change timing on a move).
    Driver(u32),
    /// The cell is user `.1` of net `.0` (one arc changes).
    User(u32, u32),
}

/// Dirty-set and delta accumulator for one move.
#[derive(Debug, Default)]
pub(crate) struct MoveChangeData {
    pub bounds_changed_nets: Vec<u32>,
    pub changed_arcs: Vec<(u32, u32)>,
    pub already_bounds_changed: Vec<bool>,
    pub already_changed_arcs: Vec<Vec<bool>>,
    pub new_net_bounds: Vec<(u32, BoundingBox)>,
    pub new_arc_costs: Vec<((u32, u32), f64)>,
    pub wirelen_delta: i64,
    pub timing_delta: f64,
}

impl MoveChangeData {
    /// Allocates dedup arrays for a design with the given per-net user
    /// counts (indexed by udata).
    pub(crate) fn new(arc_sizes: &[usize]) -> Self {
        Self {
            bounds_changed_nets: Vec::new(),
            changed_arcs: Vec::new(),
            already_bounds_changed: vec![false; arc_sizes.len()],
            already_changed_arcs: arc_sizes.iter().map(|&n| vec![false; n]).collect(),
            new_net_bounds: Vec::new(),
            new_arc_costs: Vec::new(),
            wirelen_delta: 0,
            timing_delta: 0.0,
        }
    }

    /// Clears the dirty sets and deltas; the boolean arrays are reset via
    /// the recorded entries so the cost stays proportional to the move.
    pub(crate) fn reset(&mut self) {
        for &bc in &self.bounds_changed_nets {
            self.already_bounds_changed[bc as usize] = false;
        }
        for &(n, u) in &self.changed_arcs {
            self.already_changed_arcs[n as usize][u as usize] = false;
        }
        self.bounds_changed_nets.clear();
        self.changed_arcs.clear();
        self.new_net_bounds.clear();
        self.new_arc_costs.clear();
        self.wirelen_delta = 0;
        self.timing_delta = 0.0;
    }
}

impl Placer<'_> {
    /// The BEL a cell occupies under the shadow overlay.
    pub(crate) fn cell_bel(&self, cell: CellId, moved: &MovedCells) -> Option<BelId> {
        match moved.get(&cell) {
            Some(&bel) => Some(bel),
            None => self.netlist.cell(cell).bel,
        }
    }

    /// Nets that never participate in cost accounting: undriven, driven
    /// from an unplaced cell, or riding a global buffer network.
    pub(crate) fn ignore_net(&self, net: &Net) -> bool {
        match &net.driver {
            None => true,
            Some(d) => match self.netlist.cell(d.cell).bel {
                None => true,
                Some(bel) => self.device().bel_global_buf(bel),
            },
        }
    }

    /// Recomputes a net's bounding box under the shadow overlay.
    pub(crate) fn get_net_bounds(&self, net: &Net, moved: &MovedCells) -> BoundingBox {
        let dev = self.device();
        let driver = net.driver.as_ref().expect("bounds of undriven net");
        let dbel = self
            .cell_bel(driver.cell, moved)
            .expect("bounds of unplaced driver");
        let dloc = dev.bel_location(dbel);
        let mut bb = BoundingBox::point(dloc.x, dloc.y);
        for user in &net.users {
            let Some(ubel) = self.cell_bel(user.cell, moved) else {
                continue;
            };
            let uloc = dev.bel_location(ubel);
            bb.extend(uloc.x, uloc.y);
        }
        bb
    }

    /// Timing cost of one arc under the shadow overlay.
    ///
    /// Budget-based mode penalizes delay beyond the arc's slack budget;
    /// criticality mode scales predicted delay by criticality raised to
    /// `crit_exp`. Arcs touching shadow-moved cells fall back to the
    /// topology-independent estimate, because `predict_delay` only knows
    /// committed placement.
    pub(crate) fn get_timing_cost(&self, net: &Net, user: usize, moved: &MovedCells) -> f64 {
        let Some(driver) = &net.driver else {
            return 0.0;
        };
        if self.cfg.budget_based {
            let delay = self
                .timing
                .predict_delay(self.device(), self.netlist, net.id, user)
                .max_ns;
            (delay - net.users[user].budget.max_ns).exp().min(10.0)
        } else {
            let Some(crit) = self.net_crit.get(&net.id) else {
                return 0.0;
            };
            if crit.criticality.is_empty() {
                return 0.0;
            }
            let usr_cell = net.users[user].cell;
            let delay = if moved.contains_key(&driver.cell) || moved.contains_key(&usr_cell) {
                let (Some(src), Some(dst)) =
                    (self.cell_bel(driver.cell, moved), self.cell_bel(usr_cell, moved))
                else {
                    return 0.0;
                };
                self.device().estimate_bel_delay(src, dst).max_ns
            } else {
                self.timing
                    .predict_delay(self.device(), self.netlist, net.id, user)
                    .max_ns
            };
            delay * f64::from(crit.criticality[user]).powf(self.cfg.crit_exp)
        }
    }

    /// Records the dirty nets and arcs of moving `cell` away from
    /// `old_bel` (to its overlay/current position).
    pub(crate) fn add_move_cell(
        &self,
        mc: &mut MoveChangeData,
        cell: CellId,
        old_bel: BelId,
        moved: &MovedCells,
    ) {
        let dev = self.device();
        let Some(curr_bel) = self.cell_bel(cell, moved) else {
            return;
        };
        let curr_loc = dev.bel_location(curr_bel);
        let old_loc = dev.bel_location(old_bel);
        for slot in &self.cell_ports[cell.index()] {
            let udata = match *slot {
                PortSlot::Driver(n) => n,
                PortSlot::User(n, _) => n,
            };
            let net = self.netlist.net(self.net_by_udata[udata as usize]);
            if self.ignore_net(net) {
                continue;
            }
            let curr_bounds = &self.net_bounds[udata as usize];
            // update needed when the old location sat on the boundary or
            // the new location leaves the box
            if curr_bounds.touches_edge(old_loc.x, old_loc.y)
                || !curr_bounds.contains(curr_loc.x, curr_loc.y)
            {
                if !mc.already_bounds_changed[udata as usize] {
                    mc.bounds_changed_nets.push(udata);
                    mc.already_bounds_changed[udata as usize] = true;
                }
            }
            if self.cfg.timing_driven && net.users.len() < self.cfg.timing_fanout_thresh {
                match *slot {
                    PortSlot::Driver(_) => {
                        for i in 0..net.users.len() as u32 {
                            if !mc.already_changed_arcs[udata as usize][i as usize] {
                                mc.changed_arcs.push((udata, i));
                                mc.already_changed_arcs[udata as usize][i as usize] = true;
                            }
                        }
                    }
                    PortSlot::User(_, i) => {
                        if !mc.already_changed_arcs[udata as usize][i as usize] {
                            mc.changed_arcs.push((udata, i));
                            mc.already_changed_arcs[udata as usize][i as usize] = true;
                        }
                    }
                }
            }
        }
    }

    /// Evaluates new bounds and arc costs for the dirty sets, producing
    /// the move's deltas.
    pub(crate) fn compute_cost_changes(&self, mc: &mut MoveChangeData, moved: &MovedCells) {
        for idx in 0..mc.bounds_changed_nets.len() {
            let udata = mc.bounds_changed_nets[idx];
            let old_hpwl = self.net_bounds[udata as usize].hpwl();
            let bounds =
                self.get_net_bounds(self.netlist.net(self.net_by_udata[udata as usize]), moved);
            mc.new_net_bounds.push((udata, bounds));
            mc.wirelen_delta += bounds.hpwl() - old_hpwl;
            mc.already_bounds_changed[udata as usize] = false;
        }
        if self.cfg.timing_driven {
            for idx in 0..mc.changed_arcs.len() {
                let (udata, user) = mc.changed_arcs[idx];
                let old_cost = self.net_arc_tcost[udata as usize][user as usize];
                let new_cost = self.get_timing_cost(
                    self.netlist.net(self.net_by_udata[udata as usize]),
                    user as usize,
                    moved,
                );
                mc.new_arc_costs.push(((udata, user), new_cost));
                mc.timing_delta += new_cost - old_cost;
                mc.already_changed_arcs[udata as usize][user as usize] = false;
            }
        }
    }

    /// Installs the computed values and folds the deltas into the running
    /// totals. Rejected moves simply skip this.
    pub(crate) fn commit_cost_changes(&mut self, mc: &MoveChangeData) {
        for &(udata, bb) in &mc.new_net_bounds {
            self.net_bounds[udata as usize] = bb;
        }
        for &((udata, user), cost) in &mc.new_arc_costs {
            self.net_arc_tcost[udata as usize][user as usize] = cost;
        }
        self.curr_wirelen_cost += mc.wirelen_delta;
        self.curr_timing_cost += mc.timing_delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sizes_dedup_arrays() {
        let mc = MoveChangeData::new(&[2, 0, 3]);
        assert_eq!(mc.already_bounds_changed.len(), 3);
        assert_eq!(mc.already_changed_arcs[0].len(), 2);
        assert_eq!(mc.already_changed_arcs[1].len(), 0);
        assert_eq!(mc.already_changed_arcs[2].len(), 3);
    }

    #[test]
    fn reset_clears_only_touched_flags() {
        let mut mc = MoveChangeData::new(&[1, 1]);
        mc.bounds_changed_nets.push(1);
        mc.already_bounds_changed[1] = true;
        mc.changed_arcs.push((0, 0));
        mc.already_changed_arcs[0][0] = true;
        mc.wirelen_delta = 5;
        mc.timing_delta = 1.5;

        mc.reset();
        assert!(mc.bounds_changed_nets.is_empty());
        assert!(mc.changed_arcs.is_empty());
        assert!(!mc.already_bounds_changed[1]);
        assert!(!mc.already_changed_arcs[0][0]);
        assert_eq!(mc.wirelen_delta, 0);
        assert_eq!(mc.timing_delta, 0.0);
    }
}
