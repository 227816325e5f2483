//! Parallel simulated-annealing placement refiner.
//!
//! Starting from a legal or semi-legal placement (or the built-in random
//! initial placer), the refiner repeatedly proposes cell moves and chain
//! swaps, accepting each by the Metropolis criterion on a combined
//! wirelength + timing cost. Move *evaluation* is fanned out to a fixed
//! worker pool against thread-local shadow state; the coordinator applies
//! accepted proposals serially through the real swap path, so the netlist
//! and device tables are only ever mutated single-threaded.

mod initial;
mod move_change;
mod proposals;

pub(crate) use move_change::{MoveChangeData, MovedCells, PortSlot};

use crate::config::PlacerConfig;
use crate::error::PlaceError;
use std::collections::{HashMap, HashSet};
use strand_device::ids::{BelId, BelTypeId, CellId, NetId, RegionId};
use strand_device::rng::DetRng;
use strand_device::types::{BoundingBox, Loc, Strength};
use strand_device::DeviceModel;
use strand_diag::{Diagnostic, DiagnosticSink, Stage};
use strand_netlist::Netlist;
use strand_timing::{CriticalityMap, TimingOracle};

/// Once the search diameter cools below this, relative constraints are
/// legalised and only legal moves are required from then on.
const LEGALISE_DIA: i32 = 4;

const EPS: f64 = 1e-20;

/// Host-provided legalisation for relative placement constraints.
///
/// Returns `true` if any cell was moved, in which case the placer
/// re-derives its movable/chain classification.
pub trait Legalizer {
    /// Moves chain members onto BELs satisfying their relative offsets.
    fn legalise_relative_constraints(
        &mut self,
        dev: &mut dyn DeviceModel,
        netlist: &mut Netlist,
    ) -> bool;
}

/// The simulated-annealing placement refiner.
pub struct Placer<'a> {
    dev: &'a mut dyn DeviceModel,
    netlist: &'a mut Netlist,
    timing: &'a dyn TimingOracle,
    sink: &'a DiagnosticSink,
    cfg: PlacerConfig,

    // fabric indexes
    bel_types: HashMap<BelTypeId, (usize, usize)>,
    fast_bels: Vec<Vec<Vec<Vec<BelId>>>>,
    max_x: i32,
    max_y: i32,
    locked_bels: HashSet<BelId>,
    region_bounds: HashMap<RegionId, BoundingBox>,

    // netlist indexes
    net_by_udata: Vec<NetId>,
    arc_sizes: Vec<usize>,
    cell_ports: Vec<Vec<PortSlot>>,
    net_crit: CriticalityMap,

    // cost state
    net_bounds: Vec<BoundingBox>,
    net_arc_tcost: Vec<Vec<f64>>,
    curr_wirelen_cost: i64,
    last_wirelen_cost: i64,
    curr_timing_cost: f64,
    last_timing_cost: f64,

    // annealing state
    temp: f64,
    diameter: i32,
    avg_wirelen: f64,
    min_wirelen: i64,
    n_move: u64,
    n_accept: u64,
    improved: bool,
    require_legal: bool,
    autoplaced: Vec<CellId>,
    chain_basis: Vec<CellId>,
}

impl<'a> Placer<'a> {
    /// Builds the placer's fabric and netlist indexes. Stamps dense udata
    /// onto every net.
    pub fn new(
        dev: &'a mut dyn DeviceModel,
        netlist: &'a mut Netlist,
        timing: &'a dyn TimingOracle,
        sink: &'a DiagnosticSink,
        cfg: PlacerConfig,
    ) -> Self {
        let mut bel_types: HashMap<BelTypeId, (usize, usize)> = HashMap::new();
        for &bel in dev.bels() {
            let ty = dev.bel_type(bel);
            let next = bel_types.len();
            bel_types.entry(ty).or_insert((next, 0)).1 += 1;
        }
        let mut fast_bels: Vec<Vec<Vec<Vec<BelId>>>> = vec![Vec::new(); bel_types.len()];
        let mut max_x = 1;
        let mut max_y = 1;
        for &bel in dev.bels() {
            let mut loc = dev.bel_location(bel);
            let (type_idx, type_cnt) = bel_types[&dev.bel_type(bel)];
            if type_cnt < cfg.min_bels_for_grid_pick {
                loc.x = 0;
                loc.y = 0;
            }
            max_x = max_x.max(loc.x);
            max_y = max_y.max(loc.y);
            let grid = &mut fast_bels[type_idx];
            if grid.len() <= loc.x as usize {
                grid.resize(loc.x as usize + 1, Vec::new());
            }
            let col = &mut grid[loc.x as usize];
            if col.len() <= loc.y as usize {
                col.resize(loc.y as usize + 1, Vec::new());
            }
            col[loc.y as usize].push(bel);
        }
        let diameter = max_x.max(max_y) + 1;

        let n = netlist.net_count();
        let mut net_by_udata = Vec::with_capacity(n);
        for i in 0..n {
            let id = NetId::from_raw(i as u32);
            netlist.net_mut(id).udata = i as u32;
            net_by_udata.push(id);
        }
        let arc_sizes: Vec<usize> = netlist.nets.iter().map(|net| net.users.len()).collect();
        let net_arc_tcost: Vec<Vec<f64>> = arc_sizes.iter().map(|&s| vec![0.0; s]).collect();

        let mut cell_ports: Vec<Vec<PortSlot>> = vec![Vec::new(); netlist.cell_count()];
        for (u, net) in netlist.nets.iter().enumerate() {
            if let Some(d) = &net.driver {
                cell_ports[d.cell.index()].push(PortSlot::Driver(u as u32));
            }
            for (i, usr) in net.users.iter().enumerate() {
                cell_ports[usr.cell.index()].push(PortSlot::User(u as u32, i as u32));
            }
        }

        let mut region_bounds = HashMap::new();
        for region in &netlist.regions {
            let bb = if region.constr_bels {
                let mut bb = BoundingBox::EMPTY;
                for &bel in &region.bels {
                    let loc = dev.bel_location(bel);
                    bb.extend(loc.x, loc.y);
                }
                bb
            } else {
                BoundingBox::new(0, 0, max_x, max_y)
            };
            region_bounds.insert(region.id, bb);
        }

        let start_temp = cfg.start_temp;
        Self {
            dev,
            netlist,
            timing,
            sink,
            cfg,
            bel_types,
            fast_bels,
            max_x,
            max_y,
            locked_bels: HashSet::new(),
            region_bounds,
            net_by_udata,
            arc_sizes,
            cell_ports,
            net_crit: CriticalityMap::new(),
            net_bounds: vec![BoundingBox::default(); n],
            net_arc_tcost,
            curr_wirelen_cost: 0,
            last_wirelen_cost: 0,
            curr_timing_cost: 0.0,
            last_timing_cost: 0.0,
            temp: start_temp,
            diameter,
            avg_wirelen: 0.0,
            min_wirelen: 0,
            n_move: 0,
            n_accept: 0,
            improved: false,
            require_legal: true,
            autoplaced: Vec::new(),
            chain_basis: Vec::new(),
        }
    }

    pub(crate) fn device(&self) -> &dyn DeviceModel {
        &*self.dev
    }

    fn set_cell_bel(&mut self, cell: CellId, bel: BelId, strength: Strength) {
        let c = self.netlist.cell_mut(cell);
        c.bel = Some(bel);
        c.bel_strength = strength;
    }

    /// Manhattan distance between a chain cell's location and where its
    /// relative constraints want it, summed over parent and child edges.
    pub(crate) fn constraints_distance(&self, cell: CellId) -> i32 {
        let dev = self.device();
        let c = self.netlist.cell(cell);
        let mut dist = 0;
        if let (Some(parent), Some(off)) = (c.constr_parent, c.constr_offset) {
            if let (Some(cb), Some(pb)) = (c.bel, self.netlist.cell(parent).bel) {
                let cl = dev.bel_location(cb);
                let pl = dev.bel_location(pb);
                dist += (cl.x - (pl.x + off.x)).abs() + (cl.y - (pl.y + off.y)).abs();
            }
        }
        for &child in &c.constr_children {
            let ch = self.netlist.cell(child);
            if let (Some(off), Some(chb), Some(cb)) = (ch.constr_offset, ch.bel, c.bel) {
                let chl = dev.bel_location(chb);
                let cl = dev.bel_location(cb);
                dist += (chl.x - (cl.x + off.x)).abs() + (chl.y - (cl.y + off.y)).abs();
            }
        }
        dist
    }

    pub(crate) fn check_cell_bel_region(&self, cell: CellId, bel: BelId) -> bool {
        match self.netlist.cell(cell).region {
            None => true,
            Some(r) => {
                let region = self.netlist.region(r);
                !region.constr_bels || region.bels.contains(&bel)
            }
        }
    }

    /// Picks a random BEL of the cell's type within `diameter` of its
    /// current location, clamped to the cell's region. Sparse BEL types
    /// fall back to a whole-fabric pick. Returns `None` when the
    /// neighbourhood yields no usable candidate.
    pub(crate) fn random_bel_for_cell(
        &self,
        cell: CellId,
        rng: &mut DetRng,
        force_z: Option<i32>,
    ) -> Option<BelId> {
        const MAX_ATTEMPTS: usize = 10_000;
        let dev = self.device();
        let c = self.netlist.cell(cell);
        let cur_bel = c.bel?;
        let mut curr_loc = dev.bel_location(cur_bel);
        let &(type_idx, type_cnt) = self.bel_types.get(&c.ty)?;

        let mut dx = self.diameter;
        let mut dy = self.diameter;
        if let Some(r) = c.region {
            if self.netlist.region(r).constr_bels {
                let rb = &self.region_bounds[&r];
                dx = dx.min(rb.width() + 1);
                dy = dy.min(rb.height() + 1);
                curr_loc.x = curr_loc.x.clamp(rb.x0, rb.x1);
                curr_loc.y = curr_loc.y.clamp(rb.y0, rb.y1);
            }
        }

        for _ in 0..MAX_ATTEMPTS {
            let mut nx = rng.bounded((2 * dx + 1) as u32) as i32 + (curr_loc.x - dx).max(0);
            let mut ny = rng.bounded((2 * dy + 1) as u32) as i32 + (curr_loc.y - dy).max(0);
            if type_cnt < self.cfg.min_bels_for_grid_pick {
                nx = 0;
                ny = 0;
            }
            let grid = &self.fast_bels[type_idx];
            if nx as usize >= grid.len() {
                continue;
            }
            let col = &grid[nx as usize];
            if ny as usize >= col.len() {
                continue;
            }
            let fb = &col[ny as usize];
            if fb.is_empty() {
                continue;
            }
            let bel = fb[rng.bounded(fb.len() as u32) as usize];
            if let Some(z) = force_z {
                if dev.bel_location(bel).z != z {
                    continue;
                }
            }
            if !self.check_cell_bel_region(cell, bel) {
                continue;
            }
            if self.locked_bels.contains(&bel) {
                continue;
            }
            return Some(bel);
        }
        None
    }

    fn metropolis_draw(&self) -> f64 {
        f64::from(self.device().rng_n(0x4000_0000)) / f64::from(0x3fff_ffffu32)
    }

    /// Attempts a single-cell swap for real: rebinds, re-checks legality,
    /// evaluates the exact cost delta, and applies the Metropolis rule.
    pub(crate) fn try_swap_position(
        &mut self,
        mc: &mut MoveChangeData,
        cell: CellId,
        new_bel: BelId,
    ) -> bool {
        mc.reset();
        {
            let c = self.netlist.cell(cell);
            if c.is_constrained() || c.bel.is_none() {
                return false;
            }
        }
        let old_bel = self.netlist.cell(cell).bel.unwrap();
        if new_bel == old_bel {
            return false;
        }
        let other_cell = self.dev.bound_bel_cell(new_bel);
        if let Some(oc) = other_cell {
            let o = self.netlist.cell(oc);
            if o.is_constrained() || o.bel_strength > Strength::Weak {
                return false;
            }
        }

        let mut old_dist = self.constraints_distance(cell);
        if let Some(oc) = other_cell {
            old_dist += self.constraints_distance(oc);
        }

        self.dev.unbind_bel(old_bel);
        if other_cell.is_some() {
            self.dev.unbind_bel(new_bel);
        }
        self.dev.bind_bel(new_bel, cell, Strength::Weak);
        self.set_cell_bel(cell, new_bel, Strength::Weak);
        if let Some(oc) = other_cell {
            self.dev.bind_bel(old_bel, oc, Strength::Weak);
            self.set_cell_bel(oc, old_bel, Strength::Weak);
        }

        let moved = MovedCells::new();
        self.add_move_cell(mc, cell, old_bel, &moved);
        if let Some(oc) = other_cell {
            self.add_move_cell(mc, oc, new_bel, &moved);
        }

        let valid = self.dev.is_bel_location_valid(new_bel)
            && other_cell.map_or(true, |_| self.dev.is_bel_location_valid(old_bel));
        if valid {
            self.compute_cost_changes(mc, &moved);
            let mut new_dist = self.constraints_distance(cell);
            if let Some(oc) = other_cell {
                new_dist += self.constraints_distance(oc);
            }
            let mut delta = self.cfg.lambda * (mc.timing_delta / self.last_timing_cost.max(EPS))
                + (1.0 - self.cfg.lambda)
                    * (mc.wirelen_delta as f64 / (self.last_wirelen_cost as f64).max(EPS));
            delta += (self.cfg.constraint_weight / self.temp) * f64::from(new_dist - old_dist)
                / (self.last_wirelen_cost as f64).max(EPS);
            if delta < 0.0
                || (self.temp > 1e-8 && self.metropolis_draw() <= (-delta / self.temp).exp())
            {
                self.commit_cost_changes(mc);
                return true;
            }
        }

        // revert
        self.dev.unbind_bel(new_bel);
        if other_cell.is_some() {
            self.dev.unbind_bel(old_bel);
        }
        self.dev.bind_bel(old_bel, cell, Strength::Weak);
        self.set_cell_bel(cell, old_bel, Strength::Weak);
        if let Some(oc) = other_cell {
            self.dev.bind_bel(new_bel, oc, Strength::Weak);
            self.set_cell_bel(oc, new_bel, Strength::Weak);
        }
        false
    }

    /// Swaps a cell onto a BEL, displacing any incumbent onto the vacated
    /// BEL. Returns the original BEL so a rejected chain move can be
    /// replayed in reverse.
    fn swap_cell_bels(&mut self, cell: CellId, new_bel: BelId) -> BelId {
        let old_bel = self.netlist.cell(cell).bel.expect("swap of unplaced cell");
        let bound = self.dev.bound_bel_cell(new_bel);
        if bound.is_some() {
            self.dev.unbind_bel(new_bel);
        }
        self.dev.unbind_bel(old_bel);
        let strength = if self.netlist.cell(cell).is_constrained() {
            Strength::Strong
        } else {
            Strength::Weak
        };
        self.dev.bind_bel(new_bel, cell, strength);
        self.set_cell_bel(cell, new_bel, strength);
        if let Some(b) = bound {
            let s = if self.netlist.cell(b).is_constrained() {
                Strength::Strong
            } else {
                Strength::Weak
            };
            self.dev.bind_bel(old_bel, b, s);
            self.set_cell_bel(b, old_bel, s);
        }
        old_bel
    }

    /// Collects the relative layout of a chain rooted at `cell`.
    fn discover_chain(&self, base_loc: Loc, cell: CellId, out: &mut Vec<(CellId, Loc)>) {
        let loc = self
            .device()
            .bel_location(self.netlist.cell(cell).bel.expect("unplaced chain cell"));
        out.push((
            cell,
            Loc::new(loc.x - base_loc.x, loc.y - base_loc.y, loc.z),
        ));
        let children = self.netlist.cell(cell).constr_children.clone();
        for child in children {
            self.discover_chain(base_loc, child, out);
        }
    }

    /// Attempts to move a whole chain to a new base BEL as one atomic
    /// move: all members swap, legality and cost are evaluated, and on
    /// rejection every swap is replayed in reverse order.
    pub(crate) fn try_swap_chain(
        &mut self,
        mc: &mut MoveChangeData,
        cell: CellId,
        new_base: BelId,
    ) -> bool {
        let dev_base_loc = {
            let Some(bel) = self.netlist.cell(cell).bel else {
                return false;
            };
            self.device().bel_location(bel)
        };
        let mut cell_rel = Vec::new();
        self.discover_chain(dev_base_loc, cell, &mut cell_rel);
        let new_base_loc = self.device().bel_location(new_base);
        if new_base_loc.z != dev_base_loc.z {
            return false;
        }
        let members: HashSet<CellId> = cell_rel.iter().map(|(c, _)| *c).collect();

        let mut dest_bels = Vec::with_capacity(cell_rel.len());
        for (c, rel) in &cell_rel {
            let target_loc = Loc::new(new_base_loc.x + rel.x, new_base_loc.y + rel.y, rel.z);
            let Some(target_bel) = self.device().bel_by_location(target_loc) else {
                return false;
            };
            if self.device().bel_type(target_bel) != self.netlist.cell(*c).ty {
                return false;
            }
            if let Some(bound) = self.device().bound_bel_cell(target_bel) {
                if !members.contains(&bound) {
                    let b = self.netlist.cell(bound);
                    // chains don't swap with other chains
                    if b.bel_strength >= Strength::Strong || b.is_constrained() {
                        return false;
                    }
                }
            }
            dest_bels.push((*c, target_bel));
        }

        mc.reset();
        let mut moves_made: Vec<(CellId, BelId)> = Vec::with_capacity(dest_bels.len());
        for &(c, target) in &dest_bels {
            let old_bel = self.swap_cell_bels(c, target);
            moves_made.push((c, old_bel));
        }

        let moved = MovedCells::new();
        let mut ok = true;
        for &(c, old_bel) in &moves_made {
            let new_bel = self.netlist.cell(c).bel.unwrap();
            if !self.dev.is_bel_location_valid(new_bel)
                || !self.check_cell_bel_region(c, new_bel)
                || !self.dev.is_bel_location_valid(old_bel)
            {
                ok = false;
                break;
            }
            if let Some(bound) = self.dev.bound_bel_cell(old_bel) {
                if !self.check_cell_bel_region(bound, old_bel) {
                    ok = false;
                    break;
                }
            }
            self.add_move_cell(mc, c, old_bel, &moved);
            if let Some(bound) = self.dev.bound_bel_cell(old_bel) {
                self.add_move_cell(mc, bound, new_bel, &moved);
            }
        }

        if ok {
            self.compute_cost_changes(mc, &moved);
            let delta = self.cfg.lambda * (mc.timing_delta / self.last_timing_cost.max(EPS))
                + (1.0 - self.cfg.lambda)
                    * (mc.wirelen_delta as f64 / (self.last_wirelen_cost as f64).max(EPS));
            self.n_move += 1;
            if delta < 0.0
                || (self.temp > 1e-9 && self.metropolis_draw() <= (-delta / self.temp).exp())
            {
                self.n_accept += 1;
                self.commit_cost_changes(mc);
                return true;
            }
        }

        for &(c, old_bel) in moves_made.iter().rev() {
            self.swap_cell_bels(c, old_bel);
        }
        false
    }

    /// Recomputes every net's bounds and arc timing costs from scratch.
    pub(crate) fn setup_costs(&mut self) {
        let mut new_bounds: Vec<(usize, BoundingBox)> = Vec::new();
        let mut new_tcosts: Vec<(usize, Vec<f64>)> = Vec::new();
        let moved = MovedCells::new();
        for u in 0..self.net_by_udata.len() {
            let net = self.netlist.net(self.net_by_udata[u]);
            if self.ignore_net(net) {
                continue;
            }
            new_bounds.push((u, self.get_net_bounds(net, &moved)));
            if self.cfg.timing_driven && net.users.len() < self.cfg.timing_fanout_thresh {
                let costs = (0..net.users.len())
                    .map(|i| self.get_timing_cost(net, i, &moved))
                    .collect();
                new_tcosts.push((u, costs));
            }
        }
        for (u, bb) in new_bounds {
            self.net_bounds[u] = bb;
        }
        for (u, costs) in new_tcosts {
            self.net_arc_tcost[u] = costs;
        }
    }

    /// Total HPWL over all nets, from the bounds table.
    pub(crate) fn total_wirelen_cost(&self) -> i64 {
        self.net_bounds.iter().map(|bb| bb.hpwl()).sum()
    }

    /// Total timing cost over all arcs.
    pub(crate) fn total_timing_cost(&self) -> f64 {
        self.net_arc_tcost.iter().flatten().sum()
    }

    /// Applies the annealing schedule for one iteration given the
    /// acceptance ratio.
    pub(crate) fn update_schedule(&mut self, r_accept: f64) {
        let m = self.max_x.max(self.max_y) + 1;
        if (self.curr_wirelen_cost as f64) < 0.95 * self.avg_wirelen {
            self.avg_wirelen = 0.8 * self.avg_wirelen + 0.2 * self.curr_wirelen_cost as f64;
        } else {
            let diam_next = f64::from(self.diameter) * (1.0 - 0.44 + r_accept);
            self.diameter = ((diam_next + 0.5) as i32).clamp(1, m);
            if r_accept > 0.96 {
                self.temp *= 0.5;
            } else if r_accept > 0.8 {
                self.temp *= 0.9;
            } else if r_accept > 0.15 && self.diameter > 1 {
                self.temp *= 0.95;
            } else {
                self.temp *= 0.8;
            }
        }
    }

    fn classify_for_refine(&mut self) {
        self.autoplaced.clear();
        self.chain_basis.clear();
        for c in &self.netlist.cells {
            if c.bel_strength > Strength::Strong {
                continue;
            }
            if c.constr_parent.is_some() {
                continue;
            }
            if !c.constr_children.is_empty() || c.constr_offset.is_some() {
                self.chain_basis.push(c.id);
            } else {
                self.autoplaced.push(c.id);
            }
        }
    }

    fn reclassify_after_legalise(&mut self) {
        self.autoplaced.clear();
        self.chain_basis.clear();
        for c in &self.netlist.cells {
            if c.bel_strength <= Strength::Strong
                && c.constr_parent.is_none()
                && !c.constr_children.is_empty()
            {
                self.chain_basis.push(c.id);
            } else if c.bel_strength < Strength::Strong {
                self.autoplaced.push(c.id);
            }
        }
        let mut rng = DetRng::from_seed(self.dev.rng64());
        rng.shuffle(&mut self.autoplaced);
    }

    /// Runs the annealer to convergence. With `refine` the existing
    /// placement is only polished: the temperature starts frozen and the
    /// search diameter small.
    pub fn place(
        &mut self,
        refine: bool,
        mut legalizer: Option<&mut dyn Legalizer>,
    ) -> Result<(), PlaceError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.cfg.threads)
            .build()
            .map_err(|e| PlaceError::ThreadPool(e.to_string()))?;
        let mut mc = MoveChangeData::new(&self.arc_sizes);

        if !refine {
            self.place_constraints()?;
            self.collect_autoplaced_initial();
            log::info!(
                "creating initial placement for remaining {} cells",
                self.autoplaced.len()
            );
            let auto = self.autoplaced.clone();
            for (idx, &cell) in auto.iter().enumerate() {
                self.place_initial(cell)?;
                if (idx + 1) % 500 == 0 {
                    log::info!("  initial placement placed {}/{} cells", idx + 1, auto.len());
                }
            }
            log::info!(
                "  initial placement placed {}/{} cells",
                auto.len(),
                auto.len()
            );
            if self.cfg.budget_based && self.cfg.slack_redist_iter > 0 {
                self.timing.assign_budgets(&*self.dev, self.netlist);
            }
            log::info!("running simulated annealing placer");
        } else {
            self.classify_for_refine();
            self.require_legal = false;
            self.diameter = 3;
        }

        if !self.cfg.budget_based {
            self.net_crit = self.timing.criticalities(&*self.dev, self.netlist);
        }
        self.setup_costs();
        self.curr_wirelen_cost = self.total_wirelen_cost();
        self.curr_timing_cost = self.total_timing_cost();
        self.last_wirelen_cost = self.curr_wirelen_cost;
        self.last_timing_cost = self.curr_timing_cost;
        self.avg_wirelen = self.curr_wirelen_cost as f64;
        self.min_wirelen = self.curr_wirelen_cost;
        let mut n_no_progress = 0u32;
        self.temp = if refine { 1e-7 } else { self.cfg.start_temp };

        let mut iter = 0u32;
        loop {
            iter += 1;
            self.n_move = 0;
            self.n_accept = 0;
            self.improved = false;

            if iter % 5 == 0 || iter == 1 {
                log::info!(
                    "  at iteration #{}: temp = {}, timing cost = {:.0}, wirelen = {}",
                    iter,
                    self.temp,
                    self.curr_timing_cost,
                    self.curr_wirelen_cost
                );
            }

            for _ in 0..15 {
                self.run_proposal_batches(&pool, &mut mc);
                let basis = self.chain_basis.clone();
                for cb in basis {
                    let Some(bel) = self.netlist.cell(cb).bel else {
                        continue;
                    };
                    let base_z = self.device().bel_location(bel).z;
                    let mut rng = DetRng::from_seed(self.dev.rng64());
                    if let Some(try_base) = self.random_bel_for_cell(cb, &mut rng, Some(base_z)) {
                        if try_base != bel {
                            self.try_swap_chain(&mut mc, cb, try_base);
                        }
                    }
                }
            }

            if self.curr_wirelen_cost < self.min_wirelen {
                self.min_wirelen = self.curr_wirelen_cost;
                self.improved = true;
            }
            if self.improved {
                n_no_progress = 0;
            } else {
                n_no_progress += 1;
            }

            if self.temp <= 1e-7 && n_no_progress >= if refine { 1 } else { 5 } {
                log::info!(
                    "  at iteration #{}: temp = {}, timing cost = {:.0}, wirelen = {}",
                    iter,
                    self.temp,
                    self.curr_timing_cost,
                    self.curr_wirelen_cost
                );
                break;
            }

            let r_accept = self.n_accept as f64 / (self.n_move.max(1) as f64);
            self.update_schedule(r_accept);

            if self.diameter < LEGALISE_DIA && self.require_legal {
                if let Some(lg) = legalizer.as_deref_mut() {
                    if lg.legalise_relative_constraints(&mut *self.dev, &mut *self.netlist) {
                        self.reclassify_after_legalise();
                        if self.cfg.slack_redist_iter > 0 && self.cfg.budget_based {
                            self.timing.assign_budgets(&*self.dev, self.netlist);
                        }
                    }
                }
                self.require_legal = false;
            } else if self.cfg.budget_based
                && self.cfg.slack_redist_iter > 0
                && iter % self.cfg.slack_redist_iter == 0
            {
                self.timing.assign_budgets(&*self.dev, self.netlist);
            }

            if !self.cfg.budget_based {
                self.net_crit = self.timing.criticalities(&*self.dev, self.netlist);
            }
            self.setup_costs();
            // full recompute so incremental rounding never accumulates
            self.curr_wirelen_cost = self.total_wirelen_cost();
            self.curr_timing_cost = self.total_timing_cost();
            self.last_wirelen_cost = self.curr_wirelen_cost;
            self.last_timing_cost = self.curr_timing_cost;
        }

        // final post-placement validity sweep
        let bels = self.dev.bels().to_vec();
        for bel in bels {
            if !self.dev.is_bel_location_valid(bel) {
                if self.cfg.force {
                    self.sink.emit(Diagnostic::warning(
                        Stage::Placer,
                        format!("post-placement validity check failed for bel {bel}"),
                    ));
                } else {
                    self.sink.emit(Diagnostic::error(
                        Stage::Placer,
                        format!("post-placement validity check failed for bel {bel}"),
                    ));
                    return Err(PlaceError::InvalidBelLocation { bel: bel.as_raw() });
                }
            }
        }
        for i in 0..self.netlist.cell_count() {
            let cell = CellId::from_raw(i as u32);
            if self.constraints_distance(cell) != 0 {
                return Err(PlaceError::ConstraintUnsatisfied {
                    cell: self.netlist.cell(cell).name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Runs the refiner, converting fatal placement errors into a boolean
/// failure return while surfacing the diagnostics.
pub fn refine_placement(
    dev: &mut dyn DeviceModel,
    netlist: &mut Netlist,
    timing: &dyn TimingOracle,
    sink: &DiagnosticSink,
    cfg: PlacerConfig,
    refine: bool,
    legalizer: Option<&mut dyn Legalizer>,
) -> bool {
    let mut placer = Placer::new(dev, netlist, timing, sink, cfg);
    match placer.place(refine, legalizer) {
        Ok(()) => true,
        Err(e) => {
            sink.emit(Diagnostic::error(Stage::Placer, e.to_string()));
            false
        }
    }
}
