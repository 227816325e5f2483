//! Negotiated-congestion routing engine.
//!
//! The router binds every net of the netlist onto the device's routing
//! graph. Congestion is allowed at first: each iteration routes all queued
//! nets (four quadrant workers plus a single-threaded cleanup), then taxes
//! every overused wire with history cost and doubles the present-congestion
//! weight, so contended nets negotiate their way onto disjoint resources.
//! Once no wire is overused the discovered routes are committed to the
//! device binding tables.

mod arc;
mod congestion;
mod state;

pub(crate) use arc::ThreadContext;
pub use congestion::CongestionStats;

use crate::config::RouterConfig;
use crate::error::RouteError;
use crate::router::congestion::{BoundRef, WireStates};
use crate::router::state::PerNetData;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use strand_device::ids::{NetId, WireId};
use strand_device::rng::DetRng;
use strand_device::types::{BoundingBox, PinDir, Strength};
use strand_device::DeviceModel;
use strand_diag::{Diagnostic, DiagnosticSink, Stage};
use strand_netlist::{NetWire, Netlist};
use strand_timing::TimingOracle;

/// Summary of a completed routing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStats {
    /// Negotiation iterations executed.
    pub iterations: u32,
    /// Sum of per-wire net counts at the last iteration.
    pub total_wire_use: usize,
    /// Overused wires at the last iteration (zero on success).
    pub overused_wires: usize,
    /// Total overuse at the last iteration (zero on success).
    pub total_overuse: usize,
    /// Cumulative arcs that failed the device-table commit and were
    /// rerouted.
    pub arch_fail: u32,
}

/// The negotiated-congestion router.
///
/// Borrows the device and netlist for the duration of one routing run;
/// all intermediate state (congestion map, per-net trees) lives and dies
/// with this struct.
pub struct Router<'a> {
    dev: &'a mut dyn DeviceModel,
    netlist: &'a mut Netlist,
    timing: Option<&'a dyn TimingOracle>,
    sink: &'a DiagnosticSink,
    cfg: RouterConfig,
    pub(crate) nets: Vec<RwLock<PerNetData>>,
    pub(crate) nets_by_udata: Vec<NetId>,
    pub(crate) wires: WireStates,
    route_queue: Vec<u32>,
    failed_nets: BTreeSet<u32>,
    pub(crate) curr_cong_weight: f32,
    hist_cong_weight: f32,
    mid_x: i32,
    mid_y: i32,
    stats: CongestionStats,
    arch_fail: u32,
}

impl<'a> Router<'a> {
    /// Creates a router over the given device and netlist. `timing`, when
    /// present, is refreshed between iterations and orders each net's arcs
    /// most-critical-first.
    pub fn new(
        dev: &'a mut dyn DeviceModel,
        netlist: &'a mut Netlist,
        timing: Option<&'a dyn TimingOracle>,
        sink: &'a DiagnosticSink,
        cfg: RouterConfig,
    ) -> Self {
        Self {
            dev,
            netlist,
            timing,
            sink,
            cfg,
            nets: Vec::new(),
            nets_by_udata: Vec::new(),
            wires: WireStates::new(&[]),
            route_queue: Vec::new(),
            failed_nets: BTreeSet::new(),
            curr_cong_weight: 0.5,
            hist_cong_weight: 1.0,
            mid_x: 0,
            mid_y: 0,
            stats: CongestionStats::default(),
            arch_fail: 0,
        }
    }

    pub(crate) fn device(&self) -> &dyn DeviceModel {
        &*self.dev
    }

    pub(crate) fn net_name(&self, udata: u32) -> &str {
        &self.netlist.net(self.nets_by_udata[udata as usize]).name
    }

    /// Populates per-net and per-arc structures: bounding boxes, centroids,
    /// HPWL, and the dense udata stamp. Fails if any driven port has no
    /// fabric wire.
    pub(crate) fn setup_nets(&mut self) -> Result<(), RouteError> {
        let n = self.netlist.net_count();
        self.nets_by_udata = (0..n).map(|i| NetId::from_raw(i as u32)).collect();
        for (i, &net_id) in self.nets_by_udata.iter().enumerate() {
            self.netlist.net_mut(net_id).udata = i as u32;
        }

        let mut nets = Vec::with_capacity(n);
        for &net_id in &self.nets_by_udata {
            let dev = &*self.dev;
            let net = self.netlist.net(net_id);
            let mut nd = PerNetData::new(net.users.len());
            let mut cx = 0i32;
            let mut cy = 0i32;

            if let Some(d) = &net.driver {
                if let Some(bel) = self.netlist.cell(d.cell).bel {
                    let loc = dev.bel_location(bel);
                    cx += loc.x;
                    cy += loc.y;
                }
            }

            for (j, usr) in net.users.iter().enumerate() {
                let dst = usr.sink_wire.ok_or_else(|| RouteError::NoSinkWire {
                    net: net.name.clone(),
                    port: usr.port.clone(),
                })?;
                let src = match &net.driver {
                    Some(d) => d.source_wire.ok_or_else(|| RouteError::NoSourceWire {
                        net: net.name.clone(),
                        port: d.port.clone(),
                    })?,
                    None => dst,
                };
                nd.arcs[j].bb = dev.route_bounding_box(src, dst);
                nd.bb.union(&nd.arcs[j].bb);
                if let Some(bel) = self.netlist.cell(usr.cell).bel {
                    let loc = dev.bel_location(bel);
                    cx += loc.x;
                    cy += loc.y;
                }
            }

            if net.users.is_empty() {
                nd.bb = BoundingBox::point(0, 0);
            }
            nd.hpwl = ((nd.bb.y1 - nd.bb.y0).abs() + (nd.bb.x1 - nd.bb.x0).abs()).max(1);
            let denom = net.users.len() as i32 + 1;
            nd.cx = cx / denom;
            nd.cy = cy / denom;
            log::debug!(
                "{}: bb=({}, {})->({}, {}) c=({}, {}) hpwl={}",
                net.name,
                nd.bb.x0,
                nd.bb.y0,
                nd.bb.x1,
                nd.bb.y1,
                nd.cx,
                nd.cy,
                nd.hpwl
            );
            nets.push(RwLock::new(nd));
        }
        self.nets = nets;
        Ok(())
    }

    /// Allocates per-wire state for every device wire and seeds it from
    /// pre-existing bindings, so worker threads never allocate.
    pub(crate) fn setup_wires(&mut self) {
        let wire_ids: Vec<WireId> = self.dev.wires().to_vec();
        self.wires = WireStates::new(&wire_ids);
        for &w in self.wires.wires() {
            let Some(net_id) = self.dev.bound_wire_net(w) else {
                continue;
            };
            let net = self.netlist.net(net_id);
            let udata = net.udata;
            let pip = net.wire_entry(w).and_then(|e| e.pip);
            let strength = self.dev.wire_bind_strength(w).unwrap_or(Strength::Weak);
            let mut wd = self.wires.write(w);
            wd.bound_nets.insert(udata, BoundRef { refcount: 1, pip });
            if strength > Strength::Strong {
                wd.unavailable = true;
            }
        }
    }

    /// A wire with no driving PIP and no non-input BEL pin can never carry
    /// a signal.
    pub(crate) fn is_wire_undriveable(&self, wire: WireId) -> bool {
        let dev = self.device();
        for bp in dev.wire_bel_pins(wire) {
            if bp.dir != PinDir::Input {
                return false;
            }
        }
        dev.pips_uphill(wire).is_empty()
    }

    /// Walks uphill from one sink, reserving every wire that is the unique
    /// driveable predecessor on the way towards the source.
    fn reserve_wires_for_arc(&self, udata: u32, user: usize) {
        let dev = self.device();
        let net_id = self.nets_by_udata[udata as usize];
        let Some(src) = self.netlist.source_wire(net_id) else {
            return;
        };
        let Some(sink) = self.netlist.sink_wire(net_id, user) else {
            return;
        };
        let mut cursor = sink;
        loop {
            self.wires.write(cursor).reserved_net = Some(udata);
            if cursor == src {
                break;
            }
            let mut next: Option<WireId> = None;
            let mut multiple = false;
            for &uh in dev.pips_uphill(cursor) {
                let w = dev.pip_src_wire(uh);
                if self.is_wire_undriveable(w) {
                    continue;
                }
                if next.is_some() {
                    multiple = true;
                    break;
                }
                next = Some(w);
            }
            if multiple {
                break;
            }
            match next {
                Some(w) => cursor = w,
                None => break,
            }
        }
    }

    /// Marks every wire that some arc has no choice but to use, so no
    /// other net ever wastes search effort on it.
    pub(crate) fn find_all_reserved_wires(&self) {
        for udata in 0..self.nets.len() as u32 {
            let net_id = self.nets_by_udata[udata as usize];
            let users = self.netlist.net(net_id).users.len();
            for i in 0..users {
                self.reserve_wires_for_arc(udata, i);
            }
        }
    }

    /// Chooses the quadrant split lines as medians of net centroids.
    pub(crate) fn partition_nets(&mut self) {
        let mut cxs: BTreeMap<i32, usize> = BTreeMap::new();
        let mut cys: BTreeMap<i32, usize> = BTreeMap::new();
        for nd in &self.nets {
            let g = nd.read().unwrap();
            *cxs.entry(g.cx).or_insert(0) += 1;
            *cys.entry(g.cy).or_insert(0) += 1;
        }
        let halfway = self.nets.len() / 2;
        let mut accum = 0;
        for (&x, &count) in &cxs {
            if accum < halfway && accum + count >= halfway {
                self.mid_x = x;
            }
            accum += count;
        }
        accum = 0;
        for (&y, &count) in &cys {
            if accum < halfway && accum + count >= halfway {
                self.mid_y = y;
            }
            accum += count;
        }
        log::info!("x splitpoint: {}", self.mid_x);
        log::info!("y splitpoint: {}", self.mid_y);

        let mut bins = [0usize; 5];
        for nd in &self.nets {
            let bb = nd.read().unwrap().bb;
            bins[self.quadrant_of(&bb, 0)] += 1;
        }
        for (i, count) in bins.iter().enumerate() {
            log::info!("bin {i} N={count}");
        }
    }

    /// The dispatch bin of a bounding box: one of the four quadrants, or 4
    /// when the box straddles a split line (with `margin` of clearance).
    fn quadrant_of(&self, bb: &BoundingBox, margin: i32) -> usize {
        let le_x = self.mid_x - margin;
        let rs_x = self.mid_x + margin;
        let le_y = self.mid_y - margin;
        let rs_y = self.mid_y + margin;
        if bb.x0 < le_x && bb.x1 < le_x && bb.y0 < le_y && bb.y1 < le_y {
            0
        } else if bb.x0 >= rs_x && bb.x1 >= rs_x && bb.y0 < le_y && bb.y1 < le_y {
            1
        } else if bb.x0 < le_x && bb.x1 < le_x && bb.y0 >= rs_y && bb.y1 >= rs_y {
            2
        } else if bb.x0 >= rs_x && bb.x1 >= rs_x && bb.y0 >= rs_y && bb.y1 >= rs_y {
            3
        } else {
            4
        }
    }

    /// Pulls fresh per-arc criticalities from the timing oracle.
    fn refresh_criticalities(&self) {
        let Some(tm) = self.timing else { return };
        let map = tm.criticalities(self.device(), self.netlist);
        for (i, nd) in self.nets.iter().enumerate() {
            let net_id = self.nets_by_udata[i];
            if let Some(nc) = map.get(&net_id) {
                let mut g = nd.write().unwrap();
                for (j, &c) in nc.criticality.iter().enumerate() {
                    if j < g.crit.len() {
                        g.crit[j] = c;
                    }
                }
            }
        }
    }

    /// Routes everything on the queue: single-threaded below the dispatch
    /// threshold, otherwise four quadrant workers with disjoint bins plus
    /// a single-threaded pass for straddlers and failures.
    fn do_route(&self) -> Result<(), RouteError> {
        if self.route_queue.len() < self.cfg.mt_threshold {
            let mut st = ThreadContext::new(DetRng::from_seed(self.device().rng64()));
            for &udata in &self.route_queue {
                self.route_net(&mut st, udata, false)?;
            }
            return Ok(());
        }

        let seed = self.device().rng64();
        let mut contexts: Vec<ThreadContext> = (0..5u64)
            .map(|i| ThreadContext::new(DetRng::from_seed(seed ^ i.wrapping_mul(0x9e37_79b9_7f4a_7c15))))
            .collect();
        for &udata in &self.route_queue {
            let bb = self.nets[udata as usize].read().unwrap().bb;
            let bin = self.quadrant_of(&bb, self.cfg.bb_margin);
            contexts[bin].route_nets.push(udata);
        }
        log::info!(
            "{}/{} nets not multi-threadable",
            contexts[4].route_nets.len(),
            self.route_queue.len()
        );

        let (workers, rest) = contexts.split_at_mut(4);
        // the worker pool is ad-hoc per routing pass, joined before return
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.cfg.threads)
            .build()
        {
            Ok(pool) => pool.scope(|s| {
                for tc in workers.iter_mut() {
                    s.spawn(move |_| self.router_thread(tc));
                }
            }),
            Err(e) => {
                self.sink.emit(Diagnostic::warning(
                    Stage::Router,
                    format!("falling back to the global thread pool: {e}"),
                ));
                rayon::scope(|s| {
                    for tc in workers.iter_mut() {
                        s.spawn(move |_| self.router_thread(tc));
                    }
                });
            }
        }

        // Straddling nets, then anything the workers gave up on, all
        // single-threaded and free of the bounding-box restriction.
        let st = &mut rest[0];
        let straddlers = std::mem::take(&mut st.route_nets);
        for &udata in &straddlers {
            self.route_net(st, udata, false)?;
        }
        for tc in workers.iter_mut() {
            let failed = std::mem::take(&mut tc.failed_nets);
            for &udata in &failed {
                self.route_net(st, udata, false)?;
            }
        }
        Ok(())
    }

    /// Taxes every overused wire with history cost and collects the nets
    /// sharing it for rerouting.
    pub(crate) fn update_congestion(&mut self) {
        self.stats = CongestionStats::default();
        self.failed_nets.clear();
        for &w in self.wires.wires() {
            let mut wd = self.wires.write(w);
            self.stats.total_wire_use += wd.bound_nets.len();
            let overuse = wd.bound_nets.len() as i64 - 1;
            if overuse > 0 {
                wd.hist_cong_cost += overuse as f32 * self.hist_cong_weight;
                self.stats.total_overuse += overuse as usize;
                self.stats.overused_wires += 1;
                for &u in wd.bound_nets.keys() {
                    self.failed_nets.insert(u);
                }
            }
        }
    }

    /// Commits one arc to the device binding tables, walking the recorded
    /// tree from sink to source. On any conflict the arc is ripped up and
    /// its net queued for rerouting.
    fn bind_and_check(&mut self, udata: u32, usr_idx: usize) -> Result<bool, RouteError> {
        let net_id = self.nets_by_udata[udata as usize];
        let Some(src) = self.netlist.source_wire(net_id) else {
            return Ok(true);
        };
        let Some(dst) = self.netlist.sink_wire(net_id, usr_idx) else {
            return Ok(true);
        };
        if self.dev.bound_wire_net(dst) == Some(net_id) {
            return Ok(true);
        }
        if self.nets[udata as usize].read().unwrap().arcs[usr_idx]
            .wires
            .is_empty()
        {
            return Ok(true);
        }

        let mut to_bind: Vec<strand_device::ids::PipId> = Vec::new();
        let mut success = true;
        let mut cursor = dst;
        while cursor != src {
            if !self.dev.check_wire_avail(cursor) {
                if self.dev.bound_wire_net(cursor) == Some(net_id) {
                    break; // hit the part of the net that is already bound
                }
                success = false;
                break;
            }
            let entry = {
                let nd = self.nets[udata as usize].read().unwrap();
                nd.arcs[usr_idx].wires.get(&cursor).copied()
            };
            let Some(Some(pip)) = entry else {
                return Err(RouteError::InconsistentTree {
                    net: self.net_name(udata).to_owned(),
                    user: usr_idx,
                });
            };
            if !self.dev.check_pip_avail(pip) {
                success = false;
                break;
            }
            to_bind.push(pip);
            cursor = self.dev.pip_src_wire(pip);
        }

        if success {
            if self.dev.bound_wire_net(src).is_none() {
                self.dev.bind_wire(src, net_id, Strength::Weak);
                self.netlist.net_mut(net_id).set_wire_entry(NetWire {
                    wire: src,
                    pip: None,
                    strength: Strength::Weak,
                });
            }
            for &pip in &to_bind {
                self.dev.bind_pip(pip, net_id, Strength::Weak);
                let dst_w = self.dev.pip_dst_wire(pip);
                self.netlist.net_mut(net_id).set_wire_entry(NetWire {
                    wire: dst_w,
                    pip: Some(pip),
                    strength: Strength::Weak,
                });
            }
        } else {
            self.ripup_arc(udata, usr_idx);
            self.failed_nets.insert(udata);
        }
        Ok(success)
    }

    /// Unbinds every net's weak wires from the device tables, then commits
    /// the discovered routes. Only invoked when no wire is overused.
    pub(crate) fn bind_and_check_all(&mut self) -> Result<bool, RouteError> {
        let mut success = true;
        for udata in 0..self.nets.len() as u32 {
            let net_id = self.nets_by_udata[udata as usize];
            if self.netlist.net(net_id).is_global {
                continue;
            }
            let weak: Vec<NetWire> = self
                .netlist
                .net(net_id)
                .wires
                .iter()
                .filter(|w| w.strength <= Strength::Strong)
                .copied()
                .collect();
            for e in &weak {
                match e.pip {
                    Some(p) if self.dev.bound_pip_net(p).is_some() => self.dev.unbind_pip(p),
                    _ => {
                        if self.dev.bound_wire_net(e.wire).is_some() {
                            self.dev.unbind_wire(e.wire);
                        }
                    }
                }
                self.netlist.net_mut(net_id).remove_wire_entry(e.wire);
            }
            let users = self.netlist.net(net_id).users.len();
            for i in 0..users {
                if !self.bind_and_check(udata, i)? {
                    self.arch_fail += 1;
                    success = false;
                }
            }
        }
        Ok(success)
    }

    /// Runs the full negotiation loop to completion.
    pub fn route(&mut self) -> Result<RouteStats, RouteError> {
        self.setup_nets()?;
        self.setup_wires();
        self.find_all_reserved_wires();
        self.partition_nets();
        self.curr_cong_weight = 0.5;
        self.hist_cong_weight = 1.0;
        self.route_queue = (0..self.nets.len() as u32).collect();

        let mut iter = 0u32;
        loop {
            iter += 1;
            if iter > self.cfg.max_iterations {
                return Err(RouteError::NotConverged {
                    iterations: iter - 1,
                    overused: self.stats.overused_wires,
                });
            }
            self.refresh_criticalities();
            let mut rng = DetRng::from_seed(self.device().rng64());
            rng.sorted_shuffle(&mut self.route_queue);
            self.do_route()?;
            self.route_queue.clear();
            self.update_congestion();
            if self.stats.overused_wires == 0 {
                self.bind_and_check_all()?;
            }
            self.route_queue.extend(self.failed_nets.iter().copied());
            log::info!(
                "iter={} wires={} overused={} overuse={} archfail={}",
                iter,
                self.stats.total_wire_use,
                self.stats.overused_wires,
                self.stats.total_overuse,
                if self.stats.overused_wires > 0 {
                    "NA".to_owned()
                } else {
                    self.arch_fail.to_string()
                }
            );
            self.curr_cong_weight *= 2.0;
            if self.failed_nets.is_empty() {
                break;
            }
        }
        Ok(RouteStats {
            iterations: iter,
            total_wire_use: self.stats.total_wire_use,
            overused_wires: self.stats.overused_wires,
            total_overuse: self.stats.total_overuse,
            arch_fail: self.arch_fail,
        })
    }

    /// Per-location wire usage (or overuse, with `congestion`) derived
    /// from driving-PIP locations. Rows are `y`, columns `x`.
    pub fn congestion_heatmap(&self, congestion: bool) -> Vec<Vec<u32>> {
        let dev = self.device();
        let mut hm: Vec<Vec<u32>> = Vec::new();
        for &w in self.wires.wires() {
            let wd = self.wires.read(w);
            if wd.bound_nets.is_empty() {
                continue;
            }
            let val = wd.bound_nets.len() as i64 - i64::from(congestion);
            if val <= 0 {
                continue;
            }
            let mut keys: Vec<u32> = wd.bound_nets.keys().copied().collect();
            keys.sort_unstable();
            let Some(drv) = keys.iter().find_map(|k| wd.bound_nets[k].pip) else {
                continue;
            };
            let l = dev.pip_location(drv);
            if l.x < 0 || l.y < 0 {
                continue;
            }
            let (x, y) = (l.x as usize, l.y as usize);
            if hm.len() <= y {
                hm.resize(y + 1, Vec::new());
            }
            if hm[y].len() <= x {
                hm[y].resize(x + 1, 0);
            }
            hm[y][x] += val as u32;
        }
        hm
    }
}

/// Routes the whole netlist on the device with the given configuration.
pub fn route_design(
    dev: &mut dyn DeviceModel,
    netlist: &mut Netlist,
    timing: Option<&dyn TimingOracle>,
    sink: &DiagnosticSink,
    cfg: RouterConfig,
) -> Result<RouteStats, RouteError> {
    Router::new(dev, netlist, timing, sink, cfg).route()
}
