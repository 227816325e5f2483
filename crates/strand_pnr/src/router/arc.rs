//! Per-arc routing: backwards BFS prelude and forward A* search.
//!
//! An arc is one (net, user-pin) pair. Routing first tries a strictly
//! iteration-limited backwards BFS from the sink, which merges trivially
//! routable arcs into the net's existing tree at minimal cost. Arcs the
//! prelude cannot finish fall through to a forward A* whose remaining-cost
//! estimate is deliberately inflated to trade optimality for speed.

use crate::error::RouteError;
use crate::router::congestion::{present_wire_cost, BoundRef, PerWireData};
use crate::router::state::NetSummary;
use crate::router::Router;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use strand_device::ids::{PipId, WireId};
use strand_device::rng::DetRng;
use strand_diag::{Diagnostic, Stage};

/// Cost of a wire on the search frontier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WireScore {
    /// Accumulated congestion-aware cost from the source.
    pub cost: f32,
    /// Inflated estimate of the remaining cost to the sink.
    pub togo: f32,
    /// Accumulated physical delay, for reporting.
    pub delay: f32,
}

impl WireScore {
    pub(crate) fn total(&self) -> f32 {
        self.cost + self.togo
    }
}

/// A frontier entry in the forward A* priority queue.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueuedWire {
    pub wire: WireId,
    pub score: WireScore,
    /// Deterministic tie-break: higher tag loses.
    pub randtag: u32,
}

impl PartialEq for QueuedWire {
    fn eq(&self, other: &Self) -> bool {
        self.score.total() == other.score.total() && self.randtag == other.randtag
    }
}

impl Eq for QueuedWire {}

impl Ord for QueuedWire {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: the entry that compares Greater pops
        // first, so lower totals (and lower randtags on ties) win.
        match other
            .score
            .total()
            .partial_cmp(&self.score.total())
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Equal => other.randtag.cmp(&self.randtag),
            ord => ord,
        }
    }
}

impl PartialOrd for QueuedWire {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A settled wire in the forward search.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VisitInfo {
    pub score: WireScore,
    pub pip: Option<PipId>,
}

/// Outcome of routing one arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArcOutcome {
    /// The arc is bound in the in-memory congestion map.
    Routed,
    /// The search budget ran out inside the bounding box; the caller may
    /// retry with the box disabled (single-threaded only).
    RetryWithoutBb,
}

/// Reusable per-worker search state. Allocated once per dispatch so the
/// hot loops never allocate.
pub(crate) struct ThreadContext {
    /// Nets (by udata) assigned to this worker.
    pub route_nets: Vec<u32>,
    /// Nets that failed and must be retried single-threaded.
    pub failed_nets: Vec<u32>,
    /// Scratch list of user-pin indices to route for the current net.
    pub route_arcs: Vec<usize>,
    pub queue: BinaryHeap<QueuedWire>,
    pub visited: HashMap<WireId, VisitInfo>,
    /// Sinks already reached for the current net; a net may have several
    /// logical arcs onto one physical sink.
    pub processed_sinks: HashSet<WireId>,
    pub backwards_queue: VecDeque<WireId>,
    pub backwards_pip: HashMap<WireId, PipId>,
    /// Deterministic tie-break stream for this worker.
    pub rng: DetRng,
}

impl ThreadContext {
    pub(crate) fn new(rng: DetRng) -> Self {
        Self {
            route_nets: Vec::new(),
            failed_nets: Vec::new(),
            route_arcs: Vec::new(),
            queue: BinaryHeap::new(),
            visited: HashMap::new(),
            processed_sinks: HashSet::new(),
            backwards_queue: VecDeque::new(),
            backwards_pip: HashMap::new(),
            rng,
        }
    }
}

impl<'a> Router<'a> {
    /// Claims `wire` for the arc, recording `pip` as its driver. A net may
    /// share a wire across arcs only via the same driving PIP.
    pub(crate) fn bind_pip_internal(
        &self,
        udata: u32,
        user: usize,
        wire: WireId,
        pip: Option<PipId>,
    ) -> Result<(), RouteError> {
        {
            let mut wd = self.wires.write(wire);
            match wd.bound_nets.get_mut(&udata) {
                Some(b) => {
                    if b.pip != pip {
                        return Err(RouteError::ConflictingDriver {
                            net: self.net_name(udata).to_owned(),
                            wire: wire.as_raw(),
                        });
                    }
                    b.refcount += 1;
                }
                None => {
                    wd.bound_nets.insert(udata, BoundRef { refcount: 1, pip });
                }
            }
        }
        let mut nd = self.nets[udata as usize].write().unwrap();
        nd.arcs[user].wires.insert(wire, pip);
        Ok(())
    }

    /// Releases the arc's claim on `wire`.
    pub(crate) fn unbind_pip_internal(
        &self,
        udata: u32,
        user: usize,
        wire: WireId,
        dont_touch_arc: bool,
    ) {
        {
            let mut wd = self.wires.write(wire);
            if let Some(b) = wd.bound_nets.get_mut(&udata) {
                b.refcount -= 1;
                if b.refcount == 0 {
                    wd.bound_nets.remove(&udata);
                }
            }
        }
        if !dont_touch_arc {
            let mut nd = self.nets[udata as usize].write().unwrap();
            nd.arcs[user].wires.remove(&wire);
        }
    }

    /// Tears down the arc's whole routing tree.
    pub(crate) fn ripup_arc(&self, udata: u32, user: usize) {
        let wires: Vec<WireId> = {
            let mut nd = self.nets[udata as usize].write().unwrap();
            std::mem::take(&mut nd.arcs[user].wires).into_keys().collect()
        };
        for w in wires {
            self.unbind_pip_internal(udata, user, w, true);
        }
    }

    /// Whether the arc's recorded tree still reaches the source through
    /// uncontested wires.
    pub(crate) fn check_arc_routing(&self, udata: u32, user: usize, src: WireId, dst: WireId) -> bool {
        let dev = self.device();
        let mut cursor = dst;
        loop {
            let pip = {
                let nd = self.nets[udata as usize].read().unwrap();
                nd.arcs[user].wires.get(&cursor).copied()
            };
            let Some(pip) = pip else { break };
            if self.wires.read(cursor).bound_nets.len() != 1 {
                return false;
            }
            match pip {
                None => break,
                Some(p) => cursor = dev.pip_src_wire(p),
            }
        }
        cursor == src
    }

    /// Congestion-aware cost of entering `wire` through `pip`.
    pub(crate) fn score_wire_for_arc(
        &self,
        wd: &PerWireData,
        udata: u32,
        summary: &NetSummary,
        wire: WireId,
        pip: PipId,
    ) -> f32 {
        let dev = self.device();
        let base_cost = (dev.pip_delay(pip).max_ns
            + dev.wire_delay(wire).max_ns
            + dev.delay_epsilon().max_ns)
            .max(0.0) as f32;
        let present_cost = present_wire_cost(wd, udata, self.curr_cong_weight);
        let hist_cost = wd.hist_cong_cost;
        let source_uses = wd.source_uses(udata);
        let pl = dev.pip_location(pip);
        let bias_cost = 0.5 * (base_cost / summary.fanout.max(1) as f32)
            * (((pl.x - summary.cx).abs() + (pl.y - summary.cy).abs()) as f32
                / summary.hpwl as f32);
        base_cost * hist_cost * present_cost / (1 + source_uses) as f32 + bias_cost
    }

    /// Admissible-ish estimate of the remaining cost from `wire` to `sink`.
    pub(crate) fn get_togo_cost(&self, udata: u32, wire: WireId, sink: WireId) -> f32 {
        let dev = self.device();
        let source_uses = self.wires.read(wire).source_uses(udata);
        let ipin_cost = (dev.wire_delay(sink).max_ns + dev.delay_epsilon().max_ns) as f32;
        let est = dev.estimate_delay(wire, sink).max_ns as f32;
        (est - ipin_cost).max(0.0) / (1 + source_uses) as f32 + ipin_cost
    }

    /// Routes one arc of a net. `is_bb` enforces the arc's bounding box;
    /// `is_mt` suppresses logging and demotes structural errors so the
    /// caller can fail the net instead of the run.
    pub(crate) fn route_arc(
        &self,
        t: &mut ThreadContext,
        udata: u32,
        user: usize,
        is_mt: bool,
        is_bb: bool,
    ) -> Result<ArcOutcome, RouteError> {
        let dev = self.device();
        let net_id = self.nets_by_udata[udata as usize];
        let net = self.netlist.net(net_id);

        let src_wire = match &net.driver {
            Some(d) => d.source_wire.ok_or_else(|| RouteError::NoSourceWire {
                net: net.name.clone(),
                port: d.port.clone(),
            })?,
            None => net.users[user]
                .sink_wire
                .ok_or_else(|| RouteError::NoSinkWire {
                    net: net.name.clone(),
                    port: net.users[user].port.clone(),
                })?,
        };
        let dst_wire = net.users[user]
            .sink_wire
            .ok_or_else(|| RouteError::NoSinkWire {
                net: net.name.clone(),
                port: net.users[user].port.clone(),
            })?;

        if t.processed_sinks.contains(&dst_wire) {
            return Ok(ArcOutcome::Routed);
        }

        let (bb, summary) = {
            let nd = self.nets[udata as usize].read().unwrap();
            (
                nd.arcs[user].bb,
                NetSummary {
                    cx: nd.cx,
                    cy: nd.cy,
                    hpwl: nd.hpwl,
                    fanout: net.users.len(),
                },
            )
        };

        if !is_mt {
            log::debug!(
                "routing arc {} of net '{}' ({}, {}) -> ({}, {})",
                user,
                net.name,
                bb.x0,
                bb.y0,
                bb.x1,
                bb.y1
            );
        }

        t.queue.clear();
        t.backwards_queue.clear();
        t.backwards_pip.clear();

        // Backwards BFS prelude: strictly iteration-limited uphill walk
        // from the sink. Handles arcs that merge into existing routing far
        // faster than the forward search, at minimal cost for the rest.
        t.backwards_queue.push_back(dst_wire);
        let mut backwards_iter = 0u32;
        'bfs: while backwards_iter < self.cfg.backwards_limit {
            let Some(cursor) = t.backwards_queue.pop_front() else {
                break;
            };
            let bound_here = {
                let cwd = self.wires.read(cursor);
                cwd.bound_nets.get(&udata).copied()
            };
            let mut cpip: Option<PipId> = None;
            if let Some(b) = bound_here {
                // Try to tack onto existing routing, but only if the whole
                // chain back to the source is uncontested.
                let mut cursor2 = cursor;
                let mut merge_fail = false;
                loop {
                    let step = {
                        let wd = self.wires.read(cursor2);
                        match wd.bound_nets.get(&udata) {
                            Some(b2) => Some((wd.bound_nets.len() > 1, b2.pip)),
                            None => None,
                        }
                    };
                    let Some((contended, pip)) = step else { break };
                    if contended {
                        merge_fail = true;
                        break;
                    }
                    match pip {
                        None => break,
                        Some(p) => cursor2 = dev.pip_src_wire(p),
                    }
                }
                if !merge_fail && cursor2 == src_wire {
                    let mut c = cursor;
                    loop {
                        let pip = {
                            self.wires
                                .read(c)
                                .bound_nets
                                .get(&udata)
                                .and_then(|b2| b2.pip)
                        };
                        let Some(p) = pip else { break };
                        let prev = dev.pip_src_wire(p);
                        t.backwards_pip.insert(prev, p);
                        c = prev;
                    }
                    break 'bfs;
                }
                cpip = b.pip;
            }
            let mut did_something = false;
            for &uh in dev.pips_uphill(cursor) {
                did_something = true;
                if !dev.check_pip_avail(uh) && dev.bound_pip_net(uh) != Some(net_id) {
                    continue;
                }
                // one driving pip per wire within a net
                if let Some(cp) = cpip {
                    if cp != uh {
                        continue;
                    }
                }
                let next = dev.pip_src_wire(uh);
                if t.backwards_pip.contains_key(&next) {
                    continue;
                }
                {
                    let wd = self.wires.read(next);
                    if wd.unavailable {
                        continue;
                    }
                    if wd.reserved_net.map_or(false, |r| r != udata) {
                        continue;
                    }
                    // never allow congestion in backwards routing
                    if wd.congested_for(udata) {
                        continue;
                    }
                }
                t.backwards_queue.push_back(next);
                t.backwards_pip.insert(next, uh);
            }
            if did_something {
                backwards_iter += 1;
            }
        }

        if t.backwards_pip.contains_key(&src_wire) {
            let mut cursor_fwd = src_wire;
            self.bind_pip_internal(udata, user, src_wire, None)?;
            while let Some(&pip) = t.backwards_pip.get(&cursor_fwd) {
                cursor_fwd = dev.pip_dst_wire(pip);
                self.bind_pip_internal(udata, user, cursor_fwd, Some(pip))?;
            }
            if cursor_fwd != dst_wire {
                return Err(RouteError::InconsistentTree {
                    net: net.name.clone(),
                    user,
                });
            }
            t.processed_sinks.insert(dst_wire);
            return Ok(ArcOutcome::Routed);
        }

        // Forward A*.
        t.visited.clear();
        let base_score = WireScore {
            cost: 0.0,
            togo: self.get_togo_cost(udata, src_wire, dst_wire),
            delay: dev.wire_delay(src_wire).max_ns as f32,
        };
        t.queue.push(QueuedWire {
            wire: src_wire,
            score: base_score,
            randtag: 0,
        });
        t.visited.insert(
            src_wire,
            VisitInfo {
                score: base_score,
                pip: None,
            },
        );

        let mut to_explore = i64::from(self.cfg.iter_budget_scale)
            * i64::from((bb.width() + bb.height()).max(1));
        let mut iter: i64 = 0;
        let mut explored: u64 = 1;
        loop {
            if t.queue.is_empty() || (is_bb && iter >= to_explore) {
                break;
            }
            let curr = t.queue.pop().unwrap();
            iter += 1;
            for &dh in dev.pips_downhill(curr.wire) {
                if is_bb {
                    let pl = dev.pip_location(dh);
                    if !bb.contains_with_margin(pl.x, pl.y, self.cfg.bb_margin) {
                        continue;
                    }
                }
                if !dev.check_pip_avail(dh) && dev.bound_pip_net(dh) != Some(net_id) {
                    continue;
                }
                let next = dev.pip_dst_wire(dh);
                let link_cost = {
                    let nwd = self.wires.read(next);
                    if nwd.unavailable {
                        continue;
                    }
                    if nwd.reserved_net.map_or(false, |r| r != udata) {
                        continue;
                    }
                    if nwd
                        .bound_nets
                        .get(&udata)
                        .map_or(false, |b| b.pip != Some(dh))
                    {
                        continue;
                    }
                    self.score_wire_for_arc(&nwd, udata, &summary, next, dh)
                };
                let next_score = WireScore {
                    cost: curr.score.cost + link_cost,
                    togo: self.cfg.estimate_inflation
                        * self.get_togo_cost(udata, next, dst_wire),
                    delay: curr.score.delay
                        + (dev.pip_delay(dh).max_ns + dev.wire_delay(next).max_ns) as f32,
                };
                let better = match t.visited.get(&next) {
                    None => true,
                    Some(v) => v.score.total() > next_score.total(),
                };
                if better {
                    explored += 1;
                    t.queue.push(QueuedWire {
                        wire: next,
                        score: next_score,
                        randtag: t.rng.next_u32(),
                    });
                    t.visited.insert(
                        next,
                        VisitInfo {
                            score: next_score,
                            pip: Some(dh),
                        },
                    );
                    if next == dst_wire {
                        // drain residual better states, don't over-search
                        to_explore = to_explore.min(iter + 5);
                    }
                }
            }
        }

        if t.visited.contains_key(&dst_wire) {
            if !is_mt {
                log::debug!(
                    "routed arc {} of net '{}' (explored {} wires, delay {:.3} ns)",
                    user,
                    net.name,
                    explored,
                    t.visited[&dst_wire].score.delay
                );
            }
            let mut cursor_bwd = dst_wire;
            loop {
                let v = t.visited[&cursor_bwd];
                self.bind_pip_internal(udata, user, cursor_bwd, v.pip)?;
                match v.pip {
                    None => {
                        if cursor_bwd != src_wire {
                            return Err(RouteError::InconsistentTree {
                                net: net.name.clone(),
                                user,
                            });
                        }
                        break;
                    }
                    Some(p) => cursor_bwd = dev.pip_src_wire(p),
                }
            }
            t.processed_sinks.insert(dst_wire);
            Ok(ArcOutcome::Routed)
        } else {
            Ok(ArcOutcome::RetryWithoutBb)
        }
    }

    /// Routes every stale arc of a net. Returns `Ok(false)` when a
    /// bounding-box failure must be retried single-threaded.
    pub(crate) fn route_net(
        &self,
        t: &mut ThreadContext,
        udata: u32,
        is_mt: bool,
    ) -> Result<bool, RouteError> {
        let net_id = self.nets_by_udata[udata as usize];
        let net = self.netlist.net(net_id);
        if net.is_global || net.driver.is_none() {
            return Ok(true);
        }
        if !is_mt {
            log::debug!("routing net '{}'", net.name);
        }

        let src_wire = self.netlist.source_wire(net_id);

        t.processed_sinks.clear();
        t.route_arcs.clear();
        for i in 0..net.users.len() {
            if let (Some(src), Some(dst)) = (src_wire, net.users[i].sink_wire) {
                if self.check_arc_routing(udata, i, src, dst) {
                    continue;
                }
                // arcs pre-routed above STRONG (e.g. clocks) are kept as-is
                if let Some(entry) = net.wire_entry(dst) {
                    if entry.strength > strand_device::Strength::Strong {
                        continue;
                    }
                }
            }
            self.ripup_arc(udata, i);
            t.route_arcs.push(i);
        }

        // most critical arcs route first, while the fabric is emptiest
        if self.timing.is_some() {
            let crit = {
                let nd = self.nets[udata as usize].read().unwrap();
                nd.crit.clone()
            };
            t.route_arcs.sort_by(|&a, &b| {
                crit[b].partial_cmp(&crit[a]).unwrap_or(Ordering::Equal)
            });
        }

        let mut have_failures = false;
        let arcs = std::mem::take(&mut t.route_arcs);
        for &i in &arcs {
            match self.route_arc(t, udata, i, is_mt, true)? {
                ArcOutcome::Routed => {}
                ArcOutcome::RetryWithoutBb => {
                    if is_mt {
                        // can't leave the bounding box while other workers
                        // own the neighbouring quadrants
                        have_failures = true;
                    } else {
                        log::debug!(
                            "rerouting arc {} of net '{}' without bounding box",
                            i,
                            self.netlist.net(net_id).name
                        );
                        match self.route_arc(t, udata, i, is_mt, false)? {
                            ArcOutcome::Routed => {}
                            ArcOutcome::RetryWithoutBb => {
                                return Err(RouteError::Unroutable {
                                    net: self.netlist.net(net_id).name.clone(),
                                    user: i,
                                })
                            }
                        }
                    }
                }
            }
        }
        t.route_arcs = arcs;
        Ok(!have_failures)
    }

    /// Worker entry point: route this context's nets, collecting failures
    /// for the single-threaded cleanup phase. Never logs.
    pub(crate) fn router_thread(&self, t: &mut ThreadContext) {
        let nets = std::mem::take(&mut t.route_nets);
        for &udata in &nets {
            match self.route_net(t, udata, true) {
                Ok(true) => {}
                Ok(false) => t.failed_nets.push(udata),
                Err(e) => {
                    t.failed_nets.push(udata);
                    self.sink.emit(Diagnostic::warning(
                        Stage::Router,
                        format!("net '{}' deferred to single-threaded pass: {e}", self.net_name(udata)),
                    ));
                }
            }
        }
    }
}
