//! A synthetic grid fabric implementing [`DeviceModel`].
//!
//! `GridDevice` is built explicitly: hosts (and tests) add BELs, wires,
//! PIPs, and BEL pins one by one. Delay estimation is Manhattan distance
//! scaled by a per-unit delay, which makes the A* heuristic admissible
//! before inflation on any fabric built this way.

use crate::device::DeviceModel;
use crate::ids::{BelId, BelTypeId, CellId, NetId, PipId, WireId};
use crate::rng::DetRng;
use crate::types::{BelPin, BoundingBox, Delay, Loc, PinDir, Strength};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct BelData {
    name: String,
    loc: Loc,
    ty: BelTypeId,
    global_buf: bool,
}

#[derive(Debug, Clone)]
struct WireData {
    name: String,
    loc: Loc,
    delay: Delay,
    uphill: Vec<PipId>,
    downhill: Vec<PipId>,
    bel_pins: Vec<BelPin>,
}

#[derive(Debug, Clone)]
struct PipData {
    src: WireId,
    dst: WireId,
    loc: Loc,
    delay: Delay,
}

/// A synthetic W×H fabric with explicit construction.
pub struct GridDevice {
    width: i32,
    height: i32,
    bel_ids: Vec<BelId>,
    wire_ids: Vec<WireId>,
    pip_ids: Vec<PipId>,
    bels: Vec<BelData>,
    wires: Vec<WireData>,
    pips: Vec<PipData>,
    loc_to_bel: HashMap<(i32, i32, i32), BelId>,
    wire_bindings: Vec<Option<(NetId, Strength)>>,
    pip_bindings: Vec<Option<(NetId, Strength)>>,
    bel_bindings: Vec<Option<(CellId, Strength)>>,
    ns_per_unit: f64,
    epsilon: Delay,
    rng: Mutex<DetRng>,
}

impl GridDevice {
    /// Creates an empty fabric of the given grid extent.
    pub fn new(width: i32, height: i32, seed: u64) -> Self {
        Self {
            width,
            height,
            bel_ids: Vec::new(),
            wire_ids: Vec::new(),
            pip_ids: Vec::new(),
            bels: Vec::new(),
            wires: Vec::new(),
            pips: Vec::new(),
            loc_to_bel: HashMap::new(),
            wire_bindings: Vec::new(),
            pip_bindings: Vec::new(),
            bel_bindings: Vec::new(),
            ns_per_unit: 0.1,
            epsilon: Delay::flat(0.02),
            rng: Mutex::new(DetRng::from_seed(seed)),
        }
    }

    /// Grid extent as `(width, height)`.
    pub fn extent(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    /// Sets the per-grid-unit delay used by `estimate_delay`.
    pub fn set_unit_delay(&mut self, ns_per_unit: f64) {
        self.ns_per_unit = ns_per_unit;
    }

    /// Adds a BEL at the given location and returns its ID.
    pub fn add_bel(&mut self, name: impl Into<String>, loc: Loc, ty: BelTypeId) -> BelId {
        let id = BelId::from_raw(self.bels.len() as u32);
        self.bels.push(BelData {
            name: name.into(),
            loc,
            ty,
            global_buf: false,
        });
        self.bel_ids.push(id);
        self.bel_bindings.push(None);
        self.loc_to_bel.insert((loc.x, loc.y, loc.z), id);
        id
    }

    /// Marks a BEL as driving a global buffer network.
    pub fn set_global_buf(&mut self, bel: BelId) {
        self.bels[bel.index()].global_buf = true;
    }

    /// Adds a routing wire and returns its ID.
    pub fn add_wire(&mut self, name: impl Into<String>, loc: Loc, delay: Delay) -> WireId {
        let id = WireId::from_raw(self.wires.len() as u32);
        self.wires.push(WireData {
            name: name.into(),
            loc,
            delay,
            uphill: Vec::new(),
            downhill: Vec::new(),
            bel_pins: Vec::new(),
        });
        self.wire_ids.push(id);
        self.wire_bindings.push(None);
        id
    }

    /// Adds a PIP from `src` to `dst` and returns its ID.
    pub fn add_pip(&mut self, src: WireId, dst: WireId, loc: Loc, delay: Delay) -> PipId {
        let id = PipId::from_raw(self.pips.len() as u32);
        self.pips.push(PipData {
            src,
            dst,
            loc,
            delay,
        });
        self.pip_ids.push(id);
        self.pip_bindings.push(None);
        self.wires[src.index()].downhill.push(id);
        self.wires[dst.index()].uphill.push(id);
        id
    }

    /// Attaches a BEL pin to a wire.
    pub fn add_bel_pin(&mut self, bel: BelId, wire: WireId, dir: PinDir) {
        self.wires[wire.index()].bel_pins.push(BelPin { bel, dir });
    }

    /// The debug name of a wire.
    pub fn wire_name(&self, wire: WireId) -> &str {
        &self.wires[wire.index()].name
    }

    /// The debug name of a BEL.
    pub fn bel_name(&self, bel: BelId) -> &str {
        &self.bels[bel.index()].name
    }

    /// Grid location of a wire.
    pub fn wire_location(&self, wire: WireId) -> Loc {
        self.wires[wire.index()].loc
    }
}

impl DeviceModel for GridDevice {
    fn bels(&self) -> &[BelId] {
        &self.bel_ids
    }

    fn wires(&self) -> &[WireId] {
        &self.wire_ids
    }

    fn pips(&self) -> &[PipId] {
        &self.pip_ids
    }

    fn pips_uphill(&self, wire: WireId) -> &[PipId] {
        &self.wires[wire.index()].uphill
    }

    fn pips_downhill(&self, wire: WireId) -> &[PipId] {
        &self.wires[wire.index()].downhill
    }

    fn pip_src_wire(&self, pip: PipId) -> WireId {
        self.pips[pip.index()].src
    }

    fn pip_dst_wire(&self, pip: PipId) -> WireId {
        self.pips[pip.index()].dst
    }

    fn wire_bel_pins(&self, wire: WireId) -> &[BelPin] {
        &self.wires[wire.index()].bel_pins
    }

    fn pip_delay(&self, pip: PipId) -> Delay {
        self.pips[pip.index()].delay
    }

    fn wire_delay(&self, wire: WireId) -> Delay {
        self.wires[wire.index()].delay
    }

    fn estimate_delay(&self, src: WireId, dst: WireId) -> Delay {
        let dist = self.wires[src.index()].loc.manhattan(&self.wires[dst.index()].loc);
        Delay::flat(f64::from(dist) * self.ns_per_unit)
    }

    fn estimate_bel_delay(&self, src: BelId, dst: BelId) -> Delay {
        let dist = self.bels[src.index()].loc.manhattan(&self.bels[dst.index()].loc);
        Delay::flat(f64::from(dist) * self.ns_per_unit)
    }

    fn delay_epsilon(&self) -> Delay {
        self.epsilon
    }

    fn pip_location(&self, pip: PipId) -> Loc {
        self.pips[pip.index()].loc
    }

    fn bel_location(&self, bel: BelId) -> Loc {
        self.bels[bel.index()].loc
    }

    fn bel_by_location(&self, loc: Loc) -> Option<BelId> {
        self.loc_to_bel.get(&(loc.x, loc.y, loc.z)).copied()
    }

    fn route_bounding_box(&self, src: WireId, dst: WireId) -> BoundingBox {
        let a = self.wires[src.index()].loc;
        let b = self.wires[dst.index()].loc;
        let mut bb = BoundingBox::point(a.x, a.y);
        bb.extend(b.x, b.y);
        bb
    }

    fn bel_type(&self, bel: BelId) -> BelTypeId {
        self.bels[bel.index()].ty
    }

    fn bel_global_buf(&self, bel: BelId) -> bool {
        self.bels[bel.index()].global_buf
    }

    fn bel_checksum(&self, bel: BelId) -> u64 {
        // splitmix64 of the raw index, so nearby BELs seed far-apart streams
        let mut z = u64::from(bel.as_raw()).wrapping_add(0x9e37_79b9_7f4a_7c15);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    fn bind_wire(&mut self, wire: WireId, net: NetId, strength: Strength) {
        let slot = &mut self.wire_bindings[wire.index()];
        assert!(slot.is_none(), "wire {} already bound", wire);
        *slot = Some((net, strength));
    }

    fn unbind_wire(&mut self, wire: WireId) {
        let slot = &mut self.wire_bindings[wire.index()];
        assert!(slot.is_some(), "wire {} not bound", wire);
        *slot = None;
    }

    fn bind_pip(&mut self, pip: PipId, net: NetId, strength: Strength) {
        let slot = &mut self.pip_bindings[pip.index()];
        assert!(slot.is_none(), "pip {} already bound", pip);
        *slot = Some((net, strength));
        let dst = self.pips[pip.index()].dst;
        self.bind_wire(dst, net, strength);
    }

    fn unbind_pip(&mut self, pip: PipId) {
        let slot = &mut self.pip_bindings[pip.index()];
        assert!(slot.is_some(), "pip {} not bound", pip);
        *slot = None;
        let dst = self.pips[pip.index()].dst;
        self.unbind_wire(dst);
    }

    fn check_wire_avail(&self, wire: WireId) -> bool {
        self.wire_bindings[wire.index()].is_none()
    }

    fn check_pip_avail(&self, pip: PipId) -> bool {
        self.pip_bindings[pip.index()].is_none()
    }

    fn bound_wire_net(&self, wire: WireId) -> Option<NetId> {
        self.wire_bindings[wire.index()].map(|(n, _)| n)
    }

    fn bound_pip_net(&self, pip: PipId) -> Option<NetId> {
        self.pip_bindings[pip.index()].map(|(n, _)| n)
    }

    fn wire_bind_strength(&self, wire: WireId) -> Option<Strength> {
        self.wire_bindings[wire.index()].map(|(_, s)| s)
    }

    fn bind_bel(&mut self, bel: BelId, cell: CellId, strength: Strength) {
        let slot = &mut self.bel_bindings[bel.index()];
        assert!(slot.is_none(), "bel {} already bound", bel);
        *slot = Some((cell, strength));
    }

    fn unbind_bel(&mut self, bel: BelId) {
        let slot = &mut self.bel_bindings[bel.index()];
        assert!(slot.is_some(), "bel {} not bound", bel);
        *slot = None;
    }

    fn check_bel_avail(&self, bel: BelId) -> bool {
        self.bel_bindings[bel.index()].is_none()
    }

    fn bound_bel_cell(&self, bel: BelId) -> Option<CellId> {
        self.bel_bindings[bel.index()].map(|(c, _)| c)
    }

    fn rng(&self) -> u32 {
        self.rng.lock().unwrap().next_u32()
    }

    fn rng_n(&self, n: u32) -> u32 {
        self.rng.lock().unwrap().bounded(n)
    }

    fn rng64(&self) -> u64 {
        self.rng.lock().unwrap().next_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_wire_fabric() -> (GridDevice, WireId, WireId, PipId) {
        let mut dev = GridDevice::new(8, 8, 1);
        let a = dev.add_wire("a", Loc::new(0, 0, 0), Delay::flat(0.1));
        let b = dev.add_wire("b", Loc::new(3, 2, 0), Delay::flat(0.1));
        let p = dev.add_pip(a, b, Loc::new(1, 0, 0), Delay::flat(0.05));
        (dev, a, b, p)
    }

    #[test]
    fn adjacency_links_both_directions() {
        let (dev, a, b, p) = two_wire_fabric();
        assert_eq!(dev.pips_downhill(a), &[p]);
        assert_eq!(dev.pips_uphill(b), &[p]);
        assert!(dev.pips_uphill(a).is_empty());
        assert_eq!(dev.pip_src_wire(p), a);
        assert_eq!(dev.pip_dst_wire(p), b);
    }

    #[test]
    fn adjacency_symmetry_over_all_wires() {
        let (dev, ..) = two_wire_fabric();
        for &w in dev.wires() {
            for &p in dev.pips_uphill(w) {
                let src = dev.pip_src_wire(p);
                let hits = dev.pips_downhill(src).iter().filter(|&&q| q == p).count();
                assert_eq!(hits, 1);
            }
            for &p in dev.pips_downhill(w) {
                let dst = dev.pip_dst_wire(p);
                let hits = dev.pips_uphill(dst).iter().filter(|&&q| q == p).count();
                assert_eq!(hits, 1);
            }
        }
    }

    #[test]
    fn estimate_delay_is_manhattan() {
        let (dev, a, b, _) = two_wire_fabric();
        let d = dev.estimate_delay(a, b);
        assert!((d.max_ns - 0.5).abs() < 1e-9);
        assert_eq!(dev.estimate_delay(a, a).max_ns, 0.0);
    }

    #[test]
    fn route_bounding_box_spans_endpoints() {
        let (dev, a, b, _) = two_wire_fabric();
        let bb = dev.route_bounding_box(a, b);
        assert_eq!(bb, BoundingBox::new(0, 0, 3, 2));
    }

    #[test]
    fn wire_binding_lifecycle() {
        let (mut dev, a, _, _) = two_wire_fabric();
        let net = NetId::from_raw(0);
        assert!(dev.check_wire_avail(a));
        dev.bind_wire(a, net, Strength::Weak);
        assert!(!dev.check_wire_avail(a));
        assert_eq!(dev.bound_wire_net(a), Some(net));
        assert_eq!(dev.wire_bind_strength(a), Some(Strength::Weak));
        dev.unbind_wire(a);
        assert!(dev.check_wire_avail(a));
    }

    #[test]
    fn pip_binding_also_binds_dst_wire() {
        let (mut dev, _, b, p) = two_wire_fabric();
        let net = NetId::from_raw(3);
        dev.bind_pip(p, net, Strength::Weak);
        assert_eq!(dev.bound_pip_net(p), Some(net));
        assert_eq!(dev.bound_wire_net(b), Some(net));
        dev.unbind_pip(p);
        assert!(dev.check_pip_avail(p));
        assert!(dev.check_wire_avail(b));
    }

    #[test]
    fn bel_binding_and_lookup() {
        let mut dev = GridDevice::new(4, 4, 0);
        let ty = BelTypeId::from_raw(0);
        let bel = dev.add_bel("lc0", Loc::new(2, 1, 0), ty);
        assert_eq!(dev.bel_by_location(Loc::new(2, 1, 0)), Some(bel));
        assert_eq!(dev.bel_by_location(Loc::new(0, 0, 0)), None);
        assert!(dev.is_valid_bel_for_cell(ty, bel));
        assert!(!dev.is_valid_bel_for_cell(BelTypeId::from_raw(1), bel));

        let cell = CellId::from_raw(7);
        dev.bind_bel(bel, cell, Strength::User);
        assert!(!dev.check_bel_avail(bel));
        assert_eq!(dev.bound_bel_cell(bel), Some(cell));
        dev.unbind_bel(bel);
        assert!(dev.check_bel_avail(bel));
    }

    #[test]
    fn rng_streams_are_seed_deterministic() {
        let dev1 = GridDevice::new(4, 4, 99);
        let dev2 = GridDevice::new(4, 4, 99);
        for _ in 0..16 {
            assert_eq!(dev1.rng64(), dev2.rng64());
        }
        assert!(dev1.rng_n(10) < 10);
    }

    #[test]
    fn bel_checksum_is_stable_and_distinct() {
        let dev = GridDevice::new(2, 2, 0);
        let a = BelId::from_raw(0);
        let b = BelId::from_raw(1);
        assert_eq!(dev.bel_checksum(a), dev.bel_checksum(a));
        assert_ne!(dev.bel_checksum(a), dev.bel_checksum(b));
    }

    #[test]
    fn names_round_trip() {
        let (dev, a, ..) = two_wire_fabric();
        assert_eq!(dev.wire_name(a), "a");
    }
}
