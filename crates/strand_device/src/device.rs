//! The device model contract consumed by the placement and routing cores.
//!
//! A [`DeviceModel`] is an immutable description of an FPGA fabric (BELs,
//! wires, PIPs, adjacency, delays, geometry) plus the mutable binding
//! tables that record which net owns each wire/PIP and which cell occupies
//! each BEL. The cores only ever talk to the fabric through this trait;
//! device-database loading and family-specific legality live behind it.

use crate::ids::{BelId, BelTypeId, CellId, NetId, PipId, WireId};
use crate::types::{BelPin, BoundingBox, Delay, Loc, Strength};

/// The fabric contract shared by the router and the placer.
///
/// Query methods take `&self` and must be safe to call concurrently from
/// routing workers. Binding mutators take `&mut self` and are only invoked
/// from single-threaded phases (placement apply, routing commit).
pub trait DeviceModel: Send + Sync {
    // --- iteration ---

    /// All BELs in the device.
    fn bels(&self) -> &[BelId];

    /// All routing wires in the device.
    fn wires(&self) -> &[WireId];

    /// All programmable interconnect points in the device.
    fn pips(&self) -> &[PipId];

    // --- adjacency ---

    /// PIPs whose destination is `wire` (possible drivers of the wire).
    fn pips_uphill(&self, wire: WireId) -> &[PipId];

    /// PIPs whose source is `wire` (fanout switches of the wire).
    fn pips_downhill(&self, wire: WireId) -> &[PipId];

    /// The wire driving the given PIP.
    fn pip_src_wire(&self, pip: PipId) -> WireId;

    /// The wire driven by the given PIP.
    fn pip_dst_wire(&self, pip: PipId) -> WireId;

    /// BEL pins attached to the given wire.
    fn wire_bel_pins(&self, wire: WireId) -> &[BelPin];

    // --- delays ---

    /// Propagation delay through an enabled PIP.
    fn pip_delay(&self, pip: PipId) -> Delay;

    /// Propagation delay along a wire.
    fn wire_delay(&self, wire: WireId) -> Delay;

    /// Topology-independent lower-bound delay estimate between two wires.
    fn estimate_delay(&self, src: WireId, dst: WireId) -> Delay;

    /// Topology-independent delay estimate between two BELs, used when a
    /// candidate move has not been committed to the fabric yet.
    fn estimate_bel_delay(&self, src: BelId, dst: BelId) -> Delay;

    /// The smallest meaningful delay increment for this device.
    fn delay_epsilon(&self) -> Delay;

    // --- geometry ---

    /// Grid location of a PIP.
    fn pip_location(&self, pip: PipId) -> Loc;

    /// Grid location of a BEL.
    fn bel_location(&self, bel: BelId) -> Loc;

    /// The BEL at the given location, if any.
    fn bel_by_location(&self, loc: Loc) -> Option<BelId>;

    /// The search window within which a route from `src` to `dst` is
    /// expected to stay.
    fn route_bounding_box(&self, src: WireId, dst: WireId) -> BoundingBox;

    // --- BEL typing and legality ---

    /// The resource class of a BEL.
    fn bel_type(&self, bel: BelId) -> BelTypeId;

    /// Whether a cell of type `ty` may be placed on `bel`.
    fn is_valid_bel_for_cell(&self, ty: BelTypeId, bel: BelId) -> bool {
        self.bel_type(bel) == ty
    }

    /// Whether the current occupancy of `bel` (and any co-located BELs) is
    /// architecturally legal.
    fn is_bel_location_valid(&self, _bel: BelId) -> bool {
        true
    }

    /// Whether the BEL drives a global buffer network. Nets driven from
    /// such BELs are ignored by wirelength/timing cost accounting.
    fn bel_global_buf(&self, _bel: BelId) -> bool {
        false
    }

    /// A stable per-BEL value mixed into worker RNG seeds.
    fn bel_checksum(&self, bel: BelId) -> u64;

    // --- wire/PIP bindings ---

    /// Binds a wire to a net. The wire must be unbound.
    fn bind_wire(&mut self, wire: WireId, net: NetId, strength: Strength);

    /// Releases a wire binding. The wire must be bound.
    fn unbind_wire(&mut self, wire: WireId);

    /// Binds a PIP to a net. Also binds the PIP's destination wire to the
    /// same net at the same strength.
    fn bind_pip(&mut self, pip: PipId, net: NetId, strength: Strength);

    /// Releases a PIP binding along with its destination wire.
    fn unbind_pip(&mut self, pip: PipId);

    /// Whether the wire is free to be bound.
    fn check_wire_avail(&self, wire: WireId) -> bool;

    /// Whether the PIP is free to be bound.
    fn check_pip_avail(&self, pip: PipId) -> bool;

    /// The net currently bound to the wire, if any.
    fn bound_wire_net(&self, wire: WireId) -> Option<NetId>;

    /// The net currently bound to the PIP, if any.
    fn bound_pip_net(&self, pip: PipId) -> Option<NetId>;

    /// The strength of the wire's current binding, if bound.
    fn wire_bind_strength(&self, wire: WireId) -> Option<Strength>;

    // --- BEL bindings ---

    /// Binds a BEL to a cell. The BEL must be unoccupied.
    fn bind_bel(&mut self, bel: BelId, cell: CellId, strength: Strength);

    /// Releases a BEL binding. The BEL must be occupied.
    fn unbind_bel(&mut self, bel: BelId);

    /// Whether the BEL is unoccupied.
    fn check_bel_avail(&self, bel: BelId) -> bool;

    /// The cell currently occupying the BEL, if any.
    fn bound_bel_cell(&self, bel: BelId) -> Option<CellId>;

    // --- deterministic randomness ---

    /// The next 32-bit draw from the device RNG stream.
    fn rng(&self) -> u32;

    /// A uniform draw in `0..n` from the device RNG stream.
    fn rng_n(&self, n: u32) -> u32;

    /// The next 64-bit draw from the device RNG stream.
    fn rng64(&self) -> u64;
}
