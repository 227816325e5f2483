//! Timing oracle contract consumed by the strand PnR cores.
//!
//! The analyzer internals live elsewhere; the cores only see per-arc
//! criticalities in `[0, 1]` and delay predictions through the
//! [`TimingOracle`] trait. The device is passed into every call so an
//! oracle never holds a fabric borrow of its own, which would conflict
//! with the cores mutating the binding tables. [`ManhattanOracle`] is a
//! topology-independent estimator for flows without a real analyzer, and
//! [`assign_uniform_budgets`] seeds slack budgets for budget-based
//! placement cost.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strand_device::{Delay, DeviceModel, NetId};
use strand_netlist::Netlist;

/// Per-user criticalities for one net.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetCriticality {
    /// Criticality in `[0, 1]` for each user, indexed like `Net::users`.
    pub criticality: Vec<f32>,
}

/// Criticality results for a whole design.
pub type CriticalityMap = HashMap<NetId, NetCriticality>;

/// The timing contract the cores consume.
///
/// Implementations must be callable from placement worker threads.
pub trait TimingOracle: Send + Sync {
    /// Computes per-arc criticalities for the current placement.
    fn criticalities(&self, dev: &dyn DeviceModel, netlist: &Netlist) -> CriticalityMap;

    /// Predicts the delay of one arc under the current placement.
    fn predict_delay(
        &self,
        dev: &dyn DeviceModel,
        netlist: &Netlist,
        net: NetId,
        user: usize,
    ) -> Delay;

    /// Reassigns slack budgets on the netlist (budget-based mode). The
    /// default leaves existing budgets untouched.
    fn assign_budgets(&self, _dev: &dyn DeviceModel, _netlist: &mut Netlist) {}
}

/// A topology-independent oracle estimating delays from BEL distance.
///
/// Criticality is the arc's predicted delay normalized against the
/// largest predicted delay in the design, which makes long arcs place
/// first without a real analyzer in the loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManhattanOracle;

impl ManhattanOracle {
    /// Creates the estimator.
    pub fn new() -> Self {
        Self
    }

    fn arc_delay(
        &self,
        dev: &dyn DeviceModel,
        netlist: &Netlist,
        net: NetId,
        user: usize,
    ) -> Delay {
        let n = netlist.net(net);
        let Some(driver) = &n.driver else {
            return Delay::ZERO;
        };
        let Some(usr) = n.users.get(user) else {
            return Delay::ZERO;
        };
        let (Some(src_bel), Some(dst_bel)) =
            (netlist.cell(driver.cell).bel, netlist.cell(usr.cell).bel)
        else {
            return Delay::ZERO;
        };
        dev.estimate_bel_delay(src_bel, dst_bel)
    }
}

impl TimingOracle for ManhattanOracle {
    fn criticalities(&self, dev: &dyn DeviceModel, netlist: &Netlist) -> CriticalityMap {
        let mut delays: Vec<(NetId, Vec<f64>)> = Vec::with_capacity(netlist.net_count());
        let mut max_delay = 0.0f64;
        for net in &netlist.nets {
            let mut per_user = Vec::with_capacity(net.users.len());
            for user in 0..net.users.len() {
                let d = self.arc_delay(dev, netlist, net.id, user).max_ns;
                max_delay = max_delay.max(d);
                per_user.push(d);
            }
            delays.push((net.id, per_user));
        }

        let mut map = CriticalityMap::new();
        for (id, per_user) in delays {
            if per_user.is_empty() {
                continue;
            }
            let criticality = per_user
                .iter()
                .map(|&d| {
                    if max_delay > 0.0 {
                        (d / max_delay) as f32
                    } else {
                        0.0
                    }
                })
                .collect();
            map.insert(id, NetCriticality { criticality });
        }
        map
    }

    fn predict_delay(
        &self,
        dev: &dyn DeviceModel,
        netlist: &Netlist,
        net: NetId,
        user: usize,
    ) -> Delay {
        self.arc_delay(dev, netlist, net, user)
    }
}

/// An oracle reporting a fixed criticality for every arc and a flat
/// delay prediction. Useful for tests that need a timing-driven code
/// path without caring about the numbers.
#[derive(Debug, Clone)]
pub struct UniformOracle {
    /// The criticality reported for every arc.
    pub criticality: f32,
    /// The delay reported for every arc.
    pub delay: Delay,
}

impl UniformOracle {
    /// Creates a uniform oracle with the given criticality and delay.
    pub fn new(criticality: f32, delay: Delay) -> Self {
        Self { criticality, delay }
    }
}

impl TimingOracle for UniformOracle {
    fn criticalities(&self, _dev: &dyn DeviceModel, netlist: &Netlist) -> CriticalityMap {
        let mut map = CriticalityMap::new();
        for net in &netlist.nets {
            if net.users.is_empty() {
                continue;
            }
            map.insert(
                net.id,
                NetCriticality {
                    criticality: vec![self.criticality; net.users.len()],
                },
            );
        }
        map
    }

    fn predict_delay(
        &self,
        _dev: &dyn DeviceModel,
        _netlist: &Netlist,
        _net: NetId,
        _user: usize,
    ) -> Delay {
        self.delay
    }
}

/// Seeds every arc's slack budget with half the clock period.
///
/// A real analyzer redistributes slack along paths; this flat split is
/// the documented fallback for budget-based mode when no analyzer is
/// attached.
pub fn assign_uniform_budgets(netlist: &mut Netlist, clock_period: Delay) {
    let budget = Delay::flat(clock_period.max_ns / 2.0);
    for net in &mut netlist.nets {
        for user in &mut net.users {
            user.budget = budget;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_device::ids::{BelTypeId, CellId};
    use strand_device::types::{Loc, Strength};
    use strand_device::GridDevice;
    use strand_netlist::{Cell, Net, NetDriver, NetUser};

    fn placed_pair() -> (GridDevice, Netlist, NetId) {
        let mut dev = GridDevice::new(16, 16, 0);
        let ty = BelTypeId::from_raw(0);
        let b0 = dev.add_bel("b0", Loc::new(0, 0, 0), ty);
        let b1 = dev.add_bel("b1", Loc::new(10, 0, 0), ty);

        let mut nl = Netlist::new();
        let c0 = nl.add_cell(Cell {
            id: CellId::from_raw(0),
            name: "drv".into(),
            ty,
            bel: Some(b0),
            bel_strength: Strength::Weak,
            pinned_bel: None,
            region: None,
            constr_parent: None,
            constr_children: Vec::new(),
            constr_offset: None,
        });
        let c1 = nl.add_cell(Cell {
            id: CellId::from_raw(0),
            name: "snk".into(),
            ty,
            bel: Some(b1),
            bel_strength: Strength::Weak,
            pinned_bel: None,
            region: None,
            constr_parent: None,
            constr_children: Vec::new(),
            constr_offset: None,
        });
        let net = nl.add_net(Net {
            id: NetId::from_raw(0),
            name: "n".into(),
            driver: Some(NetDriver {
                cell: c0,
                port: "O".into(),
                source_wire: None,
            }),
            users: vec![NetUser {
                cell: c1,
                port: "I".into(),
                sink_wire: None,
                budget: Delay::ZERO,
            }],
            wires: Vec::new(),
            is_global: false,
            udata: 0,
        });
        (dev, nl, net)
    }

    #[test]
    fn manhattan_predict_scales_with_distance() {
        let (dev, nl, net) = placed_pair();
        let oracle = ManhattanOracle::new();
        let d = oracle.predict_delay(&dev, &nl, net, 0);
        assert!((d.max_ns - 1.0).abs() < 1e-9);
    }

    #[test]
    fn manhattan_criticality_normalized() {
        let (dev, nl, net) = placed_pair();
        let oracle = ManhattanOracle::new();
        let crit = oracle.criticalities(&dev, &nl);
        let nc = crit.get(&net).unwrap();
        assert_eq!(nc.criticality.len(), 1);
        assert!((nc.criticality[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn manhattan_handles_unplaced_cells() {
        let (dev, mut nl, net) = placed_pair();
        nl.cells[0].bel = None;
        let oracle = ManhattanOracle::new();
        assert_eq!(oracle.predict_delay(&dev, &nl, net, 0).max_ns, 0.0);
    }

    #[test]
    fn uniform_oracle_reports_fixed_values() {
        let (dev, nl, net) = placed_pair();
        let oracle = UniformOracle::new(0.5, Delay::flat(2.0));
        let crit = oracle.criticalities(&dev, &nl);
        assert_eq!(crit.get(&net).unwrap().criticality, vec![0.5]);
        assert_eq!(oracle.predict_delay(&dev, &nl, net, 0).max_ns, 2.0);
    }

    #[test]
    fn uniform_budgets_cover_all_users() {
        let (_dev, mut nl, net) = placed_pair();
        assign_uniform_budgets(&mut nl, Delay::flat(10.0));
        assert_eq!(nl.net(net).users[0].budget.max_ns, 5.0);
    }
}
