//! The physical netlist consumed by the strand PnR cores.
//!
//! A [`Netlist`] holds cells, nets, and regions. The placer mutates cell
//! BEL assignments; the router fills in each net's committed wire/PIP
//! bindings. Both cores stamp dense `udata` indices onto nets at setup so
//! per-net state can live in flat arrays.

#![warn(missing_docs)]

pub mod data;

pub use data::{Cell, Net, NetDriver, NetUser, NetWire, Netlist, Region};
