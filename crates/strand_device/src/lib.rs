//! Device model contract and synthetic fabric for the strand PnR cores.
//!
//! This crate defines everything the placement and routing engines know
//! about an FPGA device: opaque identifiers, geometry and delay types,
//! binding strengths, deterministic randomness, and the [`DeviceModel`]
//! trait through which all fabric queries and binding mutations flow.
//! [`GridDevice`] is a synthetic, explicitly constructed fabric used by
//! hosts without a real device database and by the test suites.

#![warn(missing_docs)]

pub mod device;
pub mod grid;
pub mod ids;
pub mod rng;
pub mod types;

pub use device::DeviceModel;
pub use grid::GridDevice;
pub use ids::{BelId, BelTypeId, CellId, NetId, PipId, RegionId, WireId};
pub use rng::DetRng;
pub use types::{BelPin, BoundingBox, Delay, Loc, PinDir, Strength};
