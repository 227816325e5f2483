//! Place-and-route cores for the strand FPGA toolchain.
//!
//! Two engines share the device-model abstraction from `strand_device`:
//!
//! 1. **Router** — iterative negotiated-congestion routing: every net is
//!    routed with a backwards-BFS + forward-A* hybrid, overused wires
//!    accumulate history cost, the present-congestion weight doubles each
//!    iteration, and conflict-free results are committed to the device
//!    binding tables.
//! 2. **Placer** — a parallel simulated-annealing refiner: worker threads
//!    evaluate move proposals against shadow state, the coordinator
//!    applies them serially through the real swap path, and whole chains
//!    move as atomic units.
//!
//! # Usage
//!
//! ```ignore
//! use strand_pnr::{refine_placement, route_design, PlacerConfig, RouterConfig};
//!
//! let ok = refine_placement(&mut dev, &mut netlist, &oracle, &sink,
//!                           PlacerConfig::default(), false, None);
//! assert!(ok);
//! let stats = route_design(&mut dev, &mut netlist, None, &sink,
//!                          RouterConfig::default())?;
//! assert_eq!(stats.overused_wires, 0);
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod placer;
pub mod router;

pub use config::{PlacerConfig, RouterConfig};
pub use error::{PlaceError, RouteError};
pub use placer::{refine_placement, Legalizer, Placer};
pub use router::{route_design, CongestionStats, RouteStats, Router};
