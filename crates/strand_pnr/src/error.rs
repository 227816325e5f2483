//! Typed errors for the routing and placement cores.
//!
//! Recoverable conditions (congestion, search exhaustion, rejected moves)
//! are expressed as enumerated results inside the cores; only the fatal
//! categories below surface as `Err`. In multi-threaded routing a fatal
//! per-arc condition degrades to a net failure and the net is retried
//! single-threaded, where the same condition becomes a hard error.

use thiserror::Error;

/// Fatal routing failures.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A driven net whose driver port maps to no fabric wire.
    #[error("no wire found for port {port} on source cell of net {net}")]
    NoSourceWire {
        /// Net name.
        net: String,
        /// Driver port name.
        port: String,
    },

    /// A user port that maps to no fabric wire.
    #[error("no wire found for port {port} on destination cell of net {net}")]
    NoSinkWire {
        /// Net name.
        net: String,
        /// User port name.
        port: String,
    },

    /// An arc that could not be routed even without its bounding box.
    #[error("failed to route arc {user} of net {net}")]
    Unroutable {
        /// Net name.
        net: String,
        /// User-pin index.
        user: usize,
    },

    /// A net whose recorded routing tree does not walk back to its source.
    #[error("inconsistent route tree for arc {user} of net {net}")]
    InconsistentTree {
        /// Net name.
        net: String,
        /// User-pin index.
        user: usize,
    },

    /// Two different PIPs driving one wire within a single net.
    #[error("conflicting driving pips on wire {wire} for net {net}")]
    ConflictingDriver {
        /// Net name.
        net: String,
        /// Wire index.
        wire: u32,
    },

    /// The negotiation loop hit its iteration cap with overuse remaining.
    #[error("routing did not converge after {iterations} iterations ({overused} wires overused)")]
    NotConverged {
        /// Iterations executed.
        iterations: u32,
        /// Wires still overused.
        overused: usize,
    },
}

/// Fatal placement failures.
#[derive(Debug, Error)]
pub enum PlaceError {
    /// A cell type with no matching BEL anywhere in the fabric.
    #[error("failed to place cell '{cell}': no usable bel of its type")]
    NoBelForCell {
        /// Cell name.
        cell: String,
    },

    /// A pinned BEL that does not exist or does not match the cell type.
    #[error("pinned bel for cell '{cell}' is missing or incompatible")]
    BadPin {
        /// Cell name.
        cell: String,
    },

    /// A pinned BEL already occupied by another cell.
    #[error("pinned bel for cell '{cell}' is already occupied")]
    PinConflict {
        /// Cell name.
        cell: String,
    },

    /// Post-placement validity sweep found an illegal BEL occupancy.
    #[error("post-placement validity check failed for bel {bel}")]
    InvalidBelLocation {
        /// BEL index.
        bel: u32,
    },

    /// A relative placement constraint left unsatisfied at convergence.
    #[error("constraint satisfaction check failed for cell '{cell}'")]
    ConstraintUnsatisfied {
        /// Cell name.
        cell: String,
    },

    /// The move-evaluation thread pool could not be constructed.
    #[error("failed to build placement thread pool: {0}")]
    ThreadPool(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_error_messages() {
        let e = RouteError::Unroutable {
            net: "data[3]".into(),
            user: 2,
        };
        assert_eq!(format!("{e}"), "failed to route arc 2 of net data[3]");

        let e = RouteError::NotConverged {
            iterations: 500,
            overused: 12,
        };
        assert!(format!("{e}").contains("500"));
        assert!(format!("{e}").contains("12"));
    }

    #[test]
    fn place_error_messages() {
        let e = PlaceError::NoBelForCell {
            cell: "lc_9".into(),
        };
        assert!(format!("{e}").contains("lc_9"));

        let e = PlaceError::ConstraintUnsatisfied {
            cell: "carry_0".into(),
        };
        assert!(format!("{e}").contains("carry_0"));
    }
}
