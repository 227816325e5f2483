//! Configuration for the routing and placement cores.

use serde::{Deserialize, Serialize};

/// Tunables for the negotiated-congestion router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// How far outside an arc's bounding box the search may go, in grid
    /// units per side. Also the width of the corridor separating the
    /// four dispatch quadrants.
    pub bb_margin: i32,
    /// Productive expansion rounds allowed in the backwards BFS prelude.
    pub backwards_limit: u32,
    /// Below this queue size an iteration runs single-threaded.
    pub mt_threshold: usize,
    /// Number of routing worker threads.
    pub threads: usize,
    /// Inflation applied to the remaining-cost estimate in the A* total.
    /// Intentionally above 1: trades optimality for search speed and is
    /// tuned together with the congestion weights.
    pub estimate_inflation: f32,
    /// Forward search budget per unit of bounding-box half-perimeter.
    pub iter_budget_scale: u32,
    /// Negotiation iterations before giving up with a typed error.
    pub max_iterations: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bb_margin: 4,
            backwards_limit: 10,
            mt_threshold: 200,
            threads: 4,
            estimate_inflation: 1.75,
            iter_budget_scale: 25_000,
            max_iterations: 500,
        }
    }
}

/// Tunables for the simulated-annealing placement refiner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacerConfig {
    /// Initial annealing temperature (full placement mode).
    pub start_temp: f64,
    /// Weight on distance-to-constraint-satisfaction in the move delta.
    pub constraint_weight: f64,
    /// Below this BEL-type population, spatially bounded picks collapse
    /// to the whole fabric so sparse types never hit empty buckets.
    pub min_bels_for_grid_pick: usize,
    /// Nets with at least this many users skip per-move timing updates.
    pub timing_fanout_thresh: usize,
    /// Whether timing cost participates in the move delta at all.
    pub timing_driven: bool,
    /// Use pre-assigned slack budgets instead of criticalities.
    pub budget_based: bool,
    /// Reassign budgets every this many iterations (0 = never).
    pub slack_redist_iter: u32,
    /// Number of move-evaluation worker threads.
    pub threads: usize,
    /// Balance between timing and wirelength cost in the move delta.
    pub lambda: f64,
    /// Exponent applied to criticality in the arc timing cost.
    pub crit_exp: f64,
    /// Demote the post-placement validity failure to a warning.
    pub force: bool,
}

impl Default for PlacerConfig {
    fn default() -> Self {
        Self {
            start_temp: 10.0,
            constraint_weight: 10.0,
            min_bels_for_grid_pick: 64,
            timing_fanout_thresh: 30,
            timing_driven: true,
            budget_based: false,
            slack_redist_iter: 0,
            threads: 8,
            lambda: 0.5,
            crit_exp: 8.0,
            force: false,
        }
    }
}
