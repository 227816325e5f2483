//! Parallel move-proposal evaluation.
//!
//! Workers never mutate the netlist or device. Each evaluates candidate
//! moves for its slice of a 32-cell batch against a thread-local shadow
//! overlay and proposes at most one BEL per cell; the coordinator then
//! applies accepted proposals serially through the real swap path, where
//! legality and cost are re-checked. Worker RNG is seeded from the batch
//! seed and cell attributes only, so results do not depend on thread
//! scheduling.

use crate::placer::move_change::{MoveChangeData, MovedCells};
use crate::placer::Placer;
use rayon::prelude::*;
use strand_device::ids::{BelId, CellId};
use strand_device::rng::DetRng;
use strand_device::types::Strength;

/// Candidate BELs explored per cell per batch.
const CANDIDATES_PER_CELL: usize = 1;

/// Cells per dispatch batch: a balance between annealing quality and the
/// overhead of handing work to threads.
const BATCH_SIZE: usize = 32;

/// Thread-local scratch for one evaluation worker.
pub(crate) struct EvalScratch {
    mc: MoveChangeData,
    moved: MovedCells,
}

impl EvalScratch {
    pub(crate) fn new(arc_sizes: &[usize]) -> Self {
        Self {
            mc: MoveChangeData::new(arc_sizes),
            moved: MovedCells::new(),
        }
    }
}

/// One worker's verdict for one cell.
pub(crate) struct Proposal {
    pub cell: CellId,
    /// The BEL to swap towards, when the worker accepted a move.
    pub target: Option<BelId>,
    pub moves: u64,
    pub accepted: u64,
}

impl Placer<'_> {
    /// Evaluates candidate moves for one cell against the shadow overlay.
    pub(crate) fn evaluate_cell_move(
        &self,
        scratch: &mut EvalScratch,
        cell: CellId,
        batch_seed: u64,
    ) -> Proposal {
        let mut proposal = Proposal {
            cell,
            target: None,
            moves: 0,
            accepted: 0,
        };
        let Some(cur_bel) = self.netlist.cell(cell).bel else {
            return proposal;
        };
        // Seeded purely from batch + cell attributes: identical outcomes
        // for any thread count or schedule.
        let seed = batch_seed
            ^ u64::from(cell.as_raw())
            ^ (self.device().bel_checksum(cur_bel) << 32);
        let mut rng = DetRng::from_seed(seed);

        let mut best: Option<BelId> = None;
        let mut best_delta = f64::MAX;
        for _ in 0..CANDIDATES_PER_CELL {
            let Some(try_bel) = self.random_bel_for_cell(cell, &mut rng, None) else {
                continue;
            };
            if try_bel == cur_bel {
                continue;
            }
            if let Some(bound) = self.device().bound_bel_cell(try_bel) {
                let b = self.netlist.cell(bound);
                if b.bel_strength >= Strength::Strong || b.is_constrained() {
                    continue;
                }
            }
            scratch.moved.insert(cell, try_bel);
            self.add_move_cell(&mut scratch.mc, cell, cur_bel, &scratch.moved);
            if let Some(bound) = self.device().bound_bel_cell(try_bel) {
                scratch.moved.insert(bound, cur_bel);
                self.add_move_cell(&mut scratch.mc, bound, try_bel, &scratch.moved);
            }
            self.compute_cost_changes(&mut scratch.mc, &scratch.moved);
            let delta = self.cfg.lambda
                * (scratch.mc.timing_delta / self.last_timing_cost.max(f64::MIN_POSITIVE))
                + (1.0 - self.cfg.lambda)
                    * (scratch.mc.wirelen_delta as f64
                        / (self.last_wirelen_cost as f64).max(f64::MIN_POSITIVE));
            if delta < best_delta {
                best_delta = delta;
                best = Some(try_bel);
            }
            scratch.moved.clear();
            scratch.mc.reset();
        }

        if let Some(bel) = best {
            proposal.moves = 1;
            if best_delta < 0.0
                || (self.temp > 1e-9 && rng.unit() <= (-best_delta / self.temp).exp())
            {
                proposal.target = Some(bel);
                proposal.accepted = 1;
            }
        }
        proposal
    }

    /// One move window: shuffle the autoplaced cells, evaluate them in
    /// 32-cell batches on the pool, then apply accepted proposals through
    /// the real swap path.
    pub(crate) fn run_proposal_batches(
        &mut self,
        pool: &rayon::ThreadPool,
        mc: &mut MoveChangeData,
    ) {
        let mut order = self.autoplaced.clone();
        let mut rng = DetRng::from_seed(self.dev.rng64());
        rng.shuffle(&mut order);

        for batch in order.chunks(BATCH_SIZE) {
            let batch_seed = self.dev.rng64();
            let this: &Placer = self;
            let proposals: Vec<Proposal> = pool.install(|| {
                batch
                    .par_iter()
                    .map_init(
                        || EvalScratch::new(&this.arc_sizes),
                        |scratch, &cell| this.evaluate_cell_move(scratch, cell, batch_seed),
                    )
                    .collect()
            });
            for p in proposals {
                self.n_move += p.moves;
                self.n_accept += p.accepted;
                if let Some(target) = p.target {
                    if Some(target) != self.netlist.cell(p.cell).bel {
                        self.try_swap_position(mc, p.cell, target);
                    }
                }
            }
        }
    }
}
