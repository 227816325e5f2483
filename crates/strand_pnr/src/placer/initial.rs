//! Initial placement: pinned constraints, then random with displacement.

use crate::error::PlaceError;
use crate::placer::Placer;
use strand_device::ids::CellId;
use strand_device::rng::DetRng;
use strand_device::types::Strength;

impl Placer<'_> {
    /// Binds every pinned cell to its BEL with USER strength and locks
    /// the BEL against all later moves.
    pub(crate) fn place_constraints(&mut self) -> Result<usize, PlaceError> {
        let mut placed = 0usize;
        for i in 0..self.netlist.cell_count() {
            let cell_id = CellId::from_raw(i as u32);
            let Some(bel) = self.netlist.cell(cell_id).pinned_bel else {
                continue;
            };
            let ty = self.netlist.cell(cell_id).ty;
            if bel.index() >= self.dev.bels().len() || !self.dev.is_valid_bel_for_cell(ty, bel) {
                return Err(PlaceError::BadPin {
                    cell: self.netlist.cell(cell_id).name.clone(),
                });
            }
            if self.dev.bound_bel_cell(bel).is_some() {
                return Err(PlaceError::PinConflict {
                    cell: self.netlist.cell(cell_id).name.clone(),
                });
            }
            self.dev.bind_bel(bel, cell_id, Strength::User);
            let cell = self.netlist.cell_mut(cell_id);
            cell.bel = Some(bel);
            cell.bel_strength = Strength::User;
            self.locked_bels.insert(bel);
            placed += 1;
        }
        log::info!("placed {placed} cells based on constraints");
        Ok(placed)
    }

    /// Collects the unplaced cells, sorted by name for determinism and
    /// then shuffled into a random visit order.
    pub(crate) fn collect_autoplaced_initial(&mut self) {
        self.autoplaced = self
            .netlist
            .cells
            .iter()
            .filter(|c| c.bel.is_none())
            .map(|c| c.id)
            .collect();
        let netlist = &*self.netlist;
        self.autoplaced
            .sort_by(|&a, &b| netlist.cell(a).name.cmp(&netlist.cell(b).name));
        let mut rng = DetRng::from_seed(self.dev.rng64());
        rng.shuffle(&mut self.autoplaced);
    }

    /// Places one cell at a random compatible BEL. If every candidate is
    /// occupied, the weakest-bound incumbent is displaced and re-placed in
    /// turn, with a bounded ripup budget.
    pub(crate) fn place_initial(&mut self, cell: CellId) -> Result<(), PlaceError> {
        let mut cell = cell;
        let mut iters = 25u32;
        loop {
            if let Some(b) = self.netlist.cell(cell).bel {
                self.dev.unbind_bel(b);
                self.netlist.cell_mut(cell).bel = None;
            }
            let ty = self.netlist.cell(cell).ty;
            let region = self.netlist.cell(cell).region;

            let mut best_bel = None;
            let mut best_score = u64::MAX;
            let mut ripup_bel = None;
            let mut ripup_target = None;
            let mut best_ripup_score = u64::MAX;

            let candidates: Vec<_> = match region {
                Some(r) if self.netlist.region(r).constr_bels => {
                    self.netlist.region(r).bels.clone()
                }
                _ => self.dev.bels().to_vec(),
            };
            for bel in candidates {
                if !self.dev.is_valid_bel_for_cell(ty, bel) {
                    continue;
                }
                if self.dev.check_bel_avail(bel) {
                    let score = self.dev.rng64();
                    if score <= best_score {
                        best_score = score;
                        best_bel = Some(bel);
                    }
                } else {
                    let score = self.dev.rng64();
                    let bound = self.dev.bound_bel_cell(bel).unwrap();
                    if score <= best_ripup_score
                        && self.netlist.cell(bound).bel_strength < Strength::Strong
                    {
                        best_ripup_score = score;
                        ripup_target = Some(bound);
                        ripup_bel = Some(bel);
                    }
                }
            }

            match best_bel {
                Some(bel) => {
                    self.dev.bind_bel(bel, cell, Strength::Weak);
                    let c = self.netlist.cell_mut(cell);
                    c.bel = Some(bel);
                    c.bel_strength = Strength::Weak;
                    return Ok(());
                }
                None => {
                    let (Some(rb), Some(rt)) = (ripup_bel, ripup_target) else {
                        return Err(PlaceError::NoBelForCell {
                            cell: self.netlist.cell(cell).name.clone(),
                        });
                    };
                    if iters == 0 {
                        return Err(PlaceError::NoBelForCell {
                            cell: self.netlist.cell(cell).name.clone(),
                        });
                    }
                    iters -= 1;
                    self.dev.unbind_bel(rb);
                    self.netlist.cell_mut(rt).bel = None;
                    self.dev.bind_bel(rb, cell, Strength::Weak);
                    let c = self.netlist.cell_mut(cell);
                    c.bel = Some(rb);
                    c.bel_strength = Strength::Weak;
                    cell = rt;
                }
            }
        }
    }
}
