//! Per-pass scratch assignment of sector levels.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::model::{LevelOfDetail, ModelId, SectorCost, SectorId, SectorTree, WantedSector};

#[derive(Debug, Clone, Copy)]
struct Taken {
    lod: LevelOfDetail,
    priority: f32,
    /// Whether this entry's cost is in the planner's budget accumulator.
    /// Forced entries and their ancestors never are.
    charged: bool,
}

impl Default for Taken {
    fn default() -> Self {
        Self {
            lod: LevelOfDetail::Discarded,
            priority: 0.0,
            charged: false,
        }
    }
}

/// Working copy of one model's level assignment during a planning pass.
///
/// Starts fully `Discarded`. Marking a sector `Detailed` also raises its
/// ancestors to at least `Simple` so coarse context loads before the detail
/// inside it; marginal costs account for that, refunding a previously
/// charged `Simple` when the sector itself upgrades.
pub struct TakenSectorTree {
    model: ModelId,
    tree: Arc<SectorTree>,
    taken: HashMap<SectorId, Taken>,
}

impl TakenSectorTree {
    pub fn new(model: ModelId, tree: Arc<SectorTree>) -> Self {
        Self {
            model,
            tree,
            taken: HashMap::new(),
        }
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn level(&self, sector: SectorId) -> LevelOfDetail {
        self.taken.get(&sector).map(|t| t.lod).unwrap_or_default()
    }

    pub fn priority(&self, sector: SectorId) -> f32 {
        self.taken.get(&sector).map_or(0.0, |t| t.priority)
    }

    /// Marginal cost of admitting `sector` as `Detailed` right now: its
    /// detailed cost (minus an already charged simple rendition) plus a
    /// simple rendition for every ancestor still `Discarded`.
    pub fn admission_cost(&self, sector: SectorId) -> SectorCost {
        let Some(metadata) = self.tree.get(sector) else {
            return SectorCost::default();
        };
        let entry = self.taken.get(&sector).copied().unwrap_or_default();
        if entry.lod == LevelOfDetail::Detailed {
            return SectorCost::default();
        }

        let detailed = metadata.cost(LevelOfDetail::Detailed);
        let refund = if entry.lod == LevelOfDetail::Simple && entry.charged {
            metadata.cost(LevelOfDetail::Simple)
        } else {
            SectorCost::default()
        };
        let mut cost = SectorCost::new(
            detailed.download_size.saturating_sub(refund.download_size),
            detailed.draw_calls.saturating_sub(refund.draw_calls),
        );
        for ancestor in self.tree.ancestors(sector) {
            if self.level(ancestor.id) == LevelOfDetail::Discarded {
                cost += ancestor.cost(LevelOfDetail::Simple);
            }
        }
        cost
    }

    /// Admit `sector` as `Detailed` with a budgeted priority, marking the
    /// path to the root. Returns the marginal cost charged.
    pub fn admit_detailed(&mut self, sector: SectorId, priority: f32) -> SectorCost {
        let cost = self.admission_cost(sector);
        self.mark(sector, priority, true);
        cost
    }

    /// Force `sector` to `Detailed` at infinite priority, bypassing the
    /// budget. Returns the forced spend for the pass summary.
    pub fn force_detailed(&mut self, sector: SectorId) -> SectorCost {
        let Some(metadata) = self.tree.get(sector) else {
            return SectorCost::default();
        };

        let mut cost = SectorCost::default();
        if self.level(sector) != LevelOfDetail::Detailed {
            cost += metadata.cost(LevelOfDetail::Detailed);
        }
        for ancestor in self.tree.ancestors(sector) {
            if self.level(ancestor.id) == LevelOfDetail::Discarded {
                cost += ancestor.cost(LevelOfDetail::Simple);
            }
        }
        self.mark(sector, f32::INFINITY, false);
        cost
    }

    fn mark(&mut self, sector: SectorId, priority: f32, charged: bool) {
        if !self.tree.contains(sector) {
            return;
        }
        let entry = self.taken.entry(sector).or_default();
        entry.lod = LevelOfDetail::Detailed;
        entry.priority = entry.priority.max(priority);
        entry.charged = entry.charged || charged;

        let ancestors: Vec<SectorId> = self.tree.ancestors(sector).map(|a| a.id).collect();
        for ancestor in ancestors {
            let entry = self.taken.entry(ancestor).or_default();
            if entry.lod == LevelOfDetail::Discarded {
                entry.lod = LevelOfDetail::Simple;
                entry.charged = charged;
            }
            entry.priority = entry.priority.max(priority);
        }
    }

    /// Emit one `WantedSector` per tree node, parents before children, with
    /// `Discarded` entries included so downstream can detect unload intent.
    pub fn flatten(&self) -> Vec<WantedSector> {
        let mut wanted = Vec::with_capacity(self.tree.len());
        let Some(root) = self.tree.root_id() else {
            return wanted;
        };

        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            let entry = self.taken.get(&id).copied().unwrap_or_default();
            wanted.push(WantedSector {
                model: self.model,
                sector: id,
                lod: entry.lod,
                priority: entry.priority,
            });
            queue.extend(self.tree.children_of(id).map(|child| child.id));
        }
        wanted
    }
}
