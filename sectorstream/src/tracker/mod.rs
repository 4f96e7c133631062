//! Delivered-state tracking.
//!
//! The orchestrator records which level of detail each sector was last
//! delivered at, so a planning pass only dispatches transitions. Absent
//! entries mean [`LevelOfDetail::Discarded`]; only resident sectors are
//! held, so an idle scene costs nothing regardless of tree size.

use std::collections::HashMap;

use crate::model::{LevelOfDetail, ModelId, SectorId};

/// Per-model map of delivered sector levels.
///
/// Owned and mutated by the orchestrator daemon alone; no interior locking.
#[derive(Debug, Default)]
pub struct ResidentSectorTracker {
    models: HashMap<ModelId, HashMap<SectorId, LevelOfDetail>>,
}

impl ResidentSectorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Level the scene currently holds for `sector`, `Discarded` if absent.
    pub fn current(&self, model: ModelId, sector: SectorId) -> LevelOfDetail {
        self.models
            .get(&model)
            .and_then(|sectors| sectors.get(&sector))
            .copied()
            .unwrap_or_default()
    }

    /// Whether delivering `sector` at `lod` would change the scene.
    pub fn has_changed(&self, model: ModelId, sector: SectorId, lod: LevelOfDetail) -> bool {
        self.current(model, sector) != lod
    }

    /// Record that `sector` is now delivered at `lod`.
    ///
    /// A `Discarded` update removes the entry; the last removal drops the
    /// model's map entirely.
    pub fn update(&mut self, model: ModelId, sector: SectorId, lod: LevelOfDetail) {
        if lod == LevelOfDetail::Discarded {
            if let Some(sectors) = self.models.get_mut(&model) {
                sectors.remove(&sector);
                if sectors.is_empty() {
                    self.models.remove(&model);
                }
            }
        } else {
            self.models.entry(model).or_default().insert(sector, lod);
        }
    }

    /// Forget `model`, returning what was resident so the caller can release
    /// the matching cache references.
    pub fn remove_model(&mut self, model: ModelId) -> Option<HashMap<SectorId, LevelOfDetail>> {
        self.models.remove(&model)
    }

    /// Number of resident sectors across all models.
    pub fn resident_count(&self) -> usize {
        self.models.values().map(HashMap::len).sum()
    }

    /// Every resident `(model, sector, lod)` triple, in no particular order.
    pub fn resident_sectors(
        &self,
    ) -> impl Iterator<Item = (ModelId, SectorId, LevelOfDetail)> + '_ {
        self.models.iter().flat_map(|(&model, sectors)| {
            sectors
                .iter()
                .map(move |(&sector, &lod)| (model, sector, lod))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: ModelId = ModelId(1);

    #[test]
    fn test_absent_sector_reads_discarded() {
        let tracker = ResidentSectorTracker::new();
        assert_eq!(
            tracker.current(MODEL, SectorId(5)),
            LevelOfDetail::Discarded
        );
        assert!(!tracker.has_changed(MODEL, SectorId(5), LevelOfDetail::Discarded));
        assert!(tracker.has_changed(MODEL, SectorId(5), LevelOfDetail::Simple));
    }

    #[test]
    fn test_update_records_delivery() {
        let mut tracker = ResidentSectorTracker::new();
        tracker.update(MODEL, SectorId(5), LevelOfDetail::Simple);

        assert_eq!(tracker.current(MODEL, SectorId(5)), LevelOfDetail::Simple);
        assert!(!tracker.has_changed(MODEL, SectorId(5), LevelOfDetail::Simple));
        assert!(tracker.has_changed(MODEL, SectorId(5), LevelOfDetail::Detailed));
        assert_eq!(tracker.resident_count(), 1);
    }

    #[test]
    fn test_discarded_update_removes_entry() {
        let mut tracker = ResidentSectorTracker::new();
        tracker.update(MODEL, SectorId(5), LevelOfDetail::Detailed);
        tracker.update(MODEL, SectorId(5), LevelOfDetail::Discarded);

        assert_eq!(
            tracker.current(MODEL, SectorId(5)),
            LevelOfDetail::Discarded
        );
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_models_tracked_independently() {
        let mut tracker = ResidentSectorTracker::new();
        tracker.update(ModelId(1), SectorId(5), LevelOfDetail::Simple);
        tracker.update(ModelId(2), SectorId(5), LevelOfDetail::Detailed);

        assert_eq!(
            tracker.current(ModelId(1), SectorId(5)),
            LevelOfDetail::Simple
        );
        assert_eq!(
            tracker.current(ModelId(2), SectorId(5)),
            LevelOfDetail::Detailed
        );
    }

    #[test]
    fn test_resident_sectors_spans_models() {
        let mut tracker = ResidentSectorTracker::new();
        tracker.update(ModelId(1), SectorId(1), LevelOfDetail::Simple);
        tracker.update(ModelId(2), SectorId(7), LevelOfDetail::Detailed);

        let mut resident: Vec<_> = tracker.resident_sectors().collect();
        resident.sort();
        assert_eq!(
            resident,
            vec![
                (ModelId(1), SectorId(1), LevelOfDetail::Simple),
                (ModelId(2), SectorId(7), LevelOfDetail::Detailed),
            ]
        );
    }

    #[test]
    fn test_remove_model_returns_resident_sectors() {
        let mut tracker = ResidentSectorTracker::new();
        tracker.update(MODEL, SectorId(1), LevelOfDetail::Simple);
        tracker.update(MODEL, SectorId(2), LevelOfDetail::Detailed);

        let removed = tracker.remove_model(MODEL).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[&SectorId(1)], LevelOfDetail::Simple);
        assert_eq!(removed[&SectorId(2)], LevelOfDetail::Detailed);
        assert!(tracker.is_empty());

        assert!(tracker.remove_model(MODEL).is_none());
    }
}
