//! Budgeted planning pass: one camera pose in, one prioritized want list out.
//!
//! A pass walks every registered model's octree, forces proximate sectors to
//! `Detailed`, weights the remaining frustum candidates by estimated screen
//! coverage, and greedily admits them until the budget runs out. The result
//! is a flat want list covering every sector of every model, so downstream
//! can diff it against what is resident and unload the rest.

use tracing::{debug, error};

use super::estimator::{CoverageMap, EstimatorScene, SectorBox, VisibilityEstimator};
use super::taken::TakenSectorTree;
use crate::math::{aabb_passes_clip, Aabb, Frustum};
use crate::model::{
    Budget, CameraState, ClippingState, LevelOfDetail, ModelMetadata, SectorCost, SectorId,
    WantedSector,
};
use crate::telemetry::LoaderMetrics;

/// Inputs of one planning pass.
pub struct PlanRequest<'a> {
    pub models: &'a [ModelMetadata],
    pub camera: CameraState,
    pub clipping: &'a ClippingState,
    pub budget: Budget,
    /// Bounds of geometry already delivered, submitted as occluders.
    pub resident: Vec<Aabb>,
}

/// Totals of one planning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlanSummary {
    /// Budgeted spend of the admitted sectors.
    pub admitted: SectorCost,
    /// Unbudgeted spend of proximity- and clip-forced sectors.
    pub forced: SectorCost,
    pub admitted_sectors: usize,
    pub forced_sectors: usize,
    /// Candidates that carried weight but fell outside the budget.
    pub culled_sectors: usize,
}

/// One planning pass's want list plus its totals.
#[derive(Debug, Clone, Default)]
pub struct PlanOutput {
    /// Every sector of every model, highest priority first. `Discarded`
    /// entries are unload intent, not omissions.
    pub wanted: Vec<WantedSector>,
    pub summary: PlanSummary,
}

struct Scored {
    model_index: usize,
    sector: SectorId,
    weight: f32,
}

/// Run one planning pass.
///
/// Admission stops at the first candidate whose marginal cost no longer fits
/// the budget, even if a cheaper candidate further down would; weight order
/// is authoritative. Estimator failure is logged and treated as zero
/// coverage, so only forced sectors survive such a pass.
pub async fn plan(
    request: PlanRequest<'_>,
    estimator: &mut dyn VisibilityEstimator,
    metrics: &LoaderMetrics,
) -> PlanOutput {
    let PlanRequest {
        models,
        camera,
        clipping,
        budget,
        resident,
    } = request;

    let mut taken: Vec<TakenSectorTree> = models
        .iter()
        .map(|model| TakenSectorTree::new(model.id, model.tree.clone()))
        .collect();
    let mut summary = PlanSummary::default();

    // Proximity pass: anything inside the reduced-far frustum is forced to
    // full detail before any budgeting happens.
    if budget.high_detail_proximity_threshold > 0.0 {
        let proximity = Frustum::from_view_projection(
            &camera.view_projection_with_far(budget.high_detail_proximity_threshold),
        );
        for (model, tree) in models.iter().zip(&mut taken) {
            for sector in model.tree.iter() {
                if proximity.intersects_aabb(&sector.bounds)
                    && aabb_passes_clip(&sector.bounds, &clipping.planes, clipping.mode)
                {
                    summary.forced += tree.force_detailed(sector.id);
                    summary.forced_sectors += 1;
                }
            }
        }
    }

    let view_projection = camera.view_projection();
    let frustum = Frustum::from_view_projection(&view_projection);
    let mut candidates = Vec::new();
    let mut candidate_models = Vec::new();
    for (index, model) in models.iter().enumerate() {
        for sector in model.tree.iter() {
            if !frustum.intersects_aabb(&sector.bounds) {
                continue;
            }
            if !aabb_passes_clip(&sector.bounds, &clipping.planes, clipping.mode) {
                continue;
            }
            candidates.push(SectorBox {
                model: model.id,
                sector: sector.id,
                bounds: sector.bounds,
                coverage: sector.simple.coverage_factors.mean(),
            });
            candidate_models.push(index);
        }
    }

    let coverage = if candidates.is_empty() {
        CoverageMap::new()
    } else {
        let scene = EstimatorScene {
            view_projection,
            candidates: candidates.clone(),
            occluders: resident,
        };
        match estimator.estimate(scene).await {
            Ok(map) => map,
            Err(error) => {
                error!(error = %error, "coverage estimate failed, planning with forced sectors only");
                CoverageMap::new()
            }
        }
    };

    let mut scored: Vec<Scored> = candidates
        .iter()
        .zip(&candidate_models)
        .filter_map(|(candidate, &model_index)| {
            let weight = coverage
                .get(&(candidate.model, candidate.sector))
                .copied()
                .unwrap_or(0.0);
            (weight > 0.0).then_some(Scored {
                model_index,
                sector: candidate.sector,
                weight,
            })
        })
        .collect();

    let total_weight: f32 = scored.iter().map(|s| s.weight).sum();
    if total_weight > 0.0 {
        for entry in &mut scored {
            entry.weight /= total_weight;
        }
    }
    // Stable, so equal weights keep model-then-tree encounter order.
    scored.sort_by(|a, b| b.weight.total_cmp(&a.weight));

    let mut remaining = scored.iter();
    for entry in remaining.by_ref() {
        let tree = &mut taken[entry.model_index];
        if tree.level(entry.sector) == LevelOfDetail::Detailed {
            continue;
        }
        let admission = tree.admission_cost(entry.sector);
        if !(summary.admitted + admission).fits_within(&budget) {
            // First over-budget candidate ends admission outright.
            summary.culled_sectors += 1;
            metrics.sector_culled();
            break;
        }
        summary.admitted += tree.admit_detailed(entry.sector, entry.weight);
        summary.admitted_sectors += 1;
    }
    for _ in remaining {
        summary.culled_sectors += 1;
        metrics.sector_culled();
    }

    let mut wanted: Vec<WantedSector> = Vec::new();
    for tree in &taken {
        wanted.extend(tree.flatten());
    }
    // Stable again: forced entries lead, and within equal priority parents
    // stay ahead of their children.
    wanted.sort_by(|a, b| b.priority.total_cmp(&a.priority));

    debug!(
        admitted = summary.admitted_sectors,
        forced = summary.forced_sectors,
        culled = summary.culled_sectors,
        download_bytes = summary.admitted.download_size,
        draw_calls = summary.admitted.draw_calls,
        "planning pass complete"
    );

    PlanOutput { wanted, summary }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    use glam::Vec3;

    use crate::culling::estimator::tests::MockVisibilityEstimator;
    use crate::math::{ClipMode, Plane};
    use crate::model::{
        CoverageFactors, DetailedFile, ModelId, ModelMetadata, SectorMetadata, SimpleFile,
    };

    fn test_sector(
        id: u64,
        parent: Option<u64>,
        children: &[u64],
        center: Vec3,
        half_extent: f32,
        simple: (u64, u32),
        detailed: (u64, u32),
    ) -> SectorMetadata {
        SectorMetadata {
            id: SectorId(id),
            parent_id: parent.map(SectorId),
            children: children.iter().copied().map(SectorId).collect(),
            depth: u32::from(parent.is_some()),
            path: format!("{id}/"),
            bounds: Aabb::new(
                center - Vec3::splat(half_extent),
                center + Vec3::splat(half_extent),
            ),
            simple: SimpleFile {
                file_name: format!("sector_{id}.f3d"),
                download_size: simple.0,
                estimated_draw_calls: simple.1,
                coverage_factors: CoverageFactors {
                    xy: 0.5,
                    yz: 0.5,
                    xz: 0.5,
                },
            },
            detailed: DetailedFile {
                file_name: format!("sector_{id}.i3d"),
                peripheral_files: Vec::new(),
                download_size: detailed.0,
                estimated_draw_calls: detailed.1,
            },
        }
    }

    fn model(sectors: Vec<SectorMetadata>) -> ModelMetadata {
        ModelMetadata::new(ModelId(1), "https://host/model", sectors).unwrap()
    }

    /// Free root plus two weighted children in front of the default camera.
    fn two_child_model(first: (u64, u32), second: (u64, u32)) -> ModelMetadata {
        model(vec![
            test_sector(0, None, &[1, 2], Vec3::new(0.0, 0.0, -5.0), 2.0, (0, 0), (0, 0)),
            test_sector(1, Some(0), &[], Vec3::new(-1.0, 0.0, -5.0), 0.5, (50, 1), first),
            test_sector(2, Some(0), &[], Vec3::new(1.0, 0.0, -5.0), 0.5, (40, 1), second),
        ])
    }

    fn budget(download: u64, draw_calls: u32, proximity: f32) -> Budget {
        Budget {
            download_size_bytes: download,
            max_draw_calls: draw_calls,
            high_detail_proximity_threshold: proximity,
        }
    }

    fn levels(output: &PlanOutput) -> HashMap<SectorId, LevelOfDetail> {
        output.wanted.iter().map(|w| (w.sector, w.lod)).collect()
    }

    async fn run(
        models: &[ModelMetadata],
        clipping: &ClippingState,
        budget: Budget,
        estimator: &mut MockVisibilityEstimator,
        metrics: &LoaderMetrics,
    ) -> PlanOutput {
        let request = PlanRequest {
            models,
            camera: CameraState::default(),
            clipping,
            budget,
            resident: Vec::new(),
        };
        plan(request, estimator, metrics).await
    }

    #[tokio::test]
    async fn test_admits_by_weight_until_budget_exhausted() {
        let models = [two_child_model((700, 6), (500, 5))];
        let mut estimator = MockVisibilityEstimator::new();
        estimator.set_weight(ModelId(1), SectorId(1), 0.9);
        estimator.set_weight(ModelId(1), SectorId(2), 0.5);
        let metrics = LoaderMetrics::default();

        let output = run(
            &models,
            &ClippingState::default(),
            budget(1000, 10, 0.0),
            &mut estimator,
            &metrics,
        )
        .await;

        let levels = levels(&output);
        assert_eq!(levels[&SectorId(1)], LevelOfDetail::Detailed);
        assert_eq!(levels[&SectorId(0)], LevelOfDetail::Simple);
        assert_eq!(levels[&SectorId(2)], LevelOfDetail::Discarded);

        assert_eq!(output.summary.admitted, SectorCost::new(700, 6));
        assert_eq!(output.summary.admitted_sectors, 1);
        assert_eq!(output.summary.culled_sectors, 1);
        assert_eq!(output.summary.forced_sectors, 0);
        assert_eq!(metrics.snapshot().sectors_culled, 1);

        // Parent precedes child at equal priority; the losing child trails.
        let order: Vec<SectorId> = output.wanted.iter().map(|w| w.sector).collect();
        assert_eq!(order, vec![SectorId(0), SectorId(1), SectorId(2)]);
    }

    #[tokio::test]
    async fn test_proximity_forces_detail_past_zero_budget() {
        let models = [model(vec![test_sector(
            0,
            None,
            &[],
            Vec3::new(0.0, 0.0, -5.0),
            0.5,
            (10, 1),
            (100, 5),
        )])];
        let mut estimator = MockVisibilityEstimator::new();
        let metrics = LoaderMetrics::default();

        let output = run(
            &models,
            &ClippingState::default(),
            budget(0, 0, 10.0),
            &mut estimator,
            &metrics,
        )
        .await;

        assert_eq!(output.wanted.len(), 1);
        let forced = &output.wanted[0];
        assert_eq!(forced.lod, LevelOfDetail::Detailed);
        assert!(forced.is_forced());
        assert_eq!(output.summary.forced, SectorCost::new(100, 5));
        assert_eq!(output.summary.forced_sectors, 1);
        assert_eq!(output.summary.admitted, SectorCost::default());
        assert_eq!(output.summary.culled_sectors, 0);
    }

    #[tokio::test]
    async fn test_admission_stops_at_first_over_budget_candidate() {
        let models = [model(vec![
            test_sector(0, None, &[1, 2, 3], Vec3::new(0.0, 0.0, -5.0), 2.0, (0, 0), (0, 0)),
            test_sector(1, Some(0), &[], Vec3::new(-1.0, 0.0, -5.0), 0.5, (5, 1), (600, 1)),
            test_sector(2, Some(0), &[], Vec3::new(0.0, 0.0, -5.0), 0.5, (5, 1), (500, 1)),
            test_sector(3, Some(0), &[], Vec3::new(1.0, 0.0, -5.0), 0.5, (5, 1), (10, 1)),
        ])];
        let mut estimator = MockVisibilityEstimator::new();
        estimator.set_weight(ModelId(1), SectorId(1), 0.9);
        estimator.set_weight(ModelId(1), SectorId(2), 0.8);
        estimator.set_weight(ModelId(1), SectorId(3), 0.7);
        let metrics = LoaderMetrics::default();

        let output = run(
            &models,
            &ClippingState::default(),
            budget(1000, 10, 0.0),
            &mut estimator,
            &metrics,
        )
        .await;

        let levels = levels(&output);
        assert_eq!(levels[&SectorId(1)], LevelOfDetail::Detailed);
        assert_eq!(levels[&SectorId(2)], LevelOfDetail::Discarded);
        // Would fit, but admission already stopped.
        assert_eq!(levels[&SectorId(3)], LevelOfDetail::Discarded);

        assert_eq!(output.summary.admitted, SectorCost::new(600, 1));
        assert_eq!(output.summary.culled_sectors, 2);
        assert_eq!(metrics.snapshot().sectors_culled, 2);
    }

    #[tokio::test]
    async fn test_zero_weight_candidates_stay_discarded() {
        let models = [two_child_model((100, 1), (100, 1))];
        let mut estimator = MockVisibilityEstimator::new();
        estimator.set_weight(ModelId(1), SectorId(1), 0.9);
        let metrics = LoaderMetrics::default();

        let output = run(
            &models,
            &ClippingState::default(),
            budget(10_000, 100, 0.0),
            &mut estimator,
            &metrics,
        )
        .await;

        let levels = levels(&output);
        assert_eq!(levels[&SectorId(1)], LevelOfDetail::Detailed);
        assert_eq!(levels[&SectorId(2)], LevelOfDetail::Discarded);
        // Unweighted is not the same as culled.
        assert_eq!(output.summary.culled_sectors, 0);
    }

    #[tokio::test]
    async fn test_equal_weights_admit_in_encounter_order() {
        let models = [two_child_model((600, 1), (600, 1))];
        let mut estimator = MockVisibilityEstimator::new();
        estimator.set_weight(ModelId(1), SectorId(1), 0.5);
        estimator.set_weight(ModelId(1), SectorId(2), 0.5);
        let metrics = LoaderMetrics::default();

        let output = run(
            &models,
            &ClippingState::default(),
            budget(1000, 10, 0.0),
            &mut estimator,
            &metrics,
        )
        .await;

        let levels = levels(&output);
        assert_eq!(levels[&SectorId(1)], LevelOfDetail::Detailed);
        assert_eq!(levels[&SectorId(2)], LevelOfDetail::Discarded);
    }

    #[tokio::test]
    async fn test_clipped_sectors_are_not_candidates() {
        let models = [model(vec![
            test_sector(0, None, &[1, 2], Vec3::new(0.0, 0.0, -6.0), 2.0, (0, 0), (0, 0)),
            test_sector(1, Some(0), &[], Vec3::new(0.0, 0.0, -5.0), 0.5, (5, 1), (100, 1)),
            test_sector(2, Some(0), &[], Vec3::new(0.0, 0.0, -7.0), 0.5, (5, 1), (100, 1)),
        ])];
        // Keep only the far half-space, z <= -6.
        let clipping = ClippingState {
            planes: vec![Plane::new(Vec3::new(0.0, 0.0, -1.0), -6.0)],
            mode: ClipMode::Intersection,
        };
        let mut estimator = MockVisibilityEstimator::new();
        estimator.set_weight(ModelId(1), SectorId(1), 0.9);
        estimator.set_weight(ModelId(1), SectorId(2), 0.8);
        let state = estimator.state.clone();
        let metrics = LoaderMetrics::default();

        let output = run(&models, &clipping, budget(10_000, 100, 0.0), &mut estimator, &metrics)
            .await;

        let levels = levels(&output);
        assert_eq!(levels[&SectorId(1)], LevelOfDetail::Discarded);
        assert_eq!(levels[&SectorId(2)], LevelOfDetail::Detailed);

        let scene = state.last_scene.lock();
        let submitted: Vec<SectorId> =
            scene.as_ref().unwrap().candidates.iter().map(|c| c.sector).collect();
        assert!(!submitted.contains(&SectorId(1)));
        assert!(submitted.contains(&SectorId(2)));
    }

    #[tokio::test]
    async fn test_estimator_failure_leaves_forced_sectors_only() {
        let models = [model(vec![
            test_sector(0, None, &[1], Vec3::new(0.0, 0.0, -5.0), 0.5, (10, 1), (100, 5)),
            test_sector(1, Some(0), &[], Vec3::new(0.0, 0.0, -50.0), 0.5, (5, 1), (50, 1)),
        ])];
        let mut estimator = MockVisibilityEstimator::new();
        estimator.set_weight(ModelId(1), SectorId(1), 0.9);
        estimator.state.fail.store(true, Ordering::SeqCst);
        let metrics = LoaderMetrics::default();

        let output = run(
            &models,
            &ClippingState::default(),
            budget(10_000, 100, 10.0),
            &mut estimator,
            &metrics,
        )
        .await;

        let levels = levels(&output);
        assert_eq!(levels[&SectorId(0)], LevelOfDetail::Detailed);
        assert_eq!(levels[&SectorId(1)], LevelOfDetail::Discarded);
        assert_eq!(output.summary.admitted, SectorCost::default());
        assert_eq!(output.summary.forced_sectors, 1);
    }

    #[tokio::test]
    async fn test_no_models_plans_nothing() {
        let mut estimator = MockVisibilityEstimator::new();
        let state = estimator.state.clone();
        let metrics = LoaderMetrics::default();

        let output = run(
            &[],
            &ClippingState::default(),
            Budget::default(),
            &mut estimator,
            &metrics,
        )
        .await;

        assert!(output.wanted.is_empty());
        assert_eq!(output.summary, PlanSummary::default());
        assert_eq!(state.estimates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resident_bounds_reach_the_estimator() {
        let models = [two_child_model((100, 1), (100, 1))];
        let mut estimator = MockVisibilityEstimator::new();
        estimator.set_weight(ModelId(1), SectorId(1), 0.9);
        let state = estimator.state.clone();
        let metrics = LoaderMetrics::default();

        let request = PlanRequest {
            models: &models,
            camera: CameraState::default(),
            clipping: &ClippingState::default(),
            budget: budget(10_000, 100, 0.0),
            resident: vec![Aabb::new(Vec3::ZERO, Vec3::ONE)],
        };
        plan(request, &mut estimator, &metrics).await;

        let scene = state.last_scene.lock();
        assert_eq!(scene.as_ref().unwrap().occluders.len(), 1);
    }

    #[tokio::test]
    async fn test_wanted_sorted_forced_first_then_by_weight() {
        let models = [model(vec![
            test_sector(0, None, &[1], Vec3::new(0.0, 0.0, -5.0), 0.5, (10, 2), (100, 2)),
            test_sector(1, Some(0), &[], Vec3::new(0.0, 0.0, -30.0), 0.5, (5, 1), (50, 1)),
        ])];
        let mut estimator = MockVisibilityEstimator::new();
        estimator.set_weight(ModelId(1), SectorId(1), 0.9);
        let metrics = LoaderMetrics::default();

        let output = run(
            &models,
            &ClippingState::default(),
            budget(1000, 10, 10.0),
            &mut estimator,
            &metrics,
        )
        .await;

        assert!(output.wanted[0].is_forced());
        assert_eq!(output.wanted[0].sector, SectorId(0));
        assert!(output
            .wanted
            .windows(2)
            .all(|pair| pair[0].priority >= pair[1].priority));
        assert_eq!(output.summary.forced_sectors, 1);
        assert_eq!(output.summary.admitted_sectors, 1);
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        /// Free root plus one weighted leaf per entry of `costs`, fanned out
        /// across the default view at ids 1..=N.
        fn fan_model(root_simple: (u64, u32), costs: &[(u64, u32)]) -> ModelMetadata {
            let child_ids: Vec<u64> = (1..=costs.len() as u64).collect();
            let mut sectors = vec![test_sector(
                0,
                None,
                &child_ids,
                Vec3::new(0.0, 0.0, -5.0),
                3.0,
                root_simple,
                (0, 0),
            )];
            for (index, &cost) in costs.iter().enumerate() {
                sectors.push(test_sector(
                    index as u64 + 1,
                    Some(0),
                    &[],
                    Vec3::new(0.5 * index as f32 - 1.5, 0.0, -5.0),
                    0.2,
                    (0, 0),
                    cost,
                ));
            }
            model(sectors)
        }

        fn fan_estimator(children: &[(u64, u32, f32)]) -> MockVisibilityEstimator {
            let estimator = MockVisibilityEstimator::new();
            for (index, &(_, _, weight)) in children.iter().enumerate() {
                estimator.set_weight(ModelId(1), SectorId(index as u64 + 1), weight);
            }
            estimator
        }

        fn child_costs(children: &[(u64, u32, f32)]) -> Vec<(u64, u32)> {
            children.iter().map(|&(download, draws, _)| (download, draws)).collect()
        }

        fn plan_now(
            models: &[ModelMetadata],
            budget: Budget,
            estimator: &mut MockVisibilityEstimator,
            metrics: &LoaderMetrics,
        ) -> PlanOutput {
            tokio::runtime::Builder::new_current_thread()
                .build()
                .expect("current-thread runtime")
                .block_on(run(models, &ClippingState::default(), budget, estimator, metrics))
        }

        fn arb_children() -> impl Strategy<Value = Vec<(u64, u32, f32)>> {
            prop::collection::vec((0u64..5000, 0u32..50, 0.0f32..1.0), 1..8)
        }

        proptest! {
            /// Property: budgeted spend fits the budget no matter how costs,
            /// weights and limits fall.
            #[test]
            fn prop_admitted_spend_fits_budget(
                children in arb_children(),
                root_simple in (0u64..500, 0u32..10),
                download in 0u64..8000,
                draw_calls in 0u32..100,
            ) {
                let models = [fan_model(root_simple, &child_costs(&children))];
                let mut estimator = fan_estimator(&children);
                let metrics = LoaderMetrics::default();
                let budget = budget(download, draw_calls, 0.0);

                let output = plan_now(&models, budget, &mut estimator, &metrics);

                prop_assert!(output.summary.admitted.fits_within(&budget));
            }

            /// Property: the want list names every sector of the model
            /// exactly once, losers included.
            #[test]
            fn prop_want_list_covers_every_sector_once(
                children in arb_children(),
                download in 0u64..8000,
                draw_calls in 0u32..100,
                proximity in 0.0f32..8.0,
            ) {
                let models = [fan_model((10, 1), &child_costs(&children))];
                let mut estimator = fan_estimator(&children);
                let metrics = LoaderMetrics::default();

                let output = plan_now(
                    &models,
                    budget(download, draw_calls, proximity),
                    &mut estimator,
                    &metrics,
                );

                prop_assert_eq!(output.wanted.len(), children.len() + 1);
                let keys: std::collections::HashSet<(ModelId, SectorId)> =
                    output.wanted.iter().map(|w| (w.model, w.sector)).collect();
                prop_assert_eq!(keys.len(), children.len() + 1);
                for id in 0..=children.len() as u64 {
                    prop_assert!(keys.contains(&(ModelId(1), SectorId(id))));
                }
            }

            /// Property: want list priorities never rise from one entry to
            /// the next, forced entries ahead of everything.
            #[test]
            fn prop_want_list_priorities_never_rise(
                children in arb_children(),
                download in 0u64..8000,
                draw_calls in 0u32..100,
                proximity in 0.0f32..8.0,
            ) {
                let models = [fan_model((10, 1), &child_costs(&children))];
                let mut estimator = fan_estimator(&children);
                let metrics = LoaderMetrics::default();

                let output = plan_now(
                    &models,
                    budget(download, draw_calls, proximity),
                    &mut estimator,
                    &metrics,
                );

                prop_assert!(output
                    .wanted
                    .windows(2)
                    .all(|pair| pair[0].priority.total_cmp(&pair[1].priority).is_ge()));
            }

            /// Property: a zero proximity threshold forces nothing, so the
            /// budget is the only path to detail.
            #[test]
            fn prop_zero_proximity_forces_nothing(
                children in arb_children(),
                download in 0u64..8000,
                draw_calls in 0u32..100,
            ) {
                let models = [fan_model((10, 1), &child_costs(&children))];
                let mut estimator = fan_estimator(&children);
                let metrics = LoaderMetrics::default();

                let output = plan_now(
                    &models,
                    budget(download, draw_calls, 0.0),
                    &mut estimator,
                    &metrics,
                );

                prop_assert_eq!(output.summary.forced, SectorCost::default());
                prop_assert_eq!(output.summary.forced_sectors, 0);
                prop_assert!(output.wanted.iter().all(|w| !w.is_forced()));
            }

            /// Property: every candidate carrying weight is either admitted
            /// or culled, never silently dropped.
            #[test]
            fn prop_weighted_candidates_admitted_or_culled(
                children in arb_children(),
                download in 0u64..8000,
                draw_calls in 0u32..100,
            ) {
                let weighted = children.iter().filter(|&&(_, _, w)| w > 0.0).count();
                let models = [fan_model((10, 1), &child_costs(&children))];
                let mut estimator = fan_estimator(&children);
                let metrics = LoaderMetrics::default();

                let output = plan_now(
                    &models,
                    budget(download, draw_calls, 0.0),
                    &mut estimator,
                    &metrics,
                );

                prop_assert_eq!(
                    output.summary.admitted_sectors + output.summary.culled_sectors,
                    weighted
                );
            }
        }
    }
}
