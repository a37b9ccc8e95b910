use crate::core::forcefield::accumulator::DerivativeAccumulator;
use crate::core::forcefield::frames::FrameCache;
use crate::core::forcefield::params::SimulationParams;
use crate::core::forcefield::scoring::{Scorer, ScoringError, ScoringPolicy};
use crate::core::forcefield::term::EnergyTerm;
use crate::core::models::pair::CandidatePair;
use crate::core::models::system::BodySystem;
use crate::engine::error::EngineError;
use crate::engine::proximity::{ChainNeighborFilter, ProximityDetector};
use tracing::{debug, info, instrument};

/// Everything the per-step score needs that outlives a single step.
///
/// The global candidate set pairs every optimized body (group I) with every body
/// (group II), excluding chain neighbors, within `globals.range` plus `globals.slack`.
/// When the structure of the system changes, the groups and the interaction table are
/// rebuilt from the stored parameters.
pub struct StepContext {
    params: SimulationParams,
    policy: ScoringPolicy,
    frames: FrameCache,
    detector: ProximityDetector,
    structure_generation: u64,
}

impl StepContext {
    pub fn new(params: SimulationParams, system: &BodySystem) -> Result<Self, EngineError> {
        let policy = ScoringPolicy::from_params(&params, system);
        let detector = global_detector(&params, system)?;
        info!(
            num_bodies = system.body_count(),
            num_table_entries = policy.table.len(),
            range = params.globals.range,
            slack = params.globals.slack,
            "Created step context."
        );
        Ok(Self {
            params,
            policy,
            frames: FrameCache::build(system),
            detector,
            structure_generation: system.structure_generation(),
        })
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn detector(&self) -> &ProximityDetector {
        &self.detector
    }

    /// The candidate pairs as of the last refresh.
    pub fn candidates(&self) -> &[CandidatePair] {
        self.detector.current()
    }

    /// Brings frames, policy and candidate set up to date with `system`.
    pub fn refresh(&mut self, system: &BodySystem) -> Result<(), EngineError> {
        if system.structure_generation() != self.structure_generation {
            self.policy = ScoringPolicy::from_params(&self.params, system);
            self.detector = global_detector(&self.params, system)?;
            self.structure_generation = system.structure_generation();
            debug!(
                num_bodies = system.body_count(),
                "System structure changed; rebuilt interaction table and body groups."
            );
        }
        self.frames.refresh(system);
        self.detector.refresh(system)?;
        Ok(())
    }

    /// Refreshes the context and scores the current candidate set, chain backbones,
    /// bounding box and slab, adding derivatives to `da` if given.
    #[instrument(skip_all, name = "step_evaluate_task")]
    pub fn evaluate(
        &mut self,
        system: &BodySystem,
        da: Option<&mut DerivativeAccumulator>,
    ) -> Result<EnergyTerm, EngineError> {
        self.refresh(system)?;
        let scorer = Scorer::new(system, &self.frames, &self.policy)?;
        Ok(scorer.evaluate(self.detector.current(), da)?)
    }

    /// A scorer over the frames of the last refresh, e.g. to feed contact statistics.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::StaleFrames`] if `system` moved since the last refresh.
    pub fn scorer<'a>(&'a self, system: &'a BodySystem) -> Result<Scorer<'a>, ScoringError> {
        Scorer::new(system, &self.frames, &self.policy)
    }

    /// Merges the per-body buffers of `da` into the bodies of `system`.
    pub fn apply(system: &mut BodySystem, da: &DerivativeAccumulator) {
        da.apply_to(system);
    }
}

fn global_detector(
    params: &SimulationParams,
    system: &BodySystem,
) -> Result<ProximityDetector, EngineError> {
    let group_i = system
        .bodies_iter()
        .filter(|(_, body)| body.coordinates_optimized)
        .map(|(id, _)| id)
        .collect();
    let group_ii = system.bodies_iter().map(|(id, _)| id).collect();
    let detector = ProximityDetector::new(
        group_i,
        group_ii,
        params.globals.range,
        params.globals.slack,
    )?
    .with_filter(ChainNeighborFilter);
    Ok(detector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::params::GlobalParams;
    use crate::core::forcefield::sites::SiteShape;
    use crate::core::models::body::RigidBody;
    use crate::core::models::ids::BodyId;
    use nalgebra::{Point3, Vector3};
    use std::collections::HashMap;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn params() -> SimulationParams {
        SimulationParams {
            globals: GlobalParams {
                interaction_k: 1.0,
                interaction_range: 1.0,
                nonspecific_k: 0.0,
                nonspecific_range: 1.0,
                excluded_volume_k: 10.0,
                backbone_k: 1.0,
                slack: 1.0,
                range: 2.0,
                site_shape: SiteShape::Linear,
                box_side: None,
                slab_is_on: false,
                slab_thickness: 0.0,
                tunnel_radius: 0.0,
            },
            channel: None,
            types: HashMap::new(),
            interactions: Vec::new(),
        }
    }

    fn two_overlapping_bodies() -> (BodySystem, BodyId, BodyId) {
        let mut system = BodySystem::new();
        let t = system.intern_type("inert");
        let a = system
            .add_body(RigidBody::new("a", t, Point3::origin(), 1.0))
            .unwrap();
        let b = system
            .add_body(RigidBody::new("b", t, Point3::new(0.0, 1.5, 0.0), 1.0))
            .unwrap();
        (system, a, b)
    }

    #[test]
    fn evaluate_scores_overlap_and_apply_merges_derivatives() {
        let (mut system, a, b) = two_overlapping_bodies();
        let mut context = StepContext::new(params(), &system).unwrap();

        let mut da = DerivativeAccumulator::new();
        let term = context.evaluate(&system, Some(&mut da)).unwrap();
        assert_eq!(context.candidates().len(), 1);
        assert!(f64_approx_equal(term.excluded_volume, 5.0));
        assert!(f64_approx_equal(term.total(), 5.0));

        StepContext::apply(&mut system, &da);
        let db = system.body(b).unwrap().derivative().translational;
        assert!(f64_approx_equal(db.y, -10.0));
        assert!(f64_approx_equal(system.body(a).unwrap().derivative().translational.y, 10.0));
    }

    #[test]
    fn anchored_bodies_only_pair_with_optimized_ones() {
        let mut system = BodySystem::new();
        let t = system.intern_type("inert");
        for x in [0.0, 1.0] {
            system
                .add_body(RigidBody::new("wall", t, Point3::new(x, 0.0, 0.0), 0.5).anchored())
                .unwrap();
        }
        let mut context = StepContext::new(params(), &system).unwrap();
        context.refresh(&system).unwrap();
        assert!(context.candidates().is_empty());

        system
            .add_body(RigidBody::new("kap", t, Point3::new(0.5, 0.5, 0.0), 0.5))
            .unwrap();
        context.refresh(&system).unwrap();
        assert_eq!(context.candidates().len(), 2);
    }

    #[test]
    fn chain_neighbors_score_backbone_not_excluded_volume() {
        let (mut system, a, b) = two_overlapping_bodies();
        system.add_chain(&[a, b], 1.5).unwrap();
        let mut context = StepContext::new(params(), &system).unwrap();

        let term = context.evaluate(&system, None).unwrap();
        assert!(context.candidates().is_empty());
        assert_eq!(term.excluded_volume, 0.0);
        assert!(f64_approx_equal(term.backbone, 0.0));
    }

    #[test]
    fn scorer_reports_stale_frames_after_motion() {
        let (mut system, a, _) = two_overlapping_bodies();
        let mut context = StepContext::new(params(), &system).unwrap();
        context.refresh(&system).unwrap();
        assert!(context.scorer(&system).is_ok());

        system.translate(a, Vector3::new(0.1, 0.0, 0.0)).unwrap();
        assert!(matches!(
            context.scorer(&system),
            Err(ScoringError::StaleFrames { .. })
        ));
        context.refresh(&system).unwrap();
        assert!(context.scorer(&system).is_ok());
    }
}
