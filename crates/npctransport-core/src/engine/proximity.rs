use super::config::{self, ConfigError};
use crate::core::models::ids::BodyId;
use crate::core::models::pair::{CandidatePair, unordered};
use crate::core::models::system::{BodySystem, ModelError};
use itertools::iproduct;
use nalgebra::Point3;
use slotmap::SecondaryMap;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Predicate excluding body pairs from the candidate set.
pub trait PairFilter: Send + Sync {
    fn excludes(&self, system: &BodySystem, a: BodyId, b: BodyId) -> bool;
}

impl<F> PairFilter for F
where
    F: Fn(&BodySystem, BodyId, BodyId) -> bool + Send + Sync,
{
    fn excludes(&self, system: &BodySystem, a: BodyId, b: BodyId) -> bool {
        self(system, a, b)
    }
}

/// Excludes consecutive members of the same chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainNeighborFilter;

impl PairFilter for ChainNeighborFilter {
    fn excludes(&self, system: &BodySystem, a: BodyId, b: BodyId) -> bool {
        system.are_chain_neighbors(a, b)
    }
}

type CellIndex = (i64, i64, i64);

/// Bipartite candidate-pair set between two body groups, rebuilt lazily.
///
/// A rebuild selects every pair `(a, b)` with `a` in group I, `b` in group II, `a != b`
/// and center distance at most `range + slack`, minus the pairs excluded by the filters.
/// Each unordered pair is reported once. The set stays valid while no tracked body has
/// moved more than `slack / 2` since the rebuild: two bodies can then have approached
/// each other by at most `slack`, so no pair within `range` is missed.
pub struct ProximityDetector {
    group_i: Vec<BodyId>,
    group_ii: Vec<BodyId>,
    range: f64,
    slack: f64,
    filters: Vec<Box<dyn PairFilter>>,
    candidates: Vec<CandidatePair>,
    /// Positions of every tracked body at the last rebuild.
    reference_positions: SecondaryMap<BodyId, Point3<f64>>,
    /// Pose and structure generation of the system at the last rebuild.
    built_for: Option<(u64, u64)>,
    num_rebuilds: usize,
}

impl ProximityDetector {
    /// Creates a detector over two body groups.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] if `range` is not positive or `slack`
    /// is negative.
    pub fn new(
        group_i: Vec<BodyId>,
        group_ii: Vec<BodyId>,
        range: f64,
        slack: f64,
    ) -> Result<Self, ConfigError> {
        config::require_positive("range", range)?;
        config::require_non_negative("slack", slack)?;
        Ok(Self {
            group_i,
            group_ii,
            range,
            slack,
            filters: Vec::new(),
            candidates: Vec::new(),
            reference_positions: SecondaryMap::new(),
            built_for: None,
            num_rebuilds: 0,
        })
    }

    pub fn with_filter(mut self, filter: impl PairFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn slack(&self) -> f64 {
        self.slack
    }

    /// Center distance cutoff used on rebuild.
    pub fn cutoff(&self) -> f64 {
        self.range + self.slack
    }

    pub fn group_i(&self) -> &[BodyId] {
        &self.group_i
    }

    pub fn group_ii(&self) -> &[BodyId] {
        &self.group_ii
    }

    pub fn num_rebuilds(&self) -> usize {
        self.num_rebuilds
    }

    /// Candidates of the last rebuild, without checking staleness.
    pub fn current(&self) -> &[CandidatePair] {
        &self.candidates
    }

    /// Returns `true` if the candidate set must be rebuilt for `system`.
    pub fn is_stale(&self, system: &BodySystem) -> bool {
        let Some((pose_generation, structure_generation)) = self.built_for else {
            return true;
        };
        if structure_generation != system.structure_generation() {
            return true;
        }
        if pose_generation == system.pose_generation() {
            return false;
        }
        let max_displacement = 0.5 * self.slack;
        self.reference_positions
            .iter()
            .any(|(id, reference)| match system.body(id) {
                Some(body) => (body.position() - reference).norm() > max_displacement,
                None => true,
            })
    }

    /// Rebuilds the candidate set if it is stale.
    ///
    /// # Return
    ///
    /// Returns `true` if a rebuild happened.
    pub fn refresh(&mut self, system: &BodySystem) -> Result<bool, ModelError> {
        if !self.is_stale(system) {
            return Ok(false);
        }
        self.rebuild(system)?;
        Ok(true)
    }

    /// Returns the current candidate set, rebuilding it first if stale.
    pub fn candidates(&mut self, system: &BodySystem) -> Result<&[CandidatePair], ModelError> {
        self.refresh(system)?;
        Ok(&self.candidates)
    }

    /// Unconditionally rebuilds the candidate set.
    ///
    /// Group II bodies are hashed into a uniform grid of cell size `range + slack`; each
    /// group I body then only visits its own and the 26 neighboring cells. The result is
    /// sorted by body handle so that iteration order is stable for a given rebuild.
    pub fn rebuild(&mut self, system: &BodySystem) -> Result<(), ModelError> {
        let cutoff = self.cutoff();
        let cutoff2 = cutoff * cutoff;

        let mut reference_positions = SecondaryMap::new();
        let mut grid: HashMap<CellIndex, Vec<(BodyId, Point3<f64>)>> = HashMap::new();
        for &b in &self.group_ii {
            let position = position_of(system, b)?;
            reference_positions.insert(b, position);
            grid.entry(cell_of(&position, cutoff))
                .or_default()
                .push((b, position));
        }

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for &a in &self.group_i {
            let pa = position_of(system, a)?;
            reference_positions.insert(a, pa);
            let (cx, cy, cz) = cell_of(&pa, cutoff);

            for (dx, dy, dz) in iproduct!(-1..=1_i64, -1..=1_i64, -1..=1_i64) {
                let Some(bucket) = grid.get(&(cx + dx, cy + dy, cz + dz)) else {
                    continue;
                };
                for &(b, pb) in bucket {
                    if a == b || (pa - pb).norm_squared() > cutoff2 {
                        continue;
                    }
                    if self.filters.iter().any(|f| f.excludes(system, a, b)) {
                        trace!(?a, ?b, "Pair excluded by filter.");
                        continue;
                    }
                    if seen.insert(unordered(a, b)) {
                        candidates.push(CandidatePair::new(a, b, cutoff));
                    }
                }
            }
        }
        candidates.sort_unstable_by_key(|pair| (pair.first, pair.second));

        self.candidates = candidates;
        self.reference_positions = reference_positions;
        self.built_for = Some((system.pose_generation(), system.structure_generation()));
        self.num_rebuilds += 1;
        debug!(
            num_candidates = self.candidates.len(),
            num_rebuilds = self.num_rebuilds,
            cutoff,
            "Rebuilt candidate pair set."
        );
        Ok(())
    }
}

fn position_of(system: &BodySystem, id: BodyId) -> Result<Point3<f64>, ModelError> {
    system
        .body(id)
        .map(|b| b.position())
        .ok_or(ModelError::BodyNotFound(id))
}

#[inline]
fn cell_of(position: &Point3<f64>, cell_size: f64) -> CellIndex {
    (
        (position.x / cell_size).floor() as i64,
        (position.y / cell_size).floor() as i64,
        (position.z / cell_size).floor() as i64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::body::RigidBody;
    use nalgebra::Vector3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn line_system(n: usize, spacing: f64) -> (BodySystem, Vec<BodyId>) {
        let mut system = BodySystem::new();
        let t = system.intern_type("fg");
        let ids = (0..n)
            .map(|i| {
                system
                    .add_body(RigidBody::new(
                        &format!("fg_{i}"),
                        t,
                        Point3::new(i as f64 * spacing, 0.0, 0.0),
                        0.5,
                    ))
                    .unwrap()
            })
            .collect();
        (system, ids)
    }

    fn keys(pairs: &[CandidatePair]) -> BTreeSet<(BodyId, BodyId)> {
        pairs.iter().map(CandidatePair::key).collect()
    }

    #[test]
    fn new_rejects_invalid_range_and_slack() {
        assert!(ProximityDetector::new(Vec::new(), Vec::new(), 0.0, 1.0).is_err());
        assert!(ProximityDetector::new(Vec::new(), Vec::new(), 1.0, -1.0).is_err());
    }

    #[test]
    fn reports_each_unordered_pair_once_and_never_self_pairs() {
        let (system, ids) = line_system(4, 1.0);
        let mut detector = ProximityDetector::new(ids.clone(), ids.clone(), 1.5, 0.0).unwrap();
        let pairs = detector.candidates(&system).unwrap().to_vec();

        assert_eq!(pairs.len(), 3);
        assert_eq!(keys(&pairs).len(), pairs.len());
        assert!(pairs.iter().all(|p| p.first != p.second));
        assert!(pairs.iter().all(|p| p.range == 1.5));
    }

    #[test]
    fn chain_neighbors_are_excluded() {
        let (mut system, ids) = line_system(3, 1.0);
        system.add_chain(&ids, 1.0).unwrap();
        let mut detector = ProximityDetector::new(ids.clone(), ids.clone(), 2.5, 0.0)
            .unwrap()
            .with_filter(ChainNeighborFilter);
        let pairs = detector.candidates(&system).unwrap();

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].key(), unordered(ids[0], ids[2]));
    }

    #[test]
    fn closure_filters_are_applied() {
        let (system, ids) = line_system(3, 1.0);
        let banned = ids[1];
        let mut detector = ProximityDetector::new(vec![ids[0]], ids.clone(), 5.0, 0.0)
            .unwrap()
            .with_filter(move |_: &BodySystem, a: BodyId, b: BodyId| a == banned || b == banned);
        let pairs = detector.candidates(&system).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].second, ids[2]);
    }

    #[test]
    fn first_member_belongs_to_group_i() {
        let (system, ids) = line_system(4, 1.0);
        let group_i = vec![ids[3], ids[1]];
        let mut detector = ProximityDetector::new(group_i.clone(), ids.clone(), 10.0, 0.0).unwrap();
        for pair in detector.candidates(&system).unwrap() {
            assert!(group_i.contains(&pair.first));
        }
    }

    #[test]
    fn rebuilds_only_after_moving_more_than_half_the_slack() {
        let (mut system, ids) = line_system(3, 3.0);
        let mut detector = ProximityDetector::new(ids.clone(), ids.clone(), 2.0, 1.0).unwrap();
        detector.refresh(&system).unwrap();
        assert_eq!(detector.num_rebuilds(), 1);

        system.translate(ids[0], Vector3::new(0.4, 0.0, 0.0)).unwrap();
        assert!(!detector.refresh(&system).unwrap());
        assert_eq!(detector.num_rebuilds(), 1);

        system.translate(ids[0], Vector3::new(0.2, 0.0, 0.0)).unwrap();
        assert!(detector.refresh(&system).unwrap());
        assert_eq!(detector.num_rebuilds(), 2);
    }

    #[test]
    fn structure_change_forces_rebuild() {
        let (mut system, ids) = line_system(2, 1.0);
        let mut detector = ProximityDetector::new(ids.clone(), ids.clone(), 2.0, 1.0).unwrap();
        detector.refresh(&system).unwrap();
        let t = system.intern_type("kap");
        system
            .add_body(RigidBody::new("kap_0", t, Point3::new(20.0, 0.0, 0.0), 1.0))
            .unwrap();
        assert!(detector.is_stale(&system));
    }

    #[test]
    fn missing_body_is_reported() {
        let (system, ids) = line_system(2, 1.0);
        let ghost = BodyId::default();
        let mut detector = ProximityDetector::new(vec![ghost], ids, 2.0, 1.0).unwrap();
        assert_eq!(
            detector.refresh(&system),
            Err(ModelError::BodyNotFound(ghost))
        );
    }

    #[test]
    fn never_misses_a_pair_within_range_under_random_motion() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut system = BodySystem::new();
        let t = system.intern_type("kap");
        let ids: Vec<BodyId> = (0..40)
            .map(|i| {
                let position = Point3::new(
                    rng.random_range(-6.0..6.0),
                    rng.random_range(-6.0..6.0),
                    rng.random_range(-6.0..6.0),
                );
                system
                    .add_body(RigidBody::new(&format!("kap_{i}"), t, position, 0.5))
                    .unwrap()
            })
            .collect();
        let (group_i, group_ii) = ids.split_at(15);
        let range = 2.0;
        let mut detector =
            ProximityDetector::new(group_i.to_vec(), group_ii.to_vec(), range, 1.0).unwrap();

        for _ in 0..50 {
            for &id in &ids {
                let step = Vector3::new(
                    rng.random_range(-0.2..0.2),
                    rng.random_range(-0.2..0.2),
                    rng.random_range(-0.2..0.2),
                );
                system.translate(id, step).unwrap();
            }
            let found = keys(detector.candidates(&system).unwrap());
            for &a in group_i {
                for &b in group_ii {
                    let pa = system.body(a).unwrap().position();
                    let pb = system.body(b).unwrap().position();
                    if (pa - pb).norm() <= range {
                        assert!(found.contains(&unordered(a, b)));
                    }
                }
            }
        }
        assert!(detector.num_rebuilds() < 50);
    }
}
