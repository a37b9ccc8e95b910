use super::body::{decorrelation_time, diffusion_coefficient};
use crate::core::models::ids::ChainId;
use crate::core::models::system::BodySystem;
use crate::engine::clock::SimulationClock;
use crate::engine::config::require_positive;
use crate::engine::error::EngineError;
use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainStatisticsSnapshot {
    /// Name of the first bead of the chain.
    pub name: String,
    pub n_beads: usize,
    pub n_samples: usize,
    pub diffusion_coefficient: Option<f64>,
    pub bead_diffusion_coefficients: Option<Vec<f64>>,
    pub correlation_time: Option<f64>,
}

/// Samples the bead positions of one chain every `period` steps.
///
/// The chain as a whole diffuses with its center of mass. Per-bead diffusion is measured
/// after removing the rigid motion of the chain between consecutive samples, and the
/// chain orientation is the rotation that best superposes one sample onto another.
/// Orientations are only well defined for chains of three or more non-collinear beads.
#[derive(Debug, Clone)]
pub struct ChainStatisticsTracker {
    chain: ChainId,
    period: usize,
    samples: Vec<Vec<Point3<f64>>>,
}

impl ChainStatisticsTracker {
    /// `period` is the number of simulation steps between two updates.
    pub fn new(chain: ChainId, period: usize) -> Result<Self, EngineError> {
        require_positive("period", period as f64)?;
        Ok(Self {
            chain,
            period,
            samples: Vec::new(),
        })
    }

    pub fn chain(&self) -> ChainId {
        self.chain
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    fn bead_positions(&self, system: &BodySystem) -> Result<Vec<Point3<f64>>, EngineError> {
        let chain = system
            .chain(self.chain)
            .ok_or(EngineError::ChainNotFound(self.chain))?;
        chain
            .bodies()
            .iter()
            .map(|&id| {
                system
                    .body(id)
                    .map(|b| b.position())
                    .ok_or(EngineError::BodyNotFound(id))
            })
            .collect()
    }

    /// Fails if the chain or one of its beads is no longer in `system`.
    pub fn check(&self, system: &BodySystem) -> Result<(), EngineError> {
        self.bead_positions(system).map(|_| ())
    }

    pub fn update(&mut self, system: &BodySystem) -> Result<(), EngineError> {
        let positions = self.bead_positions(system)?;
        self.samples.push(positions);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    fn sample_interval(&self, clock: &impl SimulationClock) -> f64 {
        self.period as f64 * clock.maximum_time_step()
    }

    /// Diffusion coefficient of the chain's center of mass.
    pub fn diffusion_coefficient(&self, clock: &impl SimulationClock) -> Option<f64> {
        let centers: Vec<Point3<f64>> = self
            .samples
            .iter()
            .filter_map(|sample| centroid(sample))
            .collect();
        let displacements: Vec<Vector3<f64>> = centers.windows(2).map(|w| w[1] - w[0]).collect();
        diffusion_coefficient(&displacements, self.sample_interval(clock))
    }

    /// Diffusion coefficient of every bead, in chain order, relative to the chain.
    ///
    /// Each sample is superposed onto the next before the bead displacements are taken.
    pub fn bead_diffusion_coefficients(&self, clock: &impl SimulationClock) -> Option<Vec<f64>> {
        let interval = self.sample_interval(clock);
        let n_beads = self.samples.first()?.len();
        let mut displacements = vec![Vec::with_capacity(self.samples.len()); n_beads];
        for w in self.samples.windows(2) {
            let relative = align_first_to_second(&w[0], &w[1])?;
            for (j, (before, after)) in w[0].iter().zip(&w[1]).enumerate() {
                displacements[j].push(relative.transform_point(before) - after);
            }
        }
        displacements
            .iter()
            .map(|d| diffusion_coefficient(d, interval))
            .collect()
    }

    /// Mean time for the chain orientation to rotate past one radian from each sample.
    ///
    /// Returns `None` for chains of fewer than three beads.
    pub fn correlation_time(&self, clock: &impl SimulationClock) -> Option<f64> {
        if self.samples.first()?.len() < 3 {
            return None;
        }
        decorrelation_time(self.samples.len(), self.sample_interval(clock), |i, j| {
            align_first_to_second(&self.samples[i], &self.samples[j])
                .map(|transform| transform.rotation.angle())
        })
    }

    pub fn snapshot(
        &self,
        system: &BodySystem,
        clock: &impl SimulationClock,
    ) -> ChainStatisticsSnapshot {
        let chain = system.chain(self.chain);
        ChainStatisticsSnapshot {
            name: chain
                .and_then(|c| c.bodies().first())
                .and_then(|&id| system.body(id))
                .map_or_else(|| format!("{:?}", self.chain), |b| b.name.clone()),
            n_beads: chain.map_or(0, |c| c.bodies().len()),
            n_samples: self.samples.len(),
            diffusion_coefficient: self.diffusion_coefficient(clock),
            bead_diffusion_coefficients: self.bead_diffusion_coefficients(clock),
            correlation_time: self.correlation_time(clock),
        }
    }
}

fn centroid(points: &[Point3<f64>]) -> Option<Point3<f64>> {
    if points.is_empty() {
        return None;
    }
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    Some(Point3::from(sum / points.len() as f64))
}

/// Least-squares rigid transformation mapping `first` onto `second`.
fn align_first_to_second(first: &[Point3<f64>], second: &[Point3<f64>]) -> Option<Isometry3<f64>> {
    let from_centroid = centroid(first)?;
    let to_centroid = centroid(second)?;

    let h = first
        .iter()
        .zip(second)
        .fold(Matrix3::zeros(), |acc, (f, t)| {
            acc + (t - to_centroid) * (f - from_centroid).transpose()
        });

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;

    let mut correction = Matrix3::identity();
    if (u * v_t).determinant() < 0.0 {
        correction[(2, 2)] = -1.0;
    }

    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
        u * correction * v_t,
    ));
    let translation = to_centroid.coords - rotation * from_centroid.coords;
    Some(Isometry3::from_parts(Translation3::from(translation), rotation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::body::RigidBody;
    use crate::core::models::ids::BodyId;
    use crate::engine::clock::ManualClock;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    /// Bead offsets of a rigid, non-collinear chain.
    fn shape() -> [Vector3<f64>; 3] {
        [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
            Vector3::new(-1.0, -1.0, 0.5),
        ]
    }

    fn chain_system() -> (BodySystem, ChainId, Vec<BodyId>) {
        let mut system = BodySystem::new();
        let fg = system.intern_type("fg");
        let beads: Vec<BodyId> = shape()
            .iter()
            .enumerate()
            .map(|(i, offset)| {
                system
                    .add_body(RigidBody::new(&format!("fg_{i}"), fg, Point3::from(*offset), 0.5))
                    .unwrap()
            })
            .collect();
        let chain = system.add_chain(&beads, 1.0).unwrap();
        (system, chain, beads)
    }

    fn place(system: &mut BodySystem, beads: &[BodyId], pose: &Isometry3<f64>) {
        for (id, offset) in beads.iter().zip(shape()) {
            system
                .set_position(*id, pose.transform_point(&Point3::from(offset)))
                .unwrap();
        }
    }

    #[test]
    fn center_of_mass_diffusion_uses_consecutive_centroids() {
        let (mut system, chain, beads) = chain_system();
        let mut tracker = ChainStatisticsTracker::new(chain, 10).unwrap();
        for x in [0.0, 1.0, 2.0] {
            place(&mut system, &beads, &Isometry3::translation(x, 0.0, 0.0));
            tracker.update(&system).unwrap();
        }
        let clock = ManualClock::new(2.0);
        let d = tracker.diffusion_coefficient(&clock).unwrap();
        assert!(f64_approx_equal(d, 1.0 / 120.0));
    }

    #[test]
    fn rigid_motion_gives_zero_bead_diffusion() {
        let (mut system, chain, beads) = chain_system();
        let mut tracker = ChainStatisticsTracker::new(chain, 1).unwrap();
        for (step, angle) in [0.0, 0.4, 1.1, 0.7].into_iter().enumerate() {
            let pose = Isometry3::from_parts(
                Translation3::new(step as f64, -0.5 * step as f64, 2.0),
                UnitQuaternion::from_euler_angles(angle, 0.5 * angle, -angle),
            );
            place(&mut system, &beads, &pose);
            tracker.update(&system).unwrap();
        }
        let clock = ManualClock::new(1.0);
        let coefficients = tracker.bead_diffusion_coefficients(&clock).unwrap();
        assert_eq!(coefficients.len(), 3);
        assert!(coefficients.iter().all(|&d| d.abs() < 1e-12));
        assert!(tracker.diffusion_coefficient(&clock).unwrap() > 0.0);
    }

    #[test]
    fn bead_moving_against_the_chain_diffuses() {
        let (mut system, chain, beads) = chain_system();
        let mut tracker = ChainStatisticsTracker::new(chain, 1).unwrap();
        tracker.update(&system).unwrap();
        system.translate(beads[2], Vector3::new(0.0, 0.0, 0.3)).unwrap();
        tracker.update(&system).unwrap();

        let clock = ManualClock::new(1.0);
        let coefficients = tracker.bead_diffusion_coefficients(&clock).unwrap();
        assert!(coefficients[2] > coefficients[0]);
        assert!(coefficients[2] > 0.0);
    }

    #[test]
    fn correlation_time_follows_chain_rotation() {
        let (mut system, chain, beads) = chain_system();
        let mut tracker = ChainStatisticsTracker::new(chain, 10).unwrap();
        for angle in [0.0, 0.6, 1.2, 1.8] {
            let pose = Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle),
            );
            place(&mut system, &beads, &pose);
            tracker.update(&system).unwrap();
        }
        let clock = ManualClock::new(2.0);
        let tau = tracker.correlation_time(&clock).unwrap();
        assert!((tau - 32.0).abs() < 1e-6);
    }

    #[test]
    fn estimates_are_none_without_enough_samples() {
        let (system, chain, _) = chain_system();
        let mut tracker = ChainStatisticsTracker::new(chain, 1).unwrap();
        let clock = ManualClock::new(1.0);
        assert_eq!(tracker.diffusion_coefficient(&clock), None);
        assert_eq!(tracker.bead_diffusion_coefficients(&clock), None);
        tracker.update(&system).unwrap();
        assert_eq!(tracker.diffusion_coefficient(&clock), None);
        assert_eq!(tracker.correlation_time(&clock), None);

        let snapshot = tracker.snapshot(&system, &clock);
        assert_eq!(snapshot.name, "fg_0");
        assert_eq!(snapshot.n_beads, 3);
        assert_eq!(snapshot.n_samples, 1);

        tracker.reset();
        assert_eq!(tracker.n_samples(), 0);
    }

    #[test]
    fn update_fails_for_missing_chain() {
        let (system, _, _) = chain_system();
        let ghost = ChainId::default();
        let mut tracker = ChainStatisticsTracker::new(ghost, 1).unwrap();
        assert!(matches!(
            tracker.update(&system),
            Err(EngineError::ChainNotFound(id)) if id == ghost
        ));
        assert!(tracker.check(&system).is_err());
        assert_eq!(tracker.n_samples(), 0);
    }

    #[test]
    fn new_rejects_zero_period() {
        let (_, chain, _) = chain_system();
        assert!(matches!(
            ChainStatisticsTracker::new(chain, 0),
            Err(EngineError::Config { .. })
        ));
    }
}
