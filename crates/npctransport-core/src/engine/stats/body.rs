use crate::core::models::ids::BodyId;
use crate::core::models::system::BodySystem;
use crate::engine::clock::SimulationClock;
use crate::engine::config::require_positive;
use crate::engine::error::EngineError;
use nalgebra::{Isometry3, Vector3};
use serde::Serialize;

/// Rotation angle, in radians, past which a body counts as decorrelated.
const DECORRELATION_ANGLE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyStatisticsSnapshot {
    pub name: String,
    pub n_samples: usize,
    pub diffusion_coefficient: Option<f64>,
    pub correlation_time: Option<f64>,
}

/// Samples the pose of one body every `period` steps and estimates its translational
/// diffusion coefficient and rotational correlation time.
#[derive(Debug, Clone)]
pub struct BodyStatisticsTracker {
    body: BodyId,
    period: usize,
    poses: Vec<Isometry3<f64>>,
}

impl BodyStatisticsTracker {
    /// `period` is the number of simulation steps between two updates.
    pub fn new(body: BodyId, period: usize) -> Result<Self, EngineError> {
        require_positive("period", period as f64)?;
        Ok(Self {
            body,
            period,
            poses: Vec::new(),
        })
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn n_samples(&self) -> usize {
        self.poses.len()
    }

    pub fn update(&mut self, system: &BodySystem) -> Result<(), EngineError> {
        let body = system
            .body(self.body)
            .ok_or(EngineError::BodyNotFound(self.body))?;
        self.poses.push(*body.pose());
        Ok(())
    }

    pub fn reset(&mut self) {
        self.poses.clear();
    }

    fn sample_interval(&self, clock: &impl SimulationClock) -> f64 {
        self.period as f64 * clock.maximum_time_step()
    }

    /// Mean squared displacement between consecutive samples over `6 * interval`.
    ///
    /// Returns `None` with fewer than two samples or a non-positive time step.
    pub fn diffusion_coefficient(&self, clock: &impl SimulationClock) -> Option<f64> {
        let displacements: Vec<Vector3<f64>> = self
            .poses
            .windows(2)
            .map(|w| w[1].translation.vector - w[0].translation.vector)
            .collect();
        diffusion_coefficient(&displacements, self.sample_interval(clock))
    }

    /// Mean time for the body to rotate past one radian from each sample, interpolated
    /// linearly within the crossing interval.
    ///
    /// Returns `None` when no sample is ever followed by such a rotation.
    pub fn correlation_time(&self, clock: &impl SimulationClock) -> Option<f64> {
        decorrelation_time(self.poses.len(), self.sample_interval(clock), |i, j| {
            Some((self.poses[j].rotation * self.poses[i].rotation.inverse()).angle())
        })
    }

    /// Fails if the tracked body is no longer in `system`.
    pub fn check(&self, system: &BodySystem) -> Result<(), EngineError> {
        system
            .body(self.body)
            .map(|_| ())
            .ok_or(EngineError::BodyNotFound(self.body))
    }

    pub fn snapshot(
        &self,
        system: &BodySystem,
        clock: &impl SimulationClock,
    ) -> BodyStatisticsSnapshot {
        BodyStatisticsSnapshot {
            name: system
                .body(self.body)
                .map_or_else(|| format!("{:?}", self.body), |b| b.name.clone()),
            n_samples: self.poses.len(),
            diffusion_coefficient: self.diffusion_coefficient(clock),
            correlation_time: self.correlation_time(clock),
        }
    }
}

/// Translational diffusion coefficient from displacements sampled `interval` apart.
pub(super) fn diffusion_coefficient(displacements: &[Vector3<f64>], interval: f64) -> Option<f64> {
    if displacements.is_empty() || interval <= 0.0 {
        return None;
    }
    let msd = displacements.iter().map(|d| d.norm_squared()).sum::<f64>() / displacements.len() as f64;
    Some(msd / (6.0 * interval))
}

/// Mean time for an orientation sampled every `interval` to rotate past
/// [`DECORRELATION_ANGLE`], where `angle_between(i, j)` is the rotation angle from
/// sample `i` to a later sample `j`.
pub(super) fn decorrelation_time(
    n_samples: usize,
    interval: f64,
    angle_between: impl Fn(usize, usize) -> Option<f64>,
) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0usize;
    for i in 0..n_samples {
        let mut last = 0.0;
        for j in i + 1..n_samples {
            let Some(angle) = angle_between(i, j) else {
                break;
            };
            if angle > DECORRELATION_ANGLE {
                sum += interval * ((j - i - 1) as f64 + (angle - last));
                n += 1;
                break;
            }
            last = angle;
        }
    }
    (n > 0).then(|| sum / n as f64)
}
