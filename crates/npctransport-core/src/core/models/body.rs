use super::ids::BodyTypeId;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use std::ops::{Add, AddAssign, Neg};

/// Gradient of the score with respect to one rigid body's degrees of freedom.
///
/// `translational` is expressed in the global frame; `torque` is expressed in the
/// body's local frame, matching the way site offsets are stored.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyDerivative {
    pub translational: Vector3<f64>,
    pub torque: Vector3<f64>,
}

impl BodyDerivative {
    pub fn new(translational: Vector3<f64>, torque: Vector3<f64>) -> Self {
        Self {
            translational,
            torque,
        }
    }

    /// Derivative contribution of a global-frame gradient applied at a local site offset.
    ///
    /// # Arguments
    ///
    /// * `local_gradient` - The gradient rotated into the body's local frame.
    /// * `global_gradient` - The same gradient in the global frame.
    /// * `local_site` - The site offset in the body's local frame.
    #[inline]
    pub fn at_site(
        local_gradient: &Vector3<f64>,
        global_gradient: &Vector3<f64>,
        local_site: &Vector3<f64>,
    ) -> Self {
        Self {
            translational: *global_gradient,
            torque: local_site.cross(local_gradient),
        }
    }

    /// Derivative contribution of a gradient acting on the body center (no torque).
    #[inline]
    pub fn at_center(global_gradient: &Vector3<f64>) -> Self {
        Self {
            translational: *global_gradient,
            torque: Vector3::zeros(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.translational == Vector3::zeros() && self.torque == Vector3::zeros()
    }
}

impl Add for BodyDerivative {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            translational: self.translational + rhs.translational,
            torque: self.torque + rhs.torque,
        }
    }
}

impl AddAssign for BodyDerivative {
    fn add_assign(&mut self, rhs: Self) {
        self.translational += rhs.translational;
        self.torque += rhs.torque;
    }
}

impl Neg for BodyDerivative {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            translational: -self.translational,
            torque: -self.torque,
        }
    }
}

/// A rigid body tracked by the simulation.
///
/// Bodies own their pose and accumulated derivative. Interaction sites are shared by
/// every body of the same type and live in the owning
/// [`BodySystem`](super::system::BodySystem).
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    /// Human readable name, used in log output.
    pub name: String,
    /// Interned type of the body.
    pub body_type: BodyTypeId,
    /// World transform: rotation followed by translation of the body center.
    pub(crate) pose: Isometry3<f64>,
    /// Gross extent of the body, used by whole-body potentials.
    pub radius: f64,
    /// Whether the stepper moves this body. Anchored bodies are never in group I of
    /// the global candidate set.
    pub coordinates_optimized: bool,
    /// Derivative accumulated from the last merged step.
    pub(crate) derivative: BodyDerivative,
}

impl RigidBody {
    /// Creates a new body at `position` with identity orientation.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the body.
    /// * `body_type` - The interned type of the body.
    /// * `position` - The world position of the body center.
    /// * `radius` - The gross extent of the body.
    pub fn new(name: &str, body_type: BodyTypeId, position: Point3<f64>, radius: f64) -> Self {
        Self {
            name: name.to_string(),
            body_type,
            pose: Isometry3::from_parts(
                Translation3::from(position.coords),
                UnitQuaternion::identity(),
            ),
            radius,
            coordinates_optimized: true,
            derivative: BodyDerivative::default(),
        }
    }

    pub fn with_rotation(mut self, rotation: UnitQuaternion<f64>) -> Self {
        self.pose.rotation = rotation;
        self
    }

    pub fn anchored(mut self) -> Self {
        self.coordinates_optimized = false;
        self
    }

    pub fn pose(&self) -> &Isometry3<f64> {
        &self.pose
    }

    pub fn position(&self) -> Point3<f64> {
        Point3::from(self.pose.translation.vector)
    }

    pub fn rotation(&self) -> &UnitQuaternion<f64> {
        &self.pose.rotation
    }

    pub fn derivative(&self) -> &BodyDerivative {
        &self.derivative
    }
}
