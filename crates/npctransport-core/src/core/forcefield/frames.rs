use crate::core::models::body::RigidBody;
use crate::core::models::ids::BodyId;
use crate::core::models::system::BodySystem;
use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use slotmap::SecondaryMap;
use tracing::trace;

/// Cached world transform of one rigid body, together with its inverse rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidBodyFrame {
    pub transform: Isometry3<f64>,
    pub inverse_rotation: UnitQuaternion<f64>,
}

impl RigidBodyFrame {
    pub fn from_pose(pose: &Isometry3<f64>) -> Self {
        Self {
            transform: *pose,
            inverse_rotation: pose.rotation.inverse(),
        }
    }

    pub fn of(body: &RigidBody) -> Self {
        Self::from_pose(body.pose())
    }

    #[inline]
    pub fn rotation(&self) -> &UnitQuaternion<f64> {
        &self.transform.rotation
    }

    #[inline]
    pub fn center(&self) -> Point3<f64> {
        Point3::from(self.transform.translation.vector)
    }

    /// Maps a body-local site offset to world coordinates.
    #[inline]
    pub fn to_world(&self, local: &Vector3<f64>) -> Point3<f64> {
        self.transform.transform_point(&Point3::from(*local))
    }

    /// Rotates a global-frame vector into the body-local frame.
    #[inline]
    pub fn to_local(&self, global: &Vector3<f64>) -> Vector3<f64> {
        self.inverse_rotation * global
    }
}

/// Per-step cache of [`RigidBodyFrame`]s, keyed by body handle.
///
/// The cache remembers the pose generation of the system it was built from. Consumers
/// must call [`FrameCache::refresh`] once per step before evaluating any site pair;
/// [`FrameCache::is_current`] reports whether the cached frames still describe the
/// system.
#[derive(Debug, Clone, Default)]
pub struct FrameCache {
    frames: SecondaryMap<BodyId, RigidBodyFrame>,
    built_for: Option<(u64, u64)>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(system: &BodySystem) -> Self {
        let mut cache = Self::new();
        cache.rebuild(system);
        cache
    }

    /// Rebuilds the cache if the system's poses or structure changed since the last build.
    ///
    /// # Return
    ///
    /// Returns `true` if the frames were recomputed.
    pub fn refresh(&mut self, system: &BodySystem) -> bool {
        if self.is_current(system) {
            return false;
        }
        self.rebuild(system);
        true
    }

    fn rebuild(&mut self, system: &BodySystem) {
        self.frames.clear();
        for (id, body) in system.bodies_iter() {
            self.frames.insert(id, RigidBodyFrame::of(body));
        }
        self.built_for = Some(generations(system));
        trace!(num_frames = self.frames.len(), "Rebuilt rigid body frame cache.");
    }

    pub fn is_current(&self, system: &BodySystem) -> bool {
        self.built_for == Some(generations(system))
    }

    pub fn get(&self, id: BodyId) -> Option<&RigidBodyFrame> {
        self.frames.get(id)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn built_for(&self) -> Option<(u64, u64)> {
        self.built_for
    }
}

fn generations(system: &BodySystem) -> (u64, u64) {
    (system.pose_generation(), system.structure_generation())
}
