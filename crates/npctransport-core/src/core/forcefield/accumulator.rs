use crate::core::models::body::BodyDerivative;
use crate::core::models::ids::BodyId;
use crate::core::models::system::BodySystem;
use slotmap::SecondaryMap;

/// Per-body derivative buffers filled during one evaluation pass.
///
/// Evaluators only ever add into an accumulator owned by the caller. Partial
/// accumulators from independent workers are combined with [`DerivativeAccumulator::merge`],
/// and the final buffer is written into the bodies once per step with
/// [`DerivativeAccumulator::apply_to`].
#[derive(Debug, Clone)]
pub struct DerivativeAccumulator {
    buffers: SecondaryMap<BodyId, BodyDerivative>,
    weight: f64,
}

impl Default for DerivativeAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DerivativeAccumulator {
    pub fn new() -> Self {
        Self::with_weight(1.0)
    }

    /// Creates an accumulator that scales every contribution by `weight`.
    pub fn with_weight(weight: f64) -> Self {
        Self {
            buffers: SecondaryMap::new(),
            weight,
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    #[inline]
    pub fn add(&mut self, id: BodyId, derivative: BodyDerivative) {
        let scaled = BodyDerivative::new(
            derivative.translational * self.weight,
            derivative.torque * self.weight,
        );
        match self.buffers.get_mut(id) {
            Some(existing) => *existing += scaled,
            None => {
                self.buffers.insert(id, scaled);
            }
        }
    }

    pub fn get(&self, id: BodyId) -> BodyDerivative {
        self.buffers.get(id).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &BodyDerivative)> {
        self.buffers.iter()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Folds another accumulator's buffers into this one. Contributions in `other`
    /// were already weighted when added.
    pub fn merge(mut self, other: DerivativeAccumulator) -> Self {
        for (id, derivative) in other.buffers {
            match self.buffers.get_mut(id) {
                Some(existing) => *existing += derivative,
                None => {
                    self.buffers.insert(id, derivative);
                }
            }
        }
        self
    }

    /// Adds the buffered derivatives to the bodies of `system`. Buffers for bodies that
    /// no longer exist are ignored.
    pub fn apply_to(&self, system: &mut BodySystem) {
        for (id, derivative) in self.buffers.iter() {
            if let Some(body) = system.body_mut(id) {
                body.derivative += *derivative;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::body::RigidBody;
    use nalgebra::{Point3, Vector3};

    fn two_body_system() -> (BodySystem, BodyId, BodyId) {
        let mut system = BodySystem::new();
        let t = system.intern_type("kap");
        let a = system
            .add_body(RigidBody::new("a", t, Point3::origin(), 1.0))
            .unwrap();
        let b = system
            .add_body(RigidBody::new("b", t, Point3::new(3.0, 0.0, 0.0), 1.0))
            .unwrap();
        (system, a, b)
    }

    #[test]
    fn add_sums_contributions_for_the_same_body() {
        let (_, a, _) = two_body_system();
        let mut acc = DerivativeAccumulator::new();
        acc.add(a, BodyDerivative::at_center(&Vector3::new(1.0, 0.0, 0.0)));
        acc.add(a, BodyDerivative::at_center(&Vector3::new(0.0, 2.0, 0.0)));
        assert_eq!(acc.get(a).translational, Vector3::new(1.0, 2.0, 0.0));
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn weight_scales_every_contribution() {
        let (_, a, _) = two_body_system();
        let mut acc = DerivativeAccumulator::with_weight(0.5);
        acc.add(a, BodyDerivative::new(Vector3::new(2.0, 0.0, 0.0), Vector3::new(0.0, 4.0, 0.0)));
        assert_eq!(acc.get(a).translational, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(acc.get(a).torque, Vector3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn merge_combines_disjoint_and_shared_buffers() {
        let (_, a, b) = two_body_system();
        let mut left = DerivativeAccumulator::new();
        let mut right = DerivativeAccumulator::new();
        left.add(a, BodyDerivative::at_center(&Vector3::new(1.0, 0.0, 0.0)));
        right.add(a, BodyDerivative::at_center(&Vector3::new(1.0, 0.0, 0.0)));
        right.add(b, BodyDerivative::at_center(&Vector3::new(0.0, 0.0, 3.0)));

        let merged = left.merge(right);
        assert_eq!(merged.get(a).translational, Vector3::new(2.0, 0.0, 0.0));
        assert_eq!(merged.get(b).translational, Vector3::new(0.0, 0.0, 3.0));
    }

    #[test]
    fn apply_to_adds_into_body_derivatives() {
        let (mut system, a, b) = two_body_system();
        let mut acc = DerivativeAccumulator::new();
        acc.add(a, BodyDerivative::at_center(&Vector3::new(1.0, 0.0, 0.0)));
        acc.apply_to(&mut system);
        acc.apply_to(&mut system);
        assert_eq!(
            system.body(a).unwrap().derivative().translational,
            Vector3::new(2.0, 0.0, 0.0)
        );
        assert!(system.body(b).unwrap().derivative().is_zero());

        system.clear_derivatives();
        assert!(system.body(a).unwrap().derivative().is_zero());
    }
}
