use super::body::{BodyDerivative, RigidBody};
use super::chain::Chain;
use super::ids::{BodyId, BodyTypeId, ChainId};
use nalgebra::{Isometry3, Point3, Vector3};
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Body with ID {0:?} not found in the system")]
    BodyNotFound(BodyId),
    #[error("Body type {0:?} has not been interned")]
    UnknownType(BodyTypeId),
    #[error("Chain rest length must be positive, got {0}")]
    InvalidRestLength(f64),
    #[error("Cannot create a chain without bodies")]
    EmptyChain,
    #[error("Body {0:?} already belongs to a chain")]
    AlreadyChained(BodyId),
    #[error("Body {0:?} appears more than once in the same chain")]
    RepeatedChainMember(BodyId),
}

/// Arena of rigid bodies, their types, interaction sites and chain topology.
///
/// The system is the single owner of every body; all other components address bodies
/// through [`BodyId`] handles. Two generation counters let caches detect when they
/// were built for an outdated system:
///
/// - the *pose generation* is bumped by every pose mutation, and
/// - the *structure generation* is bumped whenever bodies, sites or chains are added.
#[derive(Debug, Clone, Default)]
pub struct BodySystem {
    /// Primary storage for bodies using a slot map for stable handles.
    bodies: SlotMap<BodyId, RigidBody>,
    /// Interned type names, indexed by [`BodyTypeId`].
    type_names: Vec<String>,
    /// Reverse lookup from type name to interned identifier.
    type_index: HashMap<String, BodyTypeId>,
    /// Local site offsets shared by all bodies of a type, indexed by [`BodyTypeId`].
    type_sites: Vec<Vec<Vector3<f64>>>,
    /// Primary storage for chains.
    chains: SlotMap<ChainId, Chain>,
    /// Chain membership of each chained body: owning chain and position along it.
    chain_membership: SecondaryMap<BodyId, (ChainId, usize)>,
    pose_generation: u64,
    structure_generation: u64,
}

impl BodySystem {
    /// Creates a new, empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a body type name, returning the existing identifier if already known.
    ///
    /// # Arguments
    ///
    /// * `name` - The type name (e.g. `"fg0"`, `"kap20"`).
    ///
    /// # Return
    ///
    /// The interned [`BodyTypeId`].
    pub fn intern_type(&mut self, name: &str) -> BodyTypeId {
        if let Some(&id) = self.type_index.get(name) {
            return id;
        }
        let id = BodyTypeId(self.type_names.len() as u32);
        self.type_names.push(name.to_string());
        self.type_sites.push(Vec::new());
        self.type_index.insert(name.to_string(), id);
        self.structure_generation += 1;
        id
    }

    pub fn type_id(&self, name: &str) -> Option<BodyTypeId> {
        self.type_index.get(name).copied()
    }

    pub fn type_name(&self, id: BodyTypeId) -> Option<&str> {
        self.type_names.get(id.index()).map(String::as_str)
    }

    pub fn type_count(&self) -> usize {
        self.type_names.len()
    }

    /// Replaces the interaction sites of a body type.
    ///
    /// # Arguments
    ///
    /// * `body_type` - The type whose sites are set.
    /// * `sites` - Site offsets in the body-local frame.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownType`] if the type was never interned.
    pub fn set_type_sites(
        &mut self,
        body_type: BodyTypeId,
        sites: Vec<Vector3<f64>>,
    ) -> Result<(), ModelError> {
        let slot = self
            .type_sites
            .get_mut(body_type.index())
            .ok_or(ModelError::UnknownType(body_type))?;
        *slot = sites;
        self.structure_generation += 1;
        Ok(())
    }

    /// Returns the local site offsets of a body type (empty for unknown types).
    pub fn sites(&self, body_type: BodyTypeId) -> &[Vector3<f64>] {
        self.type_sites
            .get(body_type.index())
            .map_or([].as_slice(), |v| v.as_slice())
    }

    /// Returns the local site offsets of the given body.
    pub fn body_sites(&self, id: BodyId) -> Option<&[Vector3<f64>]> {
        self.bodies.get(id).map(|b| self.sites(b.body_type))
    }

    /// Adds a body to the arena.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownType`] if the body's type was never interned.
    pub fn add_body(&mut self, body: RigidBody) -> Result<BodyId, ModelError> {
        if body.body_type.index() >= self.type_names.len() {
            return Err(ModelError::UnknownType(body.body_type));
        }
        self.structure_generation += 1;
        Ok(self.bodies.insert(body))
    }

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    pub(crate) fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id)
    }

    pub fn bodies_iter(&self) -> impl Iterator<Item = (BodyId, &RigidBody)> {
        self.bodies.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Returns all bodies of the given type, in arena order.
    pub fn bodies_of_type(&self, body_type: BodyTypeId) -> Vec<BodyId> {
        self.bodies
            .iter()
            .filter(|(_, b)| b.body_type == body_type)
            .map(|(id, _)| id)
            .collect()
    }

    /// Replaces the world pose of a body and bumps the pose generation.
    pub fn set_pose(&mut self, id: BodyId, pose: Isometry3<f64>) -> Result<(), ModelError> {
        let body = self.bodies.get_mut(id).ok_or(ModelError::BodyNotFound(id))?;
        body.pose = pose;
        self.pose_generation += 1;
        Ok(())
    }

    /// Moves a body center to `position`, keeping its orientation.
    pub fn set_position(&mut self, id: BodyId, position: Point3<f64>) -> Result<(), ModelError> {
        let body = self.bodies.get_mut(id).ok_or(ModelError::BodyNotFound(id))?;
        body.pose.translation.vector = position.coords;
        self.pose_generation += 1;
        Ok(())
    }

    /// Translates a body center by `displacement`.
    pub fn translate(&mut self, id: BodyId, displacement: Vector3<f64>) -> Result<(), ModelError> {
        let body = self.bodies.get_mut(id).ok_or(ModelError::BodyNotFound(id))?;
        body.pose.translation.vector += displacement;
        self.pose_generation += 1;
        Ok(())
    }

    pub fn pose_generation(&self) -> u64 {
        self.pose_generation
    }

    pub fn structure_generation(&self) -> u64 {
        self.structure_generation
    }

    /// Creates a chain from consecutive bodies joined by backbone bonds.
    ///
    /// Consecutive chain members are bonded to each other and are never reported as
    /// candidate pairs by filters built from this topology.
    ///
    /// # Arguments
    ///
    /// * `bodies` - Chain members, in backbone order.
    /// * `rest_length` - Rest length of every backbone bond.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyChain`], [`ModelError::InvalidRestLength`],
    /// [`ModelError::BodyNotFound`], [`ModelError::AlreadyChained`] or
    /// [`ModelError::RepeatedChainMember`]. The system is unchanged on error.
    pub fn add_chain(&mut self, bodies: &[BodyId], rest_length: f64) -> Result<ChainId, ModelError> {
        if bodies.is_empty() {
            return Err(ModelError::EmptyChain);
        }
        if rest_length.is_nan() || rest_length <= 0.0 {
            return Err(ModelError::InvalidRestLength(rest_length));
        }
        let mut seen = HashSet::with_capacity(bodies.len());
        for &id in bodies {
            if !self.bodies.contains_key(id) {
                return Err(ModelError::BodyNotFound(id));
            }
            if self.chain_membership.contains_key(id) {
                return Err(ModelError::AlreadyChained(id));
            }
            if !seen.insert(id) {
                return Err(ModelError::RepeatedChainMember(id));
            }
        }

        let chain_id = self.chains.insert(Chain::new(bodies.to_vec(), rest_length));
        for (position, &id) in bodies.iter().enumerate() {
            self.chain_membership.insert(id, (chain_id, position));
        }
        self.structure_generation += 1;
        Ok(chain_id)
    }

    pub fn chain(&self, id: ChainId) -> Option<&Chain> {
        self.chains.get(id)
    }

    pub fn chains_iter(&self) -> impl Iterator<Item = (ChainId, &Chain)> {
        self.chains.iter()
    }

    /// Returns `true` if `a` and `b` are consecutive members of the same chain.
    pub fn are_chain_neighbors(&self, a: BodyId, b: BodyId) -> bool {
        match (self.chain_membership.get(a), self.chain_membership.get(b)) {
            (Some(&(chain_a, pos_a)), Some(&(chain_b, pos_b))) => {
                chain_a == chain_b && pos_a.abs_diff(pos_b) == 1
            }
            _ => false,
        }
    }

    /// Resets the accumulated derivative of every body to zero.
    pub fn clear_derivatives(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.derivative = BodyDerivative::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    fn system_with_three_bodies() -> (BodySystem, BodyTypeId, Vec<BodyId>) {
        let mut system = BodySystem::new();
        let fg = system.intern_type("fg0");
        let ids = (0..3)
            .map(|i| {
                system
                    .add_body(RigidBody::new(
                        &format!("fg0_{i}"),
                        fg,
                        Point3::new(i as f64 * 2.0, 0.0, 0.0),
                        1.0,
                    ))
                    .unwrap()
            })
            .collect();
        (system, fg, ids)
    }

    #[test]
    fn intern_type_returns_same_id_for_same_name() {
        let mut system = BodySystem::new();
        let a = system.intern_type("kap");
        let b = system.intern_type("kap");
        let c = system.intern_type("inert");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(system.type_name(c), Some("inert"));
        assert_eq!(system.type_id("kap"), Some(a));
        assert_eq!(system.type_count(), 2);
    }

    #[test]
    fn add_body_rejects_unknown_type() {
        let mut system = BodySystem::new();
        let body = RigidBody::new("ghost", BodyTypeId(7), Point3::origin(), 1.0);
        assert_eq!(
            system.add_body(body),
            Err(ModelError::UnknownType(BodyTypeId(7)))
        );
    }

    #[test]
    fn sites_are_shared_by_type() {
        let (mut system, fg, ids) = system_with_three_bodies();
        system
            .set_type_sites(fg, vec![Vector3::new(1.0, 0.0, 0.0)])
            .unwrap();
        assert_eq!(system.body_sites(ids[2]).unwrap().len(), 1);
        assert!(system.sites(BodyTypeId(99)).is_empty());
    }

    #[test]
    fn pose_mutations_bump_pose_generation_only() {
        let (mut system, _, ids) = system_with_three_bodies();
        let structure = system.structure_generation();
        let pose = system.pose_generation();

        system.translate(ids[0], Vector3::new(0.5, 0.0, 0.0)).unwrap();
        system
            .set_pose(
                ids[1],
                Isometry3::from_parts(Translation3::new(9.0, 0.0, 0.0), UnitQuaternion::identity()),
            )
            .unwrap();

        assert_eq!(system.pose_generation(), pose + 2);
        assert_eq!(system.structure_generation(), structure);
        assert_eq!(system.body(ids[0]).unwrap().position(), Point3::new(0.5, 0.0, 0.0));
        assert_eq!(system.body(ids[1]).unwrap().position(), Point3::new(9.0, 0.0, 0.0));
    }

    #[test]
    fn chain_neighbors_are_consecutive_members_only() {
        let (mut system, _, ids) = system_with_three_bodies();
        system.add_chain(&ids, 2.0).unwrap();
        assert!(system.are_chain_neighbors(ids[0], ids[1]));
        assert!(system.are_chain_neighbors(ids[2], ids[1]));
        assert!(!system.are_chain_neighbors(ids[0], ids[2]));
        assert!(!system.are_chain_neighbors(ids[0], ids[0]));
    }

    #[test]
    fn add_chain_rejects_non_positive_rest_length() {
        let (mut system, _, ids) = system_with_three_bodies();
        assert_eq!(
            system.add_chain(&ids, -1.0),
            Err(ModelError::InvalidRestLength(-1.0))
        );
        assert_eq!(
            system.add_chain(&ids, 0.0),
            Err(ModelError::InvalidRestLength(0.0))
        );
    }

    #[test]
    fn add_chain_rejects_empty_and_double_membership() {
        let (mut system, _, ids) = system_with_three_bodies();
        assert_eq!(system.add_chain(&[], 1.0), Err(ModelError::EmptyChain));
        system.add_chain(&ids[..2], 1.0).unwrap();
        assert_eq!(
            system.add_chain(&ids[1..], 1.0),
            Err(ModelError::AlreadyChained(ids[1]))
        );
    }

    #[test]
    fn add_chain_rejects_repeated_members() {
        let (mut system, _, ids) = system_with_three_bodies();
        let structure = system.structure_generation();
        assert_eq!(
            system.add_chain(&[ids[0], ids[0]], 1.0),
            Err(ModelError::RepeatedChainMember(ids[0]))
        );
        assert_eq!(
            system.add_chain(&[ids[0], ids[1], ids[0]], 1.0),
            Err(ModelError::RepeatedChainMember(ids[0]))
        );
        assert_eq!(system.structure_generation(), structure);
        assert_eq!(system.chains_iter().count(), 0);

        system.add_chain(&ids, 1.0).unwrap();
        assert!(system.are_chain_neighbors(ids[0], ids[1]));
    }

    #[test]
    fn set_pose_fails_for_missing_body() {
        let mut system = BodySystem::new();
        let missing = BodyId::default();
        assert_eq!(
            system.set_position(missing, Point3::origin()),
            Err(ModelError::BodyNotFound(missing))
        );
    }
}
