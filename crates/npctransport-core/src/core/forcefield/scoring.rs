use super::accumulator::DerivativeAccumulator;
use super::frames::{FrameCache, RigidBodyFrame};
use super::params::SimulationParams;
use super::potentials::{self, MIN_CENTER_DISTANCE};
use super::sites::{SitePotential, SiteRef};
use super::term::EnergyTerm;
use crate::core::models::body::{BodyDerivative, RigidBody};
use crate::core::models::ids::{BodyId, BodyTypeId};
use crate::core::models::pair::CandidatePair;
use crate::core::models::system::BodySystem;
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("Body with ID {0:?} not found in the system")]
    BodyNotFound(BodyId),
    #[error("Frame cache built for generations {built:?} but the system is at {current:?}")]
    StaleFrames {
        built: Option<(u64, u64)>,
        current: (u64, u64),
    },
    #[error("No cached frame for body {0:?}")]
    FrameMissing(BodyId),
}

/// Effective potentials for one registered pair of body types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionParams {
    pub site: SitePotential,
    pub nonspecific_k: f64,
    pub nonspecific_range: f64,
}

/// Lookup table from an ordered pair of interned body types to their interaction.
///
/// Every entry is registered under both orders, so lookups never need to normalize
/// the pair.
#[derive(Debug, Clone, Default)]
pub struct InteractionTable {
    entries: HashMap<(BodyTypeId, BodyTypeId), InteractionParams>,
}

impl InteractionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type0: BodyTypeId, type1: BodyTypeId, params: InteractionParams) {
        self.entries.insert((type0, type1), params);
        self.entries.insert((type1, type0), params);
    }

    #[inline]
    pub fn get(&self, type0: BodyTypeId, type1: BodyTypeId) -> Option<&InteractionParams> {
        self.entries.get(&(type0, type1))
    }

    /// Number of registered ordered type pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the table from the configured interactions.
    ///
    /// Effective site values are `base * factor(type0) * factor(type1)`, with the base
    /// taken from the interaction's override or from the globals. The non-specific
    /// attraction always uses the global k and range, unscaled. Interactions whose types
    /// are not instantiated in `system`, or have no configured factors, are skipped.
    pub fn from_params(params: &SimulationParams, system: &BodySystem) -> Self {
        let globals = &params.globals;
        let mut table = Self::new();

        for spec in &params.interactions {
            let (Some(type0), Some(type1)) = (system.type_id(&spec.type0), system.type_id(&spec.type1))
            else {
                debug!(
                    type0 = %spec.type0,
                    type1 = %spec.type1,
                    "Skipping interaction between types without instantiated bodies."
                );
                continue;
            };
            let (Some(f0), Some(f1)) = (params.types.get(&spec.type0), params.types.get(&spec.type1))
            else {
                debug!(
                    type0 = %spec.type0,
                    type1 = %spec.type1,
                    "Skipping interaction between types without configured factors."
                );
                continue;
            };

            let base_k = spec.interaction_k.unwrap_or(globals.interaction_k);
            let base_range = spec.interaction_range.unwrap_or(globals.interaction_range);
            let k_factor = f0.k_factor * f1.k_factor;
            let range_factor = f0.range_factor * f1.range_factor;

            table.insert(
                type0,
                type1,
                InteractionParams {
                    site: SitePotential::new(
                        base_k * k_factor,
                        base_range * range_factor,
                        globals.site_shape,
                    ),
                    nonspecific_k: globals.nonspecific_k,
                    nonspecific_range: globals.nonspecific_range,
                },
            );
        }

        debug!(num_entries = table.len(), "Built interaction table.");
        table
    }
}

/// A membrane slab of `thickness` centered on `z = 0`, pierced by a cylindrical tunnel
/// around the z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slab {
    pub thickness: f64,
    pub tunnel_radius: f64,
}

/// Type-pair interactions plus the whole-system terms applied to every body.
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    pub table: InteractionTable,
    pub excluded_volume_k: f64,
    pub backbone_k: f64,
    pub box_side: Option<f64>,
    pub slab: Option<Slab>,
}

impl ScoringPolicy {
    pub fn from_params(params: &SimulationParams, system: &BodySystem) -> Self {
        let globals = &params.globals;
        Self {
            table: InteractionTable::from_params(params, system),
            excluded_volume_k: globals.excluded_volume_k,
            backbone_k: globals.backbone_k,
            box_side: globals.box_side,
            slab: globals.slab_is_on.then_some(Slab {
                thickness: globals.slab_thickness,
                tunnel_radius: globals.tunnel_radius,
            }),
        }
    }
}

pub struct Scorer<'a> {
    system: &'a BodySystem,
    frames: &'a FrameCache,
    policy: &'a ScoringPolicy,
}

impl<'a> Scorer<'a> {
    /// Creates a scorer over `system` using frames cached for its current poses.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::StaleFrames`] if `frames` was not refreshed for the
    /// current pose and structure generation of `system`.
    pub fn new(
        system: &'a BodySystem,
        frames: &'a FrameCache,
        policy: &'a ScoringPolicy,
    ) -> Result<Self, ScoringError> {
        if !frames.is_current(system) {
            return Err(ScoringError::StaleFrames {
                built: frames.built_for(),
                current: (system.pose_generation(), system.structure_generation()),
            });
        }
        Ok(Self {
            system,
            frames,
            policy,
        })
    }

    fn body(&self, id: BodyId) -> Result<&'a RigidBody, ScoringError> {
        self.system.body(id).ok_or(ScoringError::BodyNotFound(id))
    }

    fn frame(&self, id: BodyId) -> Result<&'a RigidBodyFrame, ScoringError> {
        self.frames.get(id).ok_or(ScoringError::FrameMissing(id))
    }

    /// Scores one candidate pair.
    ///
    /// Excluded volume applies to every pair. Site-site and non-specific terms apply
    /// only when the pair's body types have a registered interaction.
    ///
    /// # Arguments
    ///
    /// * `a`, `b` - The two bodies.
    /// * `da` - If given, receives the derivative of the pair score.
    ///
    /// # Return
    ///
    /// The per-term energy of the pair.
    pub fn score_pair(
        &self,
        a: BodyId,
        b: BodyId,
        mut da: Option<&mut DerivativeAccumulator>,
    ) -> Result<EnergyTerm, ScoringError> {
        let body_a = self.body(a)?;
        let body_b = self.body(b)?;
        let frame_a = self.frame(a)?;
        let frame_b = self.frame(b)?;

        let delta = frame_a.center() - frame_b.center();
        let distance = delta.norm();
        let surface_distance = distance - body_a.radius - body_b.radius;

        let mut term = EnergyTerm::default();
        let (ev_score, ev_slope) =
            potentials::linear_soft_sphere(self.policy.excluded_volume_k, surface_distance);
        term.excluded_volume = ev_score;
        add_center_gradient(da.as_deref_mut(), a, b, &delta, distance, ev_slope);

        let Some(params) = self.policy.table.get(body_a.body_type, body_b.body_type) else {
            return Ok(term);
        };

        let (ns_score, ns_slope) = potentials::linear_attraction(
            params.nonspecific_k,
            params.nonspecific_range,
            surface_distance,
        );
        term.nonspecific = ns_score;
        add_center_gradient(da.as_deref_mut(), a, b, &delta, distance, ns_slope);

        let sites_a = self.system.sites(body_a.body_type);
        let sites_b = self.system.sites(body_b.body_type);
        if sites_a.is_empty() || sites_b.is_empty() {
            return Ok(term);
        }
        let world_b: Vec<Point3<f64>> = sites_b.iter().map(|s| frame_b.to_world(s)).collect();
        for local_a in sites_a {
            let world_a = frame_a.to_world(local_a);
            for (local_b, world_b) in sites_b.iter().zip(&world_b) {
                term.site += params.site.evaluate_with_world(
                    SiteRef::new(a, frame_a, local_a),
                    SiteRef::new(b, frame_b, local_b),
                    &world_a,
                    world_b,
                    da.as_deref_mut(),
                );
            }
        }
        Ok(term)
    }

    /// Counts the site pairs of `a` and `b` lying within the effective site range.
    ///
    /// Pairs whose types have no registered interaction always count zero.
    pub fn site_site_interactions(&self, a: BodyId, b: BodyId) -> Result<usize, ScoringError> {
        let body_a = self.body(a)?;
        let body_b = self.body(b)?;
        let Some(params) = self.policy.table.get(body_a.body_type, body_b.body_type) else {
            return Ok(0);
        };
        let frame_a = self.frame(a)?;
        let frame_b = self.frame(b)?;

        let world_b: Vec<Point3<f64>> = self
            .system
            .sites(body_b.body_type)
            .iter()
            .map(|s| frame_b.to_world(s))
            .collect();
        let count = self
            .system
            .sites(body_a.body_type)
            .iter()
            .map(|s| frame_a.to_world(s))
            .map(|ga| {
                world_b
                    .iter()
                    .filter(|gb| params.site.is_within_range(&ga, gb))
                    .count()
            })
            .sum();
        Ok(count)
    }

    /// Scores every candidate pair and sums the per-pair energies.
    #[instrument(skip_all, name = "score_candidates_task")]
    pub fn score_candidates(
        &self,
        pairs: &[CandidatePair],
        da: Option<&mut DerivativeAccumulator>,
    ) -> Result<EnergyTerm, ScoringError> {
        #[cfg(not(feature = "parallel"))]
        let total = self.score_candidates_serial(pairs, da)?;

        #[cfg(feature = "parallel")]
        let total = self.score_candidates_parallel(pairs, da)?;

        Ok(total)
    }

    #[cfg(not(feature = "parallel"))]
    fn score_candidates_serial(
        &self,
        pairs: &[CandidatePair],
        mut da: Option<&mut DerivativeAccumulator>,
    ) -> Result<EnergyTerm, ScoringError> {
        let mut total = EnergyTerm::default();
        for pair in pairs {
            total += self.score_pair(pair.first, pair.second, da.as_deref_mut())?;
        }
        Ok(total)
    }

    /// Fans the candidate pairs out over the rayon pool. Each worker fills its own
    /// derivative buffer; buffers are merged by reduction and folded into `da` once.
    #[cfg(feature = "parallel")]
    fn score_candidates_parallel(
        &self,
        pairs: &[CandidatePair],
        da: Option<&mut DerivativeAccumulator>,
    ) -> Result<EnergyTerm, ScoringError> {
        let weight = da.as_ref().map(|acc| acc.weight());
        let new_buffer = || weight.map(DerivativeAccumulator::with_weight);

        let (total, partial) = pairs
            .par_iter()
            .try_fold(
                || (EnergyTerm::default(), new_buffer()),
                |(total, mut buffer), pair| {
                    let term = self.score_pair(pair.first, pair.second, buffer.as_mut())?;
                    Ok::<_, ScoringError>((total + term, buffer))
                },
            )
            .try_reduce(
                || (EnergyTerm::default(), new_buffer()),
                |(t0, b0), (t1, b1)| {
                    let merged = match (b0, b1) {
                        (Some(x), Some(y)) => Some(x.merge(y)),
                        (x, None) | (None, x) => x,
                    };
                    Ok((t0 + t1, merged))
                },
            )?;

        if let (Some(da), Some(partial)) = (da, partial) {
            let base = std::mem::take(da);
            *da = base.merge(partial);
        }
        Ok(total)
    }

    /// Scores the backbone bonds of every chain with a linear well around the rest length.
    pub fn score_chains(
        &self,
        mut da: Option<&mut DerivativeAccumulator>,
    ) -> Result<EnergyTerm, ScoringError> {
        let mut term = EnergyTerm::default();
        for (_, chain) in self.system.chains_iter() {
            for (a, b) in chain.bonds() {
                let delta = self.frame(a)?.center() - self.frame(b)?.center();
                let distance = delta.norm();
                let (score, slope) =
                    potentials::linear_well(self.policy.backbone_k, chain.rest_length, distance);
                term.backbone += score;
                add_center_gradient(da.as_deref_mut(), a, b, &delta, distance, slope);
            }
        }
        Ok(term)
    }

    /// Penalizes optimized bodies whose centers lie outside the bounding box.
    pub fn score_boundary(
        &self,
        mut da: Option<&mut DerivativeAccumulator>,
    ) -> Result<EnergyTerm, ScoringError> {
        let mut term = EnergyTerm::default();
        let Some(side) = self.policy.box_side else {
            return Ok(term);
        };
        let half = 0.5 * side;

        for (id, body) in self.system.bodies_iter() {
            if !body.coordinates_optimized {
                continue;
            }
            let center = self.frame(id)?.center().coords;
            let outside = center - center.map(|c| c.clamp(-half, half));
            let excess = outside.norm();
            let (score, slope) = potentials::harmonic_upper_bound(self.policy.excluded_volume_k, excess);
            term.boundary += score;
            if slope > 0.0 {
                if let Some(da) = da.as_deref_mut() {
                    da.add(id, BodyDerivative::at_center(&(outside * (slope / excess))));
                }
            }
        }
        Ok(term)
    }

    /// Keeps optimized bodies out of the slab material with the excluded-volume
    /// repulsion, so that they can only cross it through the tunnel.
    pub fn score_slab(
        &self,
        mut da: Option<&mut DerivativeAccumulator>,
    ) -> Result<EnergyTerm, ScoringError> {
        let mut term = EnergyTerm::default();
        let Some(slab) = self.policy.slab else {
            return Ok(term);
        };

        for (id, body) in self.system.bodies_iter() {
            if !body.coordinates_optimized {
                continue;
            }
            let center = self.frame(id)?.center().coords;
            let (distance, gradient) =
                potentials::slab_signed_distance(&center, slab.thickness, slab.tunnel_radius);
            let (score, slope) =
                potentials::linear_soft_sphere(self.policy.excluded_volume_k, distance - body.radius);
            term.slab += score;
            if slope != 0.0 {
                if let Some(da) = da.as_deref_mut() {
                    da.add(id, BodyDerivative::at_center(&(gradient * slope)));
                }
            }
        }
        Ok(term)
    }

    /// Total score of the system: candidate pairs, chain backbones, the bounding box and
    /// the slab.
    #[instrument(skip_all, name = "evaluate_task")]
    pub fn evaluate(
        &self,
        pairs: &[CandidatePair],
        mut da: Option<&mut DerivativeAccumulator>,
    ) -> Result<EnergyTerm, ScoringError> {
        let candidates = self.score_candidates(pairs, da.as_deref_mut())?;
        let chains = self.score_chains(da.as_deref_mut())?;
        let boundary = self.score_boundary(da.as_deref_mut())?;
        let slab = self.score_slab(da)?;
        let total = candidates + chains + boundary + slab;
        debug!(
            num_pairs = pairs.len(),
            site = total.site,
            nonspecific = total.nonspecific,
            excluded_volume = total.excluded_volume,
            backbone = total.backbone,
            boundary = total.boundary,
            slab = total.slab,
            "Evaluated system score."
        );
        Ok(total)
    }
}

/// Adds a whole-body gradient acting along the center-center axis, `slope` being the
/// derivative of the score with respect to the center distance.
#[inline]
fn add_center_gradient(
    da: Option<&mut DerivativeAccumulator>,
    a: BodyId,
    b: BodyId,
    delta: &Vector3<f64>,
    distance: f64,
    slope: f64,
) {
    let Some(da) = da else { return };
    if slope == 0.0 || distance < MIN_CENTER_DISTANCE {
        return;
    }
    let gradient = delta * (slope / distance);
    da.add(a, BodyDerivative::at_center(&gradient));
    da.add(b, BodyDerivative::at_center(&-gradient));
}
