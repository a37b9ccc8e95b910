use super::accumulator::DerivativeAccumulator;
use super::frames::RigidBodyFrame;
use super::potentials::{self, MIN_SITE_DISTANCE, MIN_SITE_DISTANCE2};
use crate::core::models::body::BodyDerivative;
use crate::core::models::ids::BodyId;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Radial shape of the site-site attraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteShape {
    /// `0.5 k d^2 - 0.5 k range^2`; force grows linearly with displacement.
    Quadratic,
    /// `-k (range - d)`; constant force magnitude `k` inside the range.
    #[default]
    Linear,
}

/// One endpoint of a site pair: the owning body, its cached frame and the site's local offset.
#[derive(Debug, Clone, Copy)]
pub struct SiteRef<'a> {
    pub body: BodyId,
    pub frame: &'a RigidBodyFrame,
    pub local: &'a Vector3<f64>,
}

impl<'a> SiteRef<'a> {
    pub fn new(body: BodyId, frame: &'a RigidBodyFrame, local: &'a Vector3<f64>) -> Self {
        Self { body, frame, local }
    }

    #[inline]
    pub fn world(&self) -> Point3<f64> {
        self.frame.to_world(self.local)
    }
}

/// Site-site attraction with an effective strength and range for one body-type pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SitePotential {
    pub k: f64,
    pub range: f64,
    range2: f64,
    pub shape: SiteShape,
}

impl SitePotential {
    pub fn new(k: f64, range: f64, shape: SiteShape) -> Self {
        Self {
            k,
            range,
            range2: range * range,
            shape,
        }
    }

    #[inline]
    pub fn range2(&self) -> f64 {
        self.range2
    }

    /// Scores one site pair, transforming both sites into world space first.
    ///
    /// # Arguments
    ///
    /// * `site0`, `site1` - The two sites and their bodies' cached frames.
    /// * `da` - If given, receives the score derivative for both bodies.
    ///
    /// # Return
    ///
    /// The site-pair score; zero when the sites are farther apart than the range.
    #[inline]
    pub fn evaluate(
        &self,
        site0: SiteRef<'_>,
        site1: SiteRef<'_>,
        da: Option<&mut DerivativeAccumulator>,
    ) -> f64 {
        let g0 = site0.world();
        let g1 = site1.world();
        self.evaluate_with_world(site0, site1, &g0, &g1, da)
    }

    /// Scores one site pair from pre-computed world coordinates `g0` and `g1`.
    ///
    /// Callers that evaluate many site pairs between the same two bodies transform each
    /// site once and reuse the world coordinates here. Given the same inputs this yields
    /// exactly the score of [`SitePotential::evaluate`].
    #[inline]
    pub fn evaluate_with_world(
        &self,
        site0: SiteRef<'_>,
        site1: SiteRef<'_>,
        g0: &Point3<f64>,
        g1: &Point3<f64>,
        da: Option<&mut DerivativeAccumulator>,
    ) -> f64 {
        let delta = g0 - g1;
        if delta.x.abs() > self.range || delta.y.abs() > self.range || delta.z.abs() > self.range
        {
            return 0.0;
        }
        let distance2 = delta.norm_squared();
        if distance2 > self.range2 {
            return 0.0;
        }

        match self.shape {
            SiteShape::Quadratic => {
                let score = potentials::harmonic_site(self.k, self.range, distance2);
                if let Some(da) = da {
                    if distance2.sqrt() > MIN_SITE_DISTANCE {
                        let gradient = self.k * delta;
                        add_equal_and_opposite(da, site0, site1, &gradient);
                    }
                }
                score
            }
            SiteShape::Linear => {
                if distance2 < MIN_SITE_DISTANCE2 {
                    return -self.k * self.range;
                }
                let distance = distance2.sqrt();
                let score = potentials::linear_site(self.k, self.range, distance);
                if let Some(da) = da {
                    let gradient = (self.k / distance) * delta;
                    add_equal_and_opposite(da, site0, site1, &gradient);
                }
                score
            }
        }
    }

    /// Returns `true` if the two world-space sites lie within the interaction range.
    #[inline]
    pub fn is_within_range(&self, g0: &Point3<f64>, g1: &Point3<f64>) -> bool {
        (g0 - g1).norm_squared() <= self.range2
    }
}

#[inline]
fn add_equal_and_opposite(
    da: &mut DerivativeAccumulator,
    site0: SiteRef<'_>,
    site1: SiteRef<'_>,
    gradient0: &Vector3<f64>,
) {
    let gradient1 = -gradient0;
    da.add(
        site0.body,
        BodyDerivative::at_site(&site0.frame.to_local(gradient0), gradient0, site0.local),
    );
    da.add(
        site1.body,
        BodyDerivative::at_site(&site1.frame.to_local(&gradient1), &gradient1, site1.local),
    );
}
