use super::ids::BodyId;

#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub(crate) bodies: Vec<BodyId>, // Backbone-ordered members of the chain
    pub rest_length: f64,           // Rest length of each backbone bond
}

impl Chain {
    pub(crate) fn new(bodies: Vec<BodyId>, rest_length: f64) -> Self {
        Self {
            bodies,
            rest_length,
        }
    }

    pub fn bodies(&self) -> &[BodyId] {
        &self.bodies
    }

    /// Consecutive (bonded) member pairs, in backbone order.
    pub fn bonds(&self) -> impl Iterator<Item = (BodyId, BodyId)> + '_ {
        self.bodies.windows(2).map(|w| (w[0], w[1]))
    }
}
