use super::ids::BodyId;

/// A body pair selected for interaction scoring.
///
/// `first` belongs to group I and `second` to group II of the detector that produced
/// the pair; `range` is the center distance cutoff (range plus slack) it was selected with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePair {
    pub first: BodyId,
    pub second: BodyId,
    pub range: f64,
}

impl CandidatePair {
    pub fn new(first: BodyId, second: BodyId, range: f64) -> Self {
        Self {
            first,
            second,
            range,
        }
    }

    /// Order-independent identity of the pair, smaller handle first.
    #[inline]
    pub fn key(&self) -> (BodyId, BodyId) {
        unordered(self.first, self.second)
    }
}

#[inline]
pub fn unordered(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
    if a <= b { (a, b) } else { (b, a) }
}
