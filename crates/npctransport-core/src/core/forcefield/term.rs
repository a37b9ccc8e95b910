use serde::Serialize;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Per-term breakdown of a score. Build values with a struct literal and
/// `..Default::default()` for the terms that do not apply.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EnergyTerm {
    pub site: f64,
    pub nonspecific: f64,
    pub excluded_volume: f64,
    pub backbone: f64,
    pub boundary: f64,
    pub slab: f64,
}

impl EnergyTerm {
    #[inline]
    pub fn total(&self) -> f64 {
        self.site
            + self.nonspecific
            + self.excluded_volume
            + self.backbone
            + self.boundary
            + self.slab
    }
}

impl Add for EnergyTerm {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            site: self.site + rhs.site,
            nonspecific: self.nonspecific + rhs.nonspecific,
            excluded_volume: self.excluded_volume + rhs.excluded_volume,
            backbone: self.backbone + rhs.backbone,
            boundary: self.boundary + rhs.boundary,
            slab: self.slab + rhs.slab,
        }
    }
}

impl AddAssign for EnergyTerm {
    fn add_assign(&mut self, rhs: Self) {
        self.site += rhs.site;
        self.nonspecific += rhs.nonspecific;
        self.excluded_volume += rhs.excluded_volume;
        self.backbone += rhs.backbone;
        self.boundary += rhs.boundary;
        self.slab += rhs.slab;
    }
}

impl Sum for EnergyTerm {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, term| acc + term)
    }
}
