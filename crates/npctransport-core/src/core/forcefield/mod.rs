//! # Force Field Module
//!
//! This module provides the scoring functions of the transport simulation: site-site
//! attraction between rigid bodies, whole-body non-specific attraction, excluded volume,
//! chain backbone bonds, the bounding box and the membrane slab.
//!
//! ## Overview
//!
//! Scores are evaluated over candidate body pairs. Each rigid body's world transform is
//! cached once per step in a [`frames::FrameCache`]; site offsets stored in the body's
//! local frame are transformed through it, and the resulting gradients are converted
//! back into translational and rotational derivatives of each body. Derivatives are never
//! written into bodies directly: evaluators add them into a caller-owned
//! [`accumulator::DerivativeAccumulator`] that is merged into the bodies once per step.
//!
//! - **Site-site interactions** with quadratic or linear radial shapes
//! - **Non-specific attraction** between body surfaces for registered type pairs
//! - **Excluded volume** as a linear soft-sphere repulsion for every candidate pair
//! - **Backbone bonds** as linear wells around the chain rest length
//! - **Slab** as an excluded-volume repulsion from a membrane pierced by a tunnel
//!
//! ## Key Components
//!
//! - [`params`] - Simulation parameters loaded from TOML (and CSV type factors)
//! - [`sites`] - The site-pair potential and its derivative propagation
//! - [`scoring`] - The interaction table and the [`scoring::Scorer`]
//! - [`term`] - Per-term energy aggregation
//!
//! ## Usage
//!
//! ```ignore
//! use npctransport::core::forcefield::scoring::{Scorer, ScoringPolicy};
//!
//! let policy = ScoringPolicy::from_params(&params, &system);
//! let frames = FrameCache::build(&system);
//! let scorer = Scorer::new(&system, &frames, &policy)?;
//! let energy = scorer.evaluate(&candidate_pairs, Some(&mut accumulator))?;
//! ```

pub mod accumulator;
pub mod frames;
pub mod params;
pub(crate) mod potentials;
pub mod scoring;
pub mod sites;
pub mod term;
