//! # Core Module
//!
//! This module provides the stateless building blocks of the transport simulation core:
//! the body arena and the scoring functions evaluated over it.
//!
//! ## Architecture
//!
//! - **Body Representation** ([`models`]) - Rigid bodies, interned types, per-type sites and chains
//! - **Scoring** ([`forcefield`]) - Parameters, potentials, cached frames and the pair scorer
//!
//! Nothing in this layer keeps state across simulation steps except the explicit caches
//! ([`forcefield::frames::FrameCache`]) whose validity is checked against the generation
//! counters of the [`models::system::BodySystem`].

pub mod forcefield;
pub mod models;
