//! # Core Models Module
//!
//! This module contains the data structures used to represent the bodies of a
//! particle-based transport simulation.
//!
//! ## Overview
//!
//! Bodies live in a single arena, [`system::BodySystem`], and every other component
//! addresses them through stable [`ids::BodyId`] handles. Interaction sites are small
//! per-type tables of body-local offsets, and chains record the backbone topology
//! whose bonded neighbors are excluded from contact detection.
//!
//! ## Key Components
//!
//! - [`body`] - Rigid body records and their accumulated derivatives
//! - [`chain`] - Backbone-ordered chains of bonded bodies
//! - [`system`] - The body arena, interned types, per-type sites and generation counters
//! - [`ids`] - Handle types for bodies, chains and body types
//! - [`pair`] - Candidate body pairs produced by proximity detection
//!
//! ## Usage
//!
//! ```ignore
//! use npctransport::core::models::{body::RigidBody, system::BodySystem};
//!
//! let mut system = BodySystem::new();
//! let kap = system.intern_type("kap");
//! system.set_type_sites(kap, vec![Vector3::new(1.0, 0.0, 0.0)])?;
//! let id = system.add_body(RigidBody::new("kap_0", kap, Point3::origin(), 2.0))?;
//! ```

pub mod body;
pub mod chain;
pub mod ids;
pub mod pair;
pub mod system;
