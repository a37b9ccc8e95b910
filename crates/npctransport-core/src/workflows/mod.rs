//! # Workflows Module
//!
//! High-level entry points for an external stepper.
//!
//! ## Overview
//!
//! A stepper moves the bodies and owns the clock. Once per step it asks a
//! [`step::StepContext`] for the score and derivatives of the current configuration,
//! merges the derivatives into the bodies, and, every sampling period, hands the same
//! context's scorer to the statistics trackers.
//!
//! ## Usage
//!
//! ```ignore
//! let params = SimulationParams::load(Path::new("npc.toml"))?;
//! let mut context = StepContext::new(params, &system)?;
//!
//! let mut da = DerivativeAccumulator::new();
//! let energy = context.evaluate(&system, Some(&mut da))?;
//! system.clear_derivatives();
//! StepContext::apply(&mut system, &da);
//!
//! statistics.update(&system, &context.scorer(&system)?, &clock)?;
//! ```

pub mod step;
