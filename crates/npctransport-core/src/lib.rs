//! # NPC Transport Core Library
//!
//! Site-localized interaction scoring, proximity detection and time-weighted statistics
//! for rigid-body simulations of transport through a nuclear pore channel.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`BodySystem`), pure potentials,
//!   per-step frame caches and the pair `Scorer`.
//!
//! - **[`engine`]: The Logic Core.** Stateful components that live across simulation steps:
//!   the `ProximityDetector` with its slack-amortized candidate set, the contact, channel
//!   crossing, body and chain statistics trackers, their configuration builders and errors.
//!
//! - **[`workflows`]: The Public API.** The per-step entry point that ties frames, candidate
//!   pairs and scoring together for an external stepper.
//!
//! The library never drives the simulation itself. The stepper owns the clock, moves the
//! bodies and calls into the library once per step.

pub mod core;
pub mod engine;
pub mod workflows;
