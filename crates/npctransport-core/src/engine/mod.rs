//! # Engine Module
//!
//! Stateful components that live across simulation steps: the proximity detector with
//! its slack-amortized candidate set, the statistics trackers, and the configuration and
//! error types they share.
//!
//! ## Overview
//!
//! The core layer answers "what is the energy of this configuration". The engine layer
//! remembers: which pairs were close at the last rebuild, which pairs were in contact
//! at the last update, and how long each population has existed. None of it drives the
//! simulation; the stepper owns the clock and calls in once per step or sampling period.
//!
//! ## Architecture
//!
//! - **Proximity** ([`proximity`]) - Candidate pairs within range plus slack between two body groups
//! - **Statistics** ([`stats`]) - Contact, channel crossing, body and chain statistics trackers
//! - **Clock** ([`clock`]) - The time source trackers read from the stepper
//! - **Configuration** ([`config`]) - Tracker builders and parameter checks
//! - **Error Handling** ([`error`]) - Engine-level error types wrapping lower layers

pub mod clock;
pub mod config;
pub mod error;
pub mod proximity;
pub mod stats;
