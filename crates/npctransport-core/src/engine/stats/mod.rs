//! # Statistics Module
//!
//! Time-weighted statistics collected while a simulation runs. Each tracker is owned
//! exclusively, updated by the host once per sampling interval, and reset between
//! equilibration and production runs.
//!
//! ## Key Components
//!
//! - [`average`]: The weighted running average used by every rate and fraction.
//! - [`contacts`]: Contact counts and on/off rates between two body groups.
//! - [`transport`]: Directional crossings of a channel between two heights.
//! - [`body`]: Diffusion coefficient and rotational correlation time of single bodies.
//! - [`chain`]: The same estimates for whole chains, plus per-bead diffusion.
//! - [`Statistics`]: Owns any number of the above and produces a serializable report.

pub mod average;
pub mod body;
pub mod chain;
pub mod contacts;
pub mod transport;

use self::body::{BodyStatisticsSnapshot, BodyStatisticsTracker};
use self::chain::{ChainStatisticsSnapshot, ChainStatisticsTracker};
use self::contacts::{ContactStatisticsSnapshot, ContactStatisticsTracker, SiteContactCounter};
use self::transport::{ChannelCrossingSnapshot, ChannelCrossingTracker};
use crate::core::models::system::BodySystem;
use crate::engine::clock::SimulationClock;
use crate::engine::error::EngineError;
use serde::Serialize;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsReport {
    pub time_ns: f64,
    pub contacts: Vec<ContactStatisticsSnapshot>,
    pub channels: Vec<ChannelCrossingSnapshot>,
    pub bodies: Vec<BodyStatisticsSnapshot>,
    pub chains: Vec<ChainStatisticsSnapshot>,
}

#[derive(Default)]
pub struct Statistics {
    contacts: Vec<ContactStatisticsTracker>,
    channels: Vec<ChannelCrossingTracker>,
    bodies: Vec<BodyStatisticsTracker>,
    chains: Vec<ChainStatisticsTracker>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_contact_tracker(&mut self, tracker: ContactStatisticsTracker) {
        self.contacts.push(tracker);
    }

    pub fn add_channel_tracker(&mut self, tracker: ChannelCrossingTracker) {
        self.channels.push(tracker);
    }

    pub fn add_body_tracker(&mut self, tracker: BodyStatisticsTracker) {
        self.bodies.push(tracker);
    }

    pub fn add_chain_tracker(&mut self, tracker: ChainStatisticsTracker) {
        self.chains.push(tracker);
    }

    pub fn contact_trackers(&self) -> &[ContactStatisticsTracker] {
        &self.contacts
    }

    pub fn channel_trackers(&self) -> &[ChannelCrossingTracker] {
        &self.channels
    }

    pub fn body_trackers(&self) -> &[BodyStatisticsTracker] {
        &self.bodies
    }

    pub fn chain_trackers(&self) -> &[ChainStatisticsTracker] {
        &self.chains
    }

    /// Updates every tracker once.
    ///
    /// Either every tracker is updated or, on error, none of them records anything:
    /// contact updates are computed and every other tracker is checked against `system`
    /// before any of them is applied.
    #[instrument(skip_all, name = "statistics_update_task")]
    pub fn update(
        &mut self,
        system: &BodySystem,
        counter: &impl SiteContactCounter,
        clock: &impl SimulationClock,
    ) -> Result<(), EngineError> {
        let pending = self
            .contacts
            .iter_mut()
            .map(|tracker| tracker.prepare(system, counter, clock))
            .collect::<Result<Vec<_>, _>>()?;
        for tracker in &self.channels {
            tracker.check(system)?;
        }
        for tracker in &self.bodies {
            tracker.check(system)?;
        }
        for tracker in &self.chains {
            tracker.check(system)?;
        }

        for (tracker, update) in self.contacts.iter_mut().zip(pending) {
            tracker.commit(update);
        }
        for tracker in &mut self.channels {
            tracker.update(system, clock)?;
        }
        for tracker in &mut self.bodies {
            tracker.update(system)?;
        }
        for tracker in &mut self.chains {
            tracker.update(system)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.contacts.iter_mut().for_each(ContactStatisticsTracker::reset);
        self.channels.iter_mut().for_each(ChannelCrossingTracker::reset);
        self.bodies.iter_mut().for_each(BodyStatisticsTracker::reset);
        self.chains.iter_mut().for_each(ChainStatisticsTracker::reset);
        info!(
            num_contact_trackers = self.contacts.len(),
            num_channel_trackers = self.channels.len(),
            num_body_trackers = self.bodies.len(),
            num_chain_trackers = self.chains.len(),
            "Reset all statistics."
        );
    }

    pub fn report(&self, system: &BodySystem, clock: &impl SimulationClock) -> StatisticsReport {
        StatisticsReport {
            time_ns: clock.current_time_ns(),
            contacts: self.contacts.iter().map(|t| t.snapshot()).collect(),
            channels: self.channels.iter().map(|t| t.snapshot(system)).collect(),
            bodies: self
                .bodies
                .iter()
                .map(|t| t.snapshot(system, clock))
                .collect(),
            chains: self
                .chains
                .iter()
                .map(|t| t.snapshot(system, clock))
                .collect(),
        }
    }
}
