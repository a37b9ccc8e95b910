use super::average::WeightedAverage;
use crate::core::forcefield::scoring::{Scorer, ScoringError};
use crate::core::models::ids::BodyId;
use crate::core::models::system::BodySystem;
use crate::engine::clock::SimulationClock;
use crate::engine::config::{ConfigError, ContactTrackerConfig};
use crate::engine::error::EngineError;
use crate::engine::proximity::{ChainNeighborFilter, ProximityDetector};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

/// Source of the site-site interaction count deciding whether a body pair is in contact.
pub trait SiteContactCounter {
    fn site_site_interactions(&self, a: BodyId, b: BodyId) -> Result<usize, ScoringError>;
}

impl SiteContactCounter for Scorer<'_> {
    fn site_site_interactions(&self, a: BodyId, b: BodyId) -> Result<usize, ScoringError> {
        Scorer::site_site_interactions(self, a, b)
    }
}

/// Running averages kept by a [`ContactStatisticsTracker`]. Rates are per nanosecond.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ContactAverages {
    pub contacts: WeightedAverage,
    pub off_per_contact_per_ns: WeightedAverage,
    pub off_per_bound_i_per_ns: WeightedAverage,
    pub off_per_bound_ii_per_ns: WeightedAverage,
    pub on_per_unbound_i_per_ns: WeightedAverage,
    pub on_per_unbound_ii_per_ns: WeightedAverage,
    pub on_per_missing_contact_per_ns: WeightedAverage,
    pub bound_fraction_i: WeightedAverage,
    pub bound_fraction_ii: WeightedAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactStatisticsSnapshot {
    pub label: String,
    pub n_updates: usize,
    pub time_ns: f64,
    pub n_particles_i: usize,
    pub n_particles_ii: usize,
    pub n_sites_i: usize,
    pub n_sites_ii: usize,
    pub n_contacts: usize,
    pub n_bound_i: usize,
    pub n_bound_ii: usize,
    pub averages: ContactAverages,
}

#[derive(Debug, Default)]
pub(super) struct ContactSample {
    contacts: BTreeSet<(BodyId, BodyId)>,
    bound_i: BTreeSet<BodyId>,
    bound_ii: BTreeSet<BodyId>,
}

/// A computed but not yet applied [`ContactStatisticsTracker`] update.
#[derive(Debug)]
pub(super) enum PendingContactUpdate {
    Start {
        sample: ContactSample,
        now_ns: f64,
    },
    Skip {
        elapsed_ns: f64,
    },
    Advance {
        sample: ContactSample,
        averages: ContactAverages,
        now_ns: f64,
    },
}

/// Time-weighted contact statistics between two body groups.
///
/// A pair is in contact when it is a candidate of the tracker's own proximity detector
/// and has at least one site-site interaction. Chain neighbors are never candidates.
///
/// The tracker starts in the *reset* state. The first update after a reset records the
/// simulation time and the contact membership without touching any average. Later
/// updates with a positive elapsed time refresh the membership and fold the step into
/// every average, weighted by elapsed time (and by the relevant population for rates);
/// updates with a non-positive elapsed time change nothing. A failed update leaves the
/// tracker exactly as it was.
pub struct ContactStatisticsTracker {
    label: String,
    detector: ProximityDetector,
    n_particles_i: usize,
    n_particles_ii: usize,
    n_sites_i: usize,
    n_sites_ii: usize,
    is_reset: bool,
    time_ns: f64,
    n_updates: usize,
    previous: ContactSample,
    averages: ContactAverages,
}

impl ContactStatisticsTracker {
    /// Creates a tracker for the groups of `config`.
    ///
    /// Site counts per group are taken from the current site tables of `system`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BodyNotFound`] if a group member is not in `system`, or a
    /// configuration error for an empty group, an invalid range or slack.
    pub fn new(config: ContactTrackerConfig, system: &BodySystem) -> Result<Self, EngineError> {
        if config.group_i.is_empty() {
            return Err(ConfigError::EmptyGroup("group_i").into());
        }
        if config.group_ii.is_empty() {
            return Err(ConfigError::EmptyGroup("group_ii").into());
        }
        let count_sites = |group: &[BodyId]| -> Result<usize, EngineError> {
            group.iter().try_fold(0, |acc, &id| {
                let sites = system.body_sites(id).ok_or(EngineError::BodyNotFound(id))?;
                Ok(acc + sites.len())
            })
        };
        let n_sites_i = count_sites(&config.group_i)?;
        let n_sites_ii = count_sites(&config.group_ii)?;
        let n_particles_i = config.group_i.len();
        let n_particles_ii = config.group_ii.len();

        let detector = ProximityDetector::new(
            config.group_i,
            config.group_ii,
            config.contact_range,
            config.slack,
        )?
        .with_filter(ChainNeighborFilter);

        info!(
            label = %config.label,
            n_particles_i,
            n_particles_ii,
            n_sites_i,
            n_sites_ii,
            "Created contact statistics tracker."
        );

        Ok(Self {
            label: config.label,
            detector,
            n_particles_i,
            n_particles_ii,
            n_sites_i,
            n_sites_ii,
            is_reset: true,
            time_ns: 0.0,
            n_updates: 0,
            previous: ContactSample::default(),
            averages: ContactAverages::default(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_reset(&self) -> bool {
        self.is_reset
    }

    pub fn n_updates(&self) -> usize {
        self.n_updates
    }

    pub fn averages(&self) -> &ContactAverages {
        &self.averages
    }

    /// Unordered body pairs in contact at the last recorded update.
    pub fn contacts(&self) -> &BTreeSet<(BodyId, BodyId)> {
        &self.previous.contacts
    }

    pub fn detector(&self) -> &ProximityDetector {
        &self.detector
    }

    /// Returns the tracker to the reset state, zeroing every average.
    pub fn reset(&mut self) {
        self.is_reset = true;
        self.time_ns = 0.0;
        self.n_updates = 0;
        self.previous = ContactSample::default();
        self.averages = ContactAverages::default();
        info!(label = %self.label, "Reset contact statistics.");
    }

    #[instrument(skip_all, name = "contact_statistics_update_task", fields(label = %self.label))]
    pub fn update(
        &mut self,
        system: &BodySystem,
        counter: &impl SiteContactCounter,
        clock: &impl SimulationClock,
    ) -> Result<(), EngineError> {
        let pending = self.prepare(system, counter, clock)?;
        self.commit(pending);
        Ok(())
    }

    /// Computes the next update without touching the recorded statistics.
    pub(super) fn prepare(
        &mut self,
        system: &BodySystem,
        counter: &impl SiteContactCounter,
        clock: &impl SimulationClock,
    ) -> Result<PendingContactUpdate, EngineError> {
        let now_ns = clock.current_time_ns();

        if self.is_reset {
            let sample = self.sample(system, counter)?;
            return Ok(PendingContactUpdate::Start { sample, now_ns });
        }

        let elapsed_ns = now_ns - self.time_ns;
        if elapsed_ns <= 0.0 {
            return Ok(PendingContactUpdate::Skip { elapsed_ns });
        }

        let sample = self.sample(system, counter)?;
        let averages = self.next_averages(&sample, elapsed_ns)?;
        Ok(PendingContactUpdate::Advance {
            sample,
            averages,
            now_ns,
        })
    }

    /// Applies an update computed by [`Self::prepare`]; cannot fail.
    pub(super) fn commit(&mut self, pending: PendingContactUpdate) {
        match pending {
            PendingContactUpdate::Start { sample, now_ns } => {
                debug!(
                    time_ns = now_ns,
                    n_contacts = sample.contacts.len(),
                    "Starting contact statistics."
                );
                self.previous = sample;
                self.time_ns = now_ns;
                self.is_reset = false;
                self.n_updates += 1;
            }
            PendingContactUpdate::Skip { elapsed_ns } => {
                debug!(elapsed_ns, "Skipping contact statistics for non-positive elapsed time.");
            }
            PendingContactUpdate::Advance {
                sample,
                averages,
                now_ns,
            } => {
                self.averages = averages;
                self.previous = sample;
                self.time_ns = now_ns;
                self.n_updates += 1;
            }
        }
    }

    fn sample(
        &mut self,
        system: &BodySystem,
        counter: &impl SiteContactCounter,
    ) -> Result<ContactSample, EngineError> {
        let mut sample = ContactSample::default();
        for pair in self.detector.candidates(system)? {
            if counter.site_site_interactions(pair.first, pair.second)? > 0 {
                sample.bound_i.insert(pair.first);
                sample.bound_ii.insert(pair.second);
                sample.contacts.insert(pair.key());
            }
        }
        debug!(
            n_contacts = sample.contacts.len(),
            n_bound_i = sample.bound_i.len(),
            n_bound_ii = sample.bound_ii.len(),
            "Sampled contacts."
        );
        Ok(sample)
    }

    /// Computes the averages after a step of `elapsed_ns` ending in `sample`.
    fn next_averages(
        &self,
        sample: &ContactSample,
        elapsed_ns: f64,
    ) -> Result<ContactAverages, EngineError> {
        let previous = &self.previous;
        let mut next = self.averages;

        let (contacts_lost, contacts_gained) = lost_and_gained(&previous.contacts, &sample.contacts);
        let (bound_i_lost, bound_i_gained) = lost_and_gained(&previous.bound_i, &sample.bound_i);
        let (bound_ii_lost, bound_ii_gained) = lost_and_gained(&previous.bound_ii, &sample.bound_ii);

        let n_contacts_before = previous.contacts.len() as f64;
        let n_bound_i_before = previous.bound_i.len() as f64;
        let n_bound_ii_before = previous.bound_ii.len() as f64;
        let n_unbound_i_before = self.n_particles_i as f64 - n_bound_i_before;
        let n_unbound_ii_before = self.n_particles_ii as f64 - n_bound_ii_before;

        next.contacts.update(sample.contacts.len() as f64, elapsed_ns)?;

        if n_contacts_before > 0.0 {
            update_rate(
                &mut next.off_per_contact_per_ns,
                contacts_lost,
                n_contacts_before * elapsed_ns,
            )?;
            update_rate(
                &mut next.off_per_bound_i_per_ns,
                bound_i_lost,
                n_bound_i_before * elapsed_ns,
            )?;
            update_rate(
                &mut next.off_per_bound_ii_per_ns,
                bound_ii_lost,
                n_bound_ii_before * elapsed_ns,
            )?;
        }
        update_rate(
            &mut next.on_per_unbound_i_per_ns,
            bound_i_gained,
            n_unbound_i_before * elapsed_ns,
        )?;
        update_rate(
            &mut next.on_per_unbound_ii_per_ns,
            bound_ii_gained,
            n_unbound_ii_before * elapsed_ns,
        )?;

        // Assumes each body pair forms at most one site-site contact; only the product of
        // the free site counts is required to be positive.
        let missing_contacts = (self.n_sites_i as f64 - n_contacts_before)
            * (self.n_sites_ii as f64 - n_contacts_before);
        if missing_contacts > 0.0 {
            update_rate(
                &mut next.on_per_missing_contact_per_ns,
                contacts_gained,
                missing_contacts * elapsed_ns,
            )?;
        }

        next.bound_fraction_i.update(
            sample.bound_i.len() as f64 / self.n_particles_i as f64,
            elapsed_ns,
        )?;
        next.bound_fraction_ii.update(
            sample.bound_ii.len() as f64 / self.n_particles_ii as f64,
            elapsed_ns,
        )?;

        debug!(
            contacts_lost,
            contacts_gained,
            bound_i_lost,
            bound_i_gained,
            bound_ii_lost,
            bound_ii_gained,
            avg_contacts = next.contacts.value(),
            avg_off_per_contact_per_ns = next.off_per_contact_per_ns.value(),
            avg_on_per_missing_contact_per_ns = next.on_per_missing_contact_per_ns.value(),
            "Updated contact statistics."
        );
        Ok(next)
    }

    pub fn snapshot(&self) -> ContactStatisticsSnapshot {
        ContactStatisticsSnapshot {
            label: self.label.clone(),
            n_updates: self.n_updates,
            time_ns: self.time_ns,
            n_particles_i: self.n_particles_i,
            n_particles_ii: self.n_particles_ii,
            n_sites_i: self.n_sites_i,
            n_sites_ii: self.n_sites_ii,
            n_contacts: self.previous.contacts.len(),
            n_bound_i: self.previous.bound_i.len(),
            n_bound_ii: self.previous.bound_ii.len(),
            averages: self.averages,
        }
    }
}

/// Folds `events / population_time` into `average`, skipping empty populations.
fn update_rate(
    average: &mut WeightedAverage,
    events: f64,
    population_time: f64,
) -> Result<(), EngineError> {
    if population_time > 0.0 {
        average.update(events / population_time, population_time)?;
    }
    Ok(())
}

fn lost_and_gained<T: Ord>(before: &BTreeSet<T>, after: &BTreeSet<T>) -> (f64, f64) {
    (
        before.difference(after).count() as f64,
        after.difference(before).count() as f64,
    )
}
