use crate::core::forcefield::params::ChannelParams;
use crate::core::models::ids::BodyId;
use crate::core::models::system::BodySystem;
use crate::engine::clock::SimulationClock;
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use serde::Serialize;
use slotmap::SecondaryMap;
use tracing::info;

/// Transport events fired by a single update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportEvents {
    pub up: bool,
    pub down: bool,
}

/// Crossing state of one tracked particle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelCrossingState {
    last_z: f64,
    is_last_entry_from_top: bool,
    is_reset: bool,
    n_transports_up: usize,
    n_transports_down: usize,
    n_entries_bottom: usize,
    n_entries_top: usize,
    transport_times_ns: Vec<f64>,
}

impl ChannelCrossingState {
    pub fn new(z: f64) -> Self {
        Self {
            last_z: z,
            is_last_entry_from_top: false,
            is_reset: true,
            n_transports_up: 0,
            n_transports_down: 0,
            n_entries_bottom: 0,
            n_entries_top: 0,
            transport_times_ns: Vec::new(),
        }
    }

    /// Zeroes the counters. The next update seeds the previous height from the current
    /// one, so it never fires a crossing.
    pub fn reset(&mut self) {
        self.n_transports_up = 0;
        self.n_transports_down = 0;
        self.n_entries_bottom = 0;
        self.n_entries_top = 0;
        self.transport_times_ns.clear();
        self.is_reset = true;
    }

    /// Advances the state to height `z` against the channel `[bottom_z, top_z]`.
    ///
    /// Exits are checked before entries, and the four rules are not exclusive: a
    /// particle jumping across the whole channel may both exit and re-enter.
    pub fn advance(&mut self, z: f64, time_ns: f64, bottom_z: f64, top_z: f64) -> TransportEvents {
        let prev_z = if self.is_reset { z } else { self.last_z };
        self.is_reset = false;
        self.last_z = z;

        let mut events = TransportEvents::default();
        if z > top_z && prev_z <= top_z && self.n_entries_bottom > 0 && !self.is_last_entry_from_top {
            self.n_transports_up += 1;
            self.transport_times_ns.push(time_ns);
            events.up = true;
        }
        if z < bottom_z && prev_z >= bottom_z && self.n_entries_top > 0 && self.is_last_entry_from_top {
            self.n_transports_down += 1;
            self.transport_times_ns.push(time_ns);
            events.down = true;
        }

        if z < top_z && prev_z >= top_z {
            self.is_last_entry_from_top = true;
            self.n_entries_top += 1;
        }
        if z > bottom_z && prev_z <= bottom_z {
            self.is_last_entry_from_top = false;
            self.n_entries_bottom += 1;
        }
        events
    }

    pub fn n_transports_up(&self) -> usize {
        self.n_transports_up
    }

    pub fn n_transports_down(&self) -> usize {
        self.n_transports_down
    }

    pub fn n_entries_bottom(&self) -> usize {
        self.n_entries_bottom
    }

    pub fn n_entries_top(&self) -> usize {
        self.n_entries_top
    }

    pub fn is_last_entry_from_top(&self) -> bool {
        self.is_last_entry_from_top
    }

    pub fn transport_times_ns(&self) -> &[f64] {
        &self.transport_times_ns
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticleTransportSnapshot {
    pub name: String,
    pub state: ChannelCrossingState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelCrossingSnapshot {
    pub bottom_z: f64,
    pub top_z: f64,
    pub particles: Vec<ParticleTransportSnapshot>,
}

/// Counts directional transports of tracked particles through the channel between two
/// z thresholds.
#[derive(Debug, Clone)]
pub struct ChannelCrossingTracker {
    bottom_z: f64,
    top_z: f64,
    particles: SecondaryMap<BodyId, ChannelCrossingState>,
}

impl ChannelCrossingTracker {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] unless `bottom_z < top_z`.
    pub fn new(bottom_z: f64, top_z: f64) -> Result<Self, ConfigError> {
        if !(bottom_z.is_finite() && top_z.is_finite()) || bottom_z >= top_z {
            return Err(ConfigError::InvalidParameter {
                parameter: "channel",
                reason: format!("bottom_z ({bottom_z}) must be below top_z ({top_z})"),
            });
        }
        Ok(Self {
            bottom_z,
            top_z,
            particles: SecondaryMap::new(),
        })
    }

    pub fn from_params(channel: &ChannelParams) -> Result<Self, ConfigError> {
        Self::new(channel.bottom_z, channel.top_z)
    }

    pub fn bottom_z(&self) -> f64 {
        self.bottom_z
    }

    pub fn top_z(&self) -> f64 {
        self.top_z
    }

    /// Starts tracking a particle from its current height.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyTracked`] if the particle is already tracked, or
    /// [`EngineError::BodyNotFound`] if it is not in `system`.
    pub fn register(&mut self, system: &BodySystem, id: BodyId) -> Result<(), EngineError> {
        if self.particles.contains_key(id) {
            return Err(EngineError::AlreadyTracked(id));
        }
        let body = system.body(id).ok_or(EngineError::BodyNotFound(id))?;
        self.particles
            .insert(id, ChannelCrossingState::new(body.position().z));
        info!(name = %body.name, "Tracking channel crossings.");
        Ok(())
    }

    pub fn is_tracked(&self, id: BodyId) -> bool {
        self.particles.contains_key(id)
    }

    pub fn state(&self, id: BodyId) -> Option<&ChannelCrossingState> {
        self.particles.get(id)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Fails if a tracked particle is no longer in `system`.
    pub fn check(&self, system: &BodySystem) -> Result<(), EngineError> {
        match self.particles.keys().find(|&id| system.body(id).is_none()) {
            Some(id) => Err(EngineError::BodyNotFound(id)),
            None => Ok(()),
        }
    }

    /// Advances every tracked particle to its current height.
    ///
    /// All heights are read before any state changes, so a missing body leaves the
    /// tracker untouched.
    pub fn update(
        &mut self,
        system: &BodySystem,
        clock: &impl SimulationClock,
    ) -> Result<(), EngineError> {
        let heights = self
            .particles
            .keys()
            .map(|id| {
                system
                    .body(id)
                    .map(|b| (id, b.position().z))
                    .ok_or(EngineError::BodyNotFound(id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let time_ns = clock.current_time_ns();
        for (id, z) in heights {
            let Some(state) = self.particles.get_mut(id) else {
                continue;
            };
            let events = state.advance(z, time_ns, self.bottom_z, self.top_z);
            if events.up {
                info!(?id, time_ns, n_up = state.n_transports_up, "Particle exited channel upward.");
            }
            if events.down {
                info!(?id, time_ns, n_down = state.n_transports_down, "Particle exited channel downward.");
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        for (_, state) in self.particles.iter_mut() {
            state.reset();
        }
        info!(num_particles = self.particles.len(), "Reset channel crossing statistics.");
    }

    pub fn snapshot(&self, system: &BodySystem) -> ChannelCrossingSnapshot {
        let particles = self
            .particles
            .iter()
            .map(|(id, state)| ParticleTransportSnapshot {
                name: system
                    .body(id)
                    .map_or_else(|| format!("{id:?}"), |b| b.name.clone()),
                state: state.clone(),
            })
            .collect();
        ChannelCrossingSnapshot {
            bottom_z: self.bottom_z,
            top_z: self.top_z,
            particles,
        }
    }
}
