//! Stateless spawning.
//!
//! Which particles are alive at time `t` is a pure function of the spawn
//! configuration and `t`, so an emitter can be evaluated at any time without
//! replaying earlier frames.
//!
//! # Spawn Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SpawnInfo::Burst`] | `amount` particles at `time` within each loop |
//! | [`SpawnInfo::Rate`] | `rate` particles per second from `start` to `end` |
//!
//! Every particle gets a unique index
//! `loop_index * particles_per_loop + spawn_ordinal`, which seeds all of its
//! random draws, and a lifetime drawn from the emitter's [`LifetimeRange`].
//!
//! # Example
//!
//! ```ignore
//! EmitterDefinition {
//!     loop_behavior: LoopBehavior::Infinite,
//!     loop_duration: 2.0,
//!     spawn: vec![
//!         SpawnInfo::Burst { time: 0.0, amount: 50 },
//!         SpawnInfo::Rate { rate: 100.0, start: 0.5, end: None },
//!     ],
//!     ..Default::default()
//! }
//! ```

use crate::random;
use serde::{Deserialize, Serialize};

/// Seed slot used for per-particle lifetimes. Module seeds start above it.
pub const LIFETIME_SEED: u32 = 0;

/// One spawn source within a loop.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SpawnInfo {
    Burst {
        time: f32,
        amount: u32,
    },
    Rate {
        rate: f32,
        #[serde(default)]
        start: f32,
        /// Defaults to the end of the loop.
        #[serde(default)]
        end: Option<f32>,
    },
}

/// What happens when the loop duration elapses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopBehavior {
    /// Spawn during the first loop only.
    Once,
    #[default]
    Infinite,
}

/// Range particle lifetimes are drawn from, in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LifetimeRange {
    pub min: f32,
    pub max: f32,
}

impl Default for LifetimeRange {
    fn default() -> Self {
        Self { min: 1.0, max: 1.0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct ScheduledSpawn {
    base_index: u32,
    count: u32,
    start: f32,
    /// Seconds between consecutive particles; zero for bursts.
    interval: f32,
}

/// Compiled spawn timeline of one emitter.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnSchedule {
    entries: Vec<ScheduledSpawn>,
    particles_per_loop: u32,
    loop_behavior: LoopBehavior,
    loop_duration: f32,
    lifetime: LifetimeRange,
    emitter_seed: u32,
}

/// A particle alive at the gathered time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnedParticle {
    pub unique_index: u32,
    pub age: f32,
    pub lifetime: f32,
}

impl SpawnSchedule {
    pub fn new(
        spawn: &[SpawnInfo],
        loop_behavior: LoopBehavior,
        loop_duration: f32,
        lifetime: LifetimeRange,
        emitter_seed: u32,
    ) -> Self {
        let loop_duration = loop_duration.max(f32::EPSILON);
        let mut entries = Vec::with_capacity(spawn.len());
        let mut base_index = 0u32;

        for info in spawn {
            let entry = match *info {
                SpawnInfo::Burst { time, amount } => {
                    if !(0.0..loop_duration).contains(&time) {
                        continue;
                    }
                    ScheduledSpawn {
                        base_index,
                        count: amount,
                        start: time,
                        interval: 0.0,
                    }
                }
                SpawnInfo::Rate { rate, start, end } => {
                    let start = start.max(0.0);
                    let end = end.unwrap_or(loop_duration).min(loop_duration);
                    if rate <= 0.0 || end <= start {
                        continue;
                    }
                    ScheduledSpawn {
                        base_index,
                        count: ((end - start) * rate).ceil() as u32,
                        start,
                        interval: 1.0 / rate,
                    }
                }
            };
            base_index = base_index.wrapping_add(entry.count);
            entries.push(entry);
        }

        let lifetime = LifetimeRange {
            min: lifetime.min.max(0.0),
            max: lifetime.max.max(lifetime.min).max(0.0),
        };

        Self {
            entries,
            particles_per_loop: base_index,
            loop_behavior,
            loop_duration,
            lifetime,
            emitter_seed,
        }
    }

    /// Particles spawned during one loop.
    #[inline]
    pub fn particles_per_loop(&self) -> u32 {
        self.particles_per_loop
    }

    /// Lifetime of a particle, a pure function of its unique index.
    #[inline]
    pub fn lifetime_of(&self, unique_index: u32) -> f32 {
        let r = random::random_float(unique_index, self.emitter_seed, LIFETIME_SEED);
        self.lifetime.min + (self.lifetime.max - self.lifetime.min) * r
    }

    /// Visit every particle alive at `time`, in unique-index order per loop.
    pub fn for_each_alive(&self, time: f32, mut visit: impl FnMut(SpawnedParticle)) {
        if time < 0.0 || self.particles_per_loop == 0 {
            return;
        }
        let duration = self.loop_duration;
        let max_lifetime = self.lifetime.max;

        let last_loop = (time / duration).floor() as i64;
        let first_loop = (((time - max_lifetime) / duration).floor() as i64 - 1).max(0);
        let last_loop = match self.loop_behavior {
            LoopBehavior::Once => last_loop.min(0),
            LoopBehavior::Infinite => last_loop,
        };

        for loop_index in first_loop..=last_loop {
            let loop_start = loop_index as f32 * duration;
            let loop_base = (loop_index as u32).wrapping_mul(self.particles_per_loop);

            for entry in &self.entries {
                let first_spawn = loop_start + entry.start;
                let (lo, hi) = if entry.interval > 0.0 {
                    let lo = ((time - max_lifetime - first_spawn) / entry.interval).floor() as i64;
                    let hi = ((time - first_spawn) / entry.interval).floor() as i64;
                    (lo.max(0), hi.min(entry.count as i64 - 1))
                } else {
                    (0, entry.count as i64 - 1)
                };

                for k in lo..=hi {
                    let spawn_time = first_spawn + k as f32 * entry.interval;
                    let age = time - spawn_time;
                    if age < 0.0 {
                        continue;
                    }
                    let unique_index = loop_base.wrapping_add(entry.base_index).wrapping_add(k as u32);
                    let lifetime = self.lifetime_of(unique_index);
                    if age < lifetime {
                        visit(SpawnedParticle {
                            unique_index,
                            age,
                            lifetime,
                        });
                    }
                }
            }
        }
    }

    /// Collect [`for_each_alive`](Self::for_each_alive) into a vector.
    pub fn alive_at(&self, time: f32) -> Vec<SpawnedParticle> {
        let mut alive = Vec::new();
        self.for_each_alive(time, |p| alive.push(p));
        alive
    }
}
