//! Simulated host population standing in for the game engine.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use siege_core::{EntityId, Event};
use siege_system_orchestrator::{CensusError, EntityCensus};

#[derive(Debug)]
struct Enemy {
    id: EntityId,
    remaining: Duration,
}

/// Instantiates every spawn request and kills it after a random lifetime.
#[derive(Debug)]
pub(crate) struct Population {
    rng: ChaCha8Rng,
    min_lifetime: f64,
    max_lifetime: f64,
    next_id: u64,
    alive: Vec<Enemy>,
    spawned: u64,
    killed: u64,
}

impl Population {
    pub(crate) fn new(seed: u64, min_lifetime: f64, max_lifetime: f64) -> Self {
        let low = min_lifetime.max(0.0);
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            min_lifetime: low,
            max_lifetime: max_lifetime.max(low),
            next_id: 0,
            alive: Vec::new(),
            spawned: 0,
            killed: 0,
        }
    }

    pub(crate) fn absorb(&mut self, events: &[Event]) {
        for event in events {
            if let Event::SpawnRequested { .. } = event {
                let lifetime = self.rng.gen_range(self.min_lifetime..=self.max_lifetime);
                self.alive.push(Enemy {
                    id: EntityId::new(self.next_id),
                    remaining: Duration::try_from_secs_f64(lifetime).unwrap_or(Duration::MAX),
                });
                self.next_id += 1;
                self.spawned += 1;
            }
        }
    }

    pub(crate) fn advance(&mut self, dt: Duration) {
        for enemy in &mut self.alive {
            enemy.remaining = enemy.remaining.saturating_sub(dt);
        }
        let before = self.alive.len();
        self.alive.retain(|enemy| !enemy.remaining.is_zero());
        self.killed += (before - self.alive.len()) as u64;
    }

    pub(crate) fn spawned(&self) -> u64 {
        self.spawned
    }

    pub(crate) fn killed(&self) -> u64 {
        self.killed
    }

    pub(crate) fn alive_count(&self) -> usize {
        self.alive.len()
    }
}

impl EntityCensus for Population {
    fn alive(&self, _tag: &str) -> Result<Vec<EntityId>, CensusError> {
        Ok(self.alive.iter().map(|enemy| enemy.id).collect())
    }
}
