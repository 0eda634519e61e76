#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Per-spawner wave runtimes for the Siege wave scheduler.
//!
//! Each activated marker owns one [`WaveSpawner`]. Starting a wave resolves the
//! spawner's quota through [`WaveCatalog::resolve`], after which simulated time
//! supplied through [`WaveSpawner::advance`] releases one spawn request at a time,
//! separated by jittered waits, until every slot is exhausted.

use std::{collections::BTreeMap, time::Duration};

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use siege_core::{
    ArchetypeId, ArchetypeSetId, Category, Event, Level, Placement, SiegeConfig, SpawnerId,
    WaveCatalog, MAX_ARCHETYPE_SLOTS,
};
use tracing::{debug, warn};

/// Lifecycle of a spawner's current wave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpawnerPhase {
    /// No wave assigned, or the wave was stopped.
    Idle,
    /// Emitting spawn requests.
    Running,
    /// Quota exhausted; waiting for the next level.
    Completed,
}

/// Settings shared by every spawner of a session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnerSettings {
    /// Fraction of the base interval used as symmetric jitter.
    pub interval_jitter: f64,
    /// Height added to the spawner position for each request.
    pub spawn_height_offset: f32,
    /// Floor for jittered waits.
    pub min_interval: Duration,
    /// Seed from which every spawner's jitter stream is derived.
    pub session_seed: u64,
}

impl SpawnerSettings {
    /// Extracts the spawner settings from a validated configuration.
    #[must_use]
    pub fn from_config(config: &SiegeConfig) -> Self {
        Self {
            interval_jitter: config.spawning.interval_jitter,
            spawn_height_offset: config.spawning.spawn_height_offset,
            min_interval: config.extrapolation.min_interval(),
            session_seed: config.spawning.seed,
        }
    }
}

/// Registry-side description of a live spawner.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnerBlueprint {
    /// Identifier assigned by the registry.
    pub id: SpawnerId,
    /// Category of the originating marker.
    pub category: Category,
    /// Archetype set chosen on activation.
    pub archetype_set: ArchetypeSetId,
    /// Ground-snapped placement of the spawner.
    pub placement: Placement,
}

#[derive(Clone, Copy, Debug)]
struct PendingWait {
    epoch: u64,
    remaining: Duration,
}

/// Wave runtime owned by one activated marker.
#[derive(Debug)]
pub struct WaveSpawner {
    id: SpawnerId,
    category: Category,
    archetype_set: ArchetypeSetId,
    spawn_at: Placement,
    phase: SpawnerPhase,
    level: Level,
    slots: Vec<ArchetypeId>,
    remaining: [u32; MAX_ARCHETYPE_SLOTS],
    base_interval: Duration,
    pending: Option<PendingWait>,
    epoch: u64,
    emitted: u32,
    jitter: f64,
    min_interval: Duration,
    rng: ChaCha8Rng,
}

impl WaveSpawner {
    /// Creates an idle spawner for the provided blueprint.
    #[must_use]
    pub fn new(blueprint: SpawnerBlueprint, settings: &SpawnerSettings) -> Self {
        let spawn_at = Placement {
            position: blueprint.placement.position + Vec3::Y * settings.spawn_height_offset,
            yaw_degrees: blueprint.placement.yaw_degrees,
        };
        Self {
            id: blueprint.id,
            category: blueprint.category,
            archetype_set: blueprint.archetype_set,
            spawn_at,
            phase: SpawnerPhase::Idle,
            level: Level::FIRST,
            slots: Vec::new(),
            remaining: [0; MAX_ARCHETYPE_SLOTS],
            base_interval: Duration::ZERO,
            pending: None,
            epoch: 0,
            emitted: 0,
            jitter: settings.interval_jitter.clamp(0.0, 1.0),
            min_interval: settings.min_interval,
            rng: ChaCha8Rng::seed_from_u64(derive_spawner_seed(
                settings.session_seed,
                blueprint.id,
            )),
        }
    }

    /// Identifier of the spawner.
    #[must_use]
    pub const fn id(&self) -> SpawnerId {
        self.id
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> SpawnerPhase {
        self.phase
    }

    /// Level of the current or last wave.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Spawn requests still owed by the current wave.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
            .iter()
            .fold(0u32, |total, count| total.saturating_add(*count))
    }

    /// Spawn requests emitted by the current wave so far.
    #[must_use]
    pub const fn emitted(&self) -> u32 {
        self.emitted
    }

    /// Cancellation generation; bumped whenever pending waits are invalidated.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Starts the wave of `level`, abandoning any wave still in progress.
    ///
    /// The quota comes from the catalog's shared resolver. An empty quota completes
    /// the wave immediately; otherwise the first request is released on the next
    /// [`WaveSpawner::advance`].
    pub fn start(&mut self, level: Level, catalog: &WaveCatalog, out: &mut Vec<Event>) {
        if self.phase == SpawnerPhase::Running {
            debug!(spawner = self.id.get(), level = level.get(), "wave_restarted_while_running");
        }

        self.epoch = self.epoch.wrapping_add(1);
        let wave = catalog.resolve(&self.category, &self.archetype_set, level);
        self.slots = catalog
            .category(&self.category)
            .and_then(|config| config.archetype_set(&self.archetype_set))
            .map(|(_, set)| set.slots.clone())
            .unwrap_or_default();
        self.level = level;
        self.remaining = wave.counts();
        self.base_interval = wave.interval();
        self.emitted = 0;

        if wave.is_empty() {
            self.complete(out);
            return;
        }

        self.phase = SpawnerPhase::Running;
        self.pending = Some(PendingWait {
            epoch: self.epoch,
            remaining: Duration::ZERO,
        });
        debug!(
            spawner = self.id.get(),
            level = level.get(),
            total = wave.total(),
            interval_ms = self.base_interval.as_millis() as u64,
            "spawner_wave_started"
        );
    }

    /// Advances simulated time, emitting every request that falls due within `dt`.
    pub fn advance(&mut self, dt: Duration, out: &mut Vec<Event>) {
        if self.phase != SpawnerPhase::Running {
            return;
        }
        let Some(mut wait) = self.pending.take() else {
            return;
        };
        if wait.epoch != self.epoch {
            return;
        }

        let mut budget = dt;
        loop {
            if budget < wait.remaining {
                wait.remaining -= budget;
                self.pending = Some(wait);
                return;
            }
            budget -= wait.remaining;

            self.emit_one(out);
            if self.remaining() == 0 {
                self.complete(out);
                return;
            }
            wait.remaining = self.jittered_interval();
        }
    }

    /// Forces the spawner idle and discards any pending wait.
    pub fn stop(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.pending = None;
        self.remaining = [0; MAX_ARCHETYPE_SLOTS];
        if self.phase != SpawnerPhase::Idle {
            debug!(spawner = self.id.get(), "spawner_stopped");
        }
        self.phase = SpawnerPhase::Idle;
    }

    fn emit_one(&mut self, out: &mut Vec<Event>) {
        let live: Vec<usize> = self
            .remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(index, _)| index)
            .collect();
        if live.is_empty() {
            return;
        }

        let slot = live[self.rng.gen_range(0..live.len())];
        self.remaining[slot] -= 1;
        let Some(archetype) = self.slots.get(slot) else {
            warn!(spawner = self.id.get(), slot, "spawn_slot_without_archetype");
            return;
        };

        self.emitted = self.emitted.saturating_add(1);
        out.push(Event::SpawnRequested {
            spawner: self.id,
            archetype: archetype.clone(),
            placement: self.spawn_at,
        });
    }

    fn jittered_interval(&mut self) -> Duration {
        let base = self.base_interval.as_secs_f64();
        let spread = base * self.jitter;
        let secs = if spread > 0.0 {
            self.rng.gen_range(base - spread..=base + spread)
        } else {
            base
        };
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::ZERO)
            .max(self.min_interval)
    }

    fn complete(&mut self, out: &mut Vec<Event>) {
        self.phase = SpawnerPhase::Completed;
        self.pending = None;
        debug!(
            spawner = self.id.get(),
            level = self.level.get(),
            emitted = self.emitted,
            "spawner_wave_finished"
        );
        out.push(Event::SpawnerWaveFinished {
            spawner: self.id,
            level: self.level,
        });
    }
}

/// Wave runtimes of every live spawner, iterated in identifier order.
#[derive(Debug)]
pub struct WaveSpawners {
    settings: SpawnerSettings,
    runtimes: BTreeMap<SpawnerId, WaveSpawner>,
}

impl WaveSpawners {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(settings: SpawnerSettings) -> Self {
        Self {
            settings,
            runtimes: BTreeMap::new(),
        }
    }

    /// Mirrors the registry's live spawners: new blueprints get an idle runtime and
    /// runtimes whose spawner disappeared are dropped. Returns how many were added.
    pub fn sync(&mut self, blueprints: impl IntoIterator<Item = SpawnerBlueprint>) -> usize {
        let mut seen = Vec::new();
        let mut added = 0;
        for blueprint in blueprints {
            seen.push(blueprint.id);
            if !self.runtimes.contains_key(&blueprint.id) {
                let id = blueprint.id;
                let _ = self
                    .runtimes
                    .insert(id, WaveSpawner::new(blueprint, &self.settings));
                added += 1;
            }
        }
        self.runtimes.retain(|id, _| seen.contains(id));
        added
    }

    /// Starts the wave of `level` on every spawner.
    pub fn start_all(&mut self, level: Level, catalog: &WaveCatalog, out: &mut Vec<Event>) {
        for runtime in self.runtimes.values_mut() {
            runtime.start(level, catalog, out);
        }
    }

    /// Advances every running spawner by `dt`.
    pub fn advance(&mut self, dt: Duration, out: &mut Vec<Event>) {
        for runtime in self.runtimes.values_mut() {
            runtime.advance(dt, out);
        }
    }

    /// Stops every spawner.
    pub fn stop_all(&mut self) {
        for runtime in self.runtimes.values_mut() {
            runtime.stop();
        }
    }

    /// Looks up one runtime.
    #[must_use]
    pub fn get(&self, id: SpawnerId) -> Option<&WaveSpawner> {
        self.runtimes.get(&id)
    }

    /// Runtimes in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &WaveSpawner> {
        self.runtimes.values()
    }

    /// Number of runtimes in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    /// Reports whether the pool has no runtimes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }

    /// Reports whether any spawner is still emitting.
    #[must_use]
    pub fn any_running(&self) -> bool {
        self.runtimes
            .values()
            .any(|runtime| runtime.phase == SpawnerPhase::Running)
    }
}

fn derive_spawner_seed(session_seed: u64, spawner: SpawnerId) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(session_seed.to_le_bytes());
    hasher.update(b"spawner");
    hasher.update(spawner.get().to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    u64::from_le_bytes(bytes)
}
