//! Host-facing bundle that drives every scheduling component from one tick.

use std::time::Duration;

use siege_core::{Command, Event, GameState, Level, SiegeConfig, SpawnerKind, WaveCatalog};
use siege_system_activation::{ActivationPlanner, ActivationPolicy, CategoryMarkers};
use siege_system_wave_spawner::{SpawnerBlueprint, SpawnerSettings, WaveSpawners};
use siege_world::{self as world, query, Registry, RegistryError};
use tracing::info;

use crate::{expected_enemies, EntityCensus, Orchestrator, OrchestratorSettings, WavePhase};

/// Registry, activation planner, wave spawners and orchestrator of one scene.
///
/// The host builds a session once, restores persisted activations, and then
/// reports game state changes and elapsed time. Nothing is shared through
/// globals; every collaborator lives here.
#[derive(Debug)]
pub struct Session {
    catalog: WaveCatalog,
    registry: Registry,
    policy: ActivationPolicy,
    planner: ActivationPlanner,
    spawners: WaveSpawners,
    orchestrator: Orchestrator,
}

impl Session {
    /// Assembles a session around a freshly discovered registry.
    #[must_use]
    pub fn new(config: &SiegeConfig, registry: Registry) -> Self {
        let catalog = config.catalog();
        let policy = ActivationPolicy::from_catalog(&catalog);
        Self {
            policy,
            planner: ActivationPlanner::new(config.spawning.seed),
            spawners: WaveSpawners::new(SpawnerSettings::from_config(config)),
            orchestrator: Orchestrator::new(OrchestratorSettings::from_config(config)),
            catalog,
            registry,
        }
    }

    /// Rebuilds the spawners persisted by a previous run. Must run before the game starts.
    pub fn restore(&mut self, out: &mut Vec<Event>) -> Result<usize, RegistryError> {
        let restored = self.registry.restore(&self.catalog, out)?;
        let _ = self.spawners.sync(blueprints(&self.registry));
        Ok(restored.len())
    }

    /// Destroys every spawner and erases the persisted activations.
    pub fn reset_activations(&mut self, out: &mut Vec<Event>) {
        world::apply(&mut self.registry, Command::ResetActivations, out);
        let _ = self.spawners.sync(blueprints(&self.registry));
    }

    /// Reports a game state change from the host.
    ///
    /// Leaving [`GameState::Game`] stops every spawner at once, including those
    /// waiting between two spawns.
    pub fn set_game_state(&mut self, state: GameState, out: &mut Vec<Event>) {
        if self.orchestrator.set_game_state(state, out) && state != GameState::Game {
            self.spawners.stop_all();
        }
    }

    /// Advances the whole scheduler by `dt`.
    ///
    /// A due level is set up first, then spawners emit, then the orchestrator
    /// polls the census. At most one level transition happens per call.
    pub fn tick(&mut self, dt: Duration, census: &dyn EntityCensus, out: &mut Vec<Event>) {
        if self.orchestrator.game_state() != GameState::Game {
            return;
        }

        if let Some(level) = self.orchestrator.level_due() {
            self.begin_level(level, out);
        }

        let first_new = out.len();
        self.spawners.advance(dt, out);
        self.orchestrator.observe(&out[first_new..]);
        self.orchestrator.advance(dt, census, out);

        if self.orchestrator.phase() == WavePhase::Victory {
            self.spawners.stop_all();
        }
    }

    /// Read-only wave catalog.
    #[must_use]
    pub fn catalog(&self) -> &WaveCatalog {
        &self.catalog
    }

    /// Read-only marker registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Read-only wave spawner pool.
    #[must_use]
    pub fn spawners(&self) -> &WaveSpawners {
        &self.spawners
    }

    /// Read-only orchestrator state.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    fn begin_level(&mut self, level: Level, out: &mut Vec<Event>) {
        let snapshots = category_snapshots(&self.registry, &self.catalog);
        let mut commands = Vec::new();
        self.planner
            .plan(level, &self.policy, &self.catalog, &snapshots, &mut commands);
        let activations = commands.len();
        for command in commands {
            world::apply(&mut self.registry, command, out);
        }

        let _ = self.spawners.sync(blueprints(&self.registry));
        self.spawners.start_all(level, &self.catalog, out);

        let expected = expected_enemies(
            level,
            &self.catalog,
            query::spawners(&self.registry).map(|spawner| (spawner.category(), spawner.archetype_set())),
        );
        info!(
            level = level.get(),
            activations,
            spawners = self.spawners.len(),
            expected,
            "level_prepared"
        );
        self.orchestrator.begin_wave(expected, out);
    }
}

fn category_snapshots(registry: &Registry, catalog: &WaveCatalog) -> Vec<CategoryMarkers> {
    let mut available = query::available_markers(registry);
    catalog
        .categories()
        .map(|config| {
            let category = config.name.clone();
            CategoryMarkers {
                total: query::count_total(registry, &category),
                active_normal: query::count_active_of_kind(registry, &category, SpawnerKind::Normal),
                active_miniboss: query::count_active_of_kind(
                    registry,
                    &category,
                    SpawnerKind::Miniboss,
                ),
                available: available.remove(&category).unwrap_or_default(),
                category,
            }
        })
        .collect()
}

fn blueprints(registry: &Registry) -> Vec<SpawnerBlueprint> {
    query::spawners(registry)
        .map(|spawner| SpawnerBlueprint {
            id: spawner.id(),
            category: spawner.category().clone(),
            archetype_set: spawner.archetype_set().clone(),
            placement: spawner.placement(),
        })
        .collect()
}
