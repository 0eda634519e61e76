#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Level and wave orchestration for the Siege wave scheduler.
//!
//! The [`Orchestrator`] tracks the level counter, the number of kills a wave
//! requires, and the live entities reported by the host's [`EntityCensus`]. The
//! [`Session`] wires it to the registry, the activation planner, and the wave
//! spawners, and multiplexes one simulation tick over all of them.

mod session;

pub use session::Session;

use std::{collections::BTreeSet, time::Duration};

use siege_core::{
    ArchetypeSetId, Category, EntityId, Event, GameState, Level, SiegeConfig, WaveCatalog,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Scheduling sub-state while the game is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WavePhase {
    /// Outside of a game; nothing is scheduled.
    WaitingForWaveStart,
    /// The level is due: spawners must be activated and the expected total computed.
    ComputingExpected,
    /// Kills are being tracked against the expected total.
    WaveInProgress,
    /// Every expected enemy is dead; the level advances on the next update.
    WaveComplete,
    /// The final level was cleared. Terminal until the next game starts.
    Victory,
}

/// Failures reported by the host when listing live entities.
#[derive(Debug, Error)]
pub enum CensusError {
    /// The host could not answer the query this time.
    #[error("entity census unavailable: {0}")]
    Unavailable(String),
}

/// Host query listing the live entities carrying a tag.
pub trait EntityCensus {
    /// Returns every live entity tagged `tag`.
    fn alive(&self, tag: &str) -> Result<Vec<EntityId>, CensusError>;
}

/// Progression settings of the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Clearing this level wins the game.
    pub max_level: Level,
    /// Time between two census scans.
    pub poll_interval: Duration,
    /// Inactivity after which a wave is forced to complete.
    pub stall_timeout: Duration,
    /// Tag the census is queried with.
    pub tracked_tag: String,
}

impl OrchestratorSettings {
    /// Extracts the orchestration settings from a validated configuration.
    #[must_use]
    pub fn from_config(config: &SiegeConfig) -> Self {
        let orchestration = &config.orchestration;
        Self {
            max_level: orchestration.max_level(),
            poll_interval: orchestration.poll_interval(),
            stall_timeout: orchestration.stall_timeout(),
            tracked_tag: orchestration.tracked_tag.clone(),
        }
    }
}

/// Number of enemies the given spawners emit in total at `level`.
///
/// Each spawner is resolved through [`WaveCatalog::resolve`], the call every wave
/// spawner makes when its wave starts, so the two never disagree.
#[must_use]
pub fn expected_enemies<'a>(
    level: Level,
    catalog: &WaveCatalog,
    spawners: impl IntoIterator<Item = (&'a Category, &'a ArchetypeSetId)>,
) -> u32 {
    spawners
        .into_iter()
        .map(|(category, set)| catalog.resolve(category, set, level).total())
        .fold(0u32, u32::saturating_add)
}

/// Level counter and expected-versus-actual kill reconciliation.
#[derive(Debug)]
pub struct Orchestrator {
    settings: OrchestratorSettings,
    game_state: GameState,
    phase: WavePhase,
    level: Level,
    expected: u32,
    killed: u32,
    spawned: u32,
    tracked: BTreeSet<EntityId>,
    since_poll: Duration,
    idle_for: Duration,
}

impl Orchestrator {
    /// Creates an orchestrator sitting in the menu.
    #[must_use]
    pub fn new(settings: OrchestratorSettings) -> Self {
        Self {
            settings,
            game_state: GameState::Menu,
            phase: WavePhase::WaitingForWaveStart,
            level: Level::FIRST,
            expected: 0,
            killed: 0,
            spawned: 0,
            tracked: BTreeSet::new(),
            since_poll: Duration::ZERO,
            idle_for: Duration::ZERO,
        }
    }

    /// Last game state observed.
    #[must_use]
    pub const fn game_state(&self) -> GameState {
        self.game_state
    }

    /// Current scheduling sub-state.
    #[must_use]
    pub const fn phase(&self) -> WavePhase {
        self.phase
    }

    /// Current level.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Kills the current wave requires.
    #[must_use]
    pub const fn expected(&self) -> u32 {
        self.expected
    }

    /// Kills observed during the current wave.
    #[must_use]
    pub const fn killed(&self) -> u32 {
        self.killed
    }

    /// Spawn requests observed during the current wave.
    #[must_use]
    pub const fn spawned(&self) -> u32 {
        self.spawned
    }

    /// Tracked entities alive at the last census scan.
    #[must_use]
    pub fn tracked_alive(&self) -> usize {
        self.tracked.len()
    }

    /// Records a game state change reported by the host. Returns whether the state changed.
    ///
    /// Entering [`GameState::Game`] restarts the campaign at level one; leaving it
    /// stops scheduling and forgets every tracked entity.
    pub fn set_game_state(&mut self, state: GameState, out: &mut Vec<Event>) -> bool {
        if state == self.game_state {
            return false;
        }

        self.game_state = state;
        self.tracked.clear();
        self.clear_wave_counters();
        out.push(Event::GameStateChanged { state });

        if state == GameState::Game {
            self.level = Level::FIRST;
            self.phase = WavePhase::ComputingExpected;
            info!("game_started");
        } else {
            self.phase = WavePhase::WaitingForWaveStart;
            info!(?state, level = self.level.get(), "game_left");
        }
        true
    }

    /// Level whose spawners must be activated and started, if one is due.
    #[must_use]
    pub fn level_due(&self) -> Option<Level> {
        (self.phase == WavePhase::ComputingExpected).then_some(self.level)
    }

    /// Starts tracking the due level's wave against `expected` kills.
    ///
    /// A wave expecting nobody is complete at once; it never waits for a kill.
    pub fn begin_wave(&mut self, expected: u32, out: &mut Vec<Event>) {
        if self.phase != WavePhase::ComputingExpected {
            warn!(phase = ?self.phase, "begin_wave_ignored");
            return;
        }

        self.clear_wave_counters();
        self.expected = expected;
        out.push(Event::WaveStarted {
            level: self.level,
            expected,
        });
        info!(level = self.level.get(), expected, "wave_started");

        self.phase = if expected == 0 {
            warn!(level = self.level.get(), "wave_without_expected_enemies");
            WavePhase::WaveComplete
        } else {
            WavePhase::WaveInProgress
        };
    }

    /// Counts the spawn requests among `events` as wave activity.
    pub fn observe(&mut self, events: &[Event]) {
        if self.phase != WavePhase::WaveInProgress {
            return;
        }
        for event in events {
            if let Event::SpawnRequested { .. } = event {
                self.spawned = self.spawned.saturating_add(1);
                self.idle_for = Duration::ZERO;
            }
        }
    }

    /// Advances the poll and stall timers, finishing the wave when it is complete.
    pub fn advance(&mut self, dt: Duration, census: &dyn EntityCensus, out: &mut Vec<Event>) {
        match self.phase {
            WavePhase::WaveInProgress => {
                self.idle_for = self.idle_for.saturating_add(dt);
                self.since_poll = self.since_poll.saturating_add(dt);
                if self.since_poll >= self.settings.poll_interval {
                    self.since_poll = Duration::ZERO;
                    self.poll(census);
                }

                if self.phase == WavePhase::WaveComplete {
                    self.finish_wave(false, out);
                } else if self.idle_for >= self.settings.stall_timeout {
                    warn!(
                        level = self.level.get(),
                        expected = self.expected,
                        killed = self.killed,
                        spawned = self.spawned,
                        "wave_stalled_forcing_completion"
                    );
                    self.finish_wave(true, out);
                }
            }
            WavePhase::WaveComplete => self.finish_wave(false, out),
            WavePhase::WaitingForWaveStart | WavePhase::ComputingExpected | WavePhase::Victory => {}
        }
    }

    fn poll(&mut self, census: &dyn EntityCensus) {
        let alive = match census.alive(&self.settings.tracked_tag) {
            Ok(alive) => alive,
            Err(error) => {
                warn!(error = %error, "entity_census_failed");
                return;
            }
        };

        let alive: BTreeSet<EntityId> = alive.into_iter().collect();
        let kills = self.tracked.difference(&alive).count() as u32;
        if kills > 0 {
            self.killed = self.killed.saturating_add(kills);
            self.idle_for = Duration::ZERO;
        }
        self.tracked = alive;
        debug!(
            level = self.level.get(),
            killed = self.killed,
            alive = self.tracked.len(),
            expected = self.expected,
            "census_polled"
        );

        if self.expected > 0
            && self.spawned >= self.expected
            && self.killed >= self.expected
            && self.tracked.is_empty()
        {
            self.phase = WavePhase::WaveComplete;
        }
    }

    fn finish_wave(&mut self, forced: bool, out: &mut Vec<Event>) {
        out.push(Event::WaveCompleted {
            level: self.level,
            forced,
        });
        info!(level = self.level.get(), forced, "wave_completed");

        if self.level >= self.settings.max_level {
            out.push(Event::VictoryReached { level: self.level });
            info!(level = self.level.get(), "victory_reached");
            self.phase = WavePhase::Victory;
            self.game_state = GameState::GameOver;
            out.push(Event::GameStateChanged {
                state: GameState::GameOver,
            });
            return;
        }

        self.level = self.level.next();
        self.clear_wave_counters();
        self.phase = WavePhase::ComputingExpected;
    }

    fn clear_wave_counters(&mut self) {
        self.expected = 0;
        self.killed = 0;
        self.spawned = 0;
        self.since_poll = Duration::ZERO;
        self.idle_for = Duration::ZERO;
    }
}
