#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Siege wave scheduler.
//!
//! This crate defines the message surface that connects the host adapter, the
//! authoritative marker registry, and the pure scheduling systems. The host and
//! the activation planner submit [`Command`] values describing registry
//! mutations, the registry executes them through its `apply` entry point and
//! broadcasts [`Event`] values. Systems consume event streams, read immutable
//! views, and respond with new command batches or host-facing events.
//!
//! Wave sizing lives here as well: [`resolve_wave`] is the only place that turns
//! a level and a [`WaveTable`] into spawn counts, so every caller agrees on how
//! many enemies a level holds.

mod config;
mod record;
mod wave_table;

pub use config::{
    ArchetypeSetConfig, CategoryConfig, ConfigError, DiscoveryConfig, KindConfig, MarkerMatch,
    MinibossConfig, OrchestrationConfig, PlacementConfig, RampStep, RampTarget, SiegeConfig,
    SpawningConfig, WaveCatalog,
};
pub use record::{
    contains_reserved, decode_records, encode_records, ActivationRecord, DecodedRecords,
    MarkerKey, QuantizedPosition, RecordParseError,
};
pub use wave_table::{resolve_wave, Extrapolation, ResolvedWave, WaveEntry, WaveTable};

use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Maximum number of archetype slots a single spawner fills per wave.
pub const MAX_ARCHETYPE_SLOTS: usize = 3;

/// Separates the fields of a persisted activation record.
pub const RECORD_FIELD_DELIMITER: char = '|';

/// Separates persisted activation records from one another.
pub const RECORD_LIST_DELIMITER: char = ';';

/// External game states reported by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameState {
    /// Title or pause menu; no scheduling happens.
    Menu,
    /// Active play; waves are scheduled and tracked.
    Game,
    /// Session ended, either by victory or by the player losing.
    GameOver,
}

/// Distinguishes level-scaled spawners from the fixed miniboss spawner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnerKind {
    /// Spawner whose active count follows the category ramp curve.
    Normal,
    /// Spawner capped at one per category once its unlock level is reached.
    Miniboss,
}

/// One-based game level. Levels never drop below one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Level(u32);

impl Level {
    /// The level every session starts on.
    pub const FIRST: Level = Level(1);

    /// Creates a level, clamping zero up to [`Level::FIRST`].
    #[must_use]
    pub const fn new(value: u32) -> Self {
        if value == 0 {
            Self::FIRST
        } else {
            Self(value)
        }
    }

    /// Numeric value of the level.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Level that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named marker category, e.g. a season. Any number of categories may exist.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Creates a category from its configured name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Configured name of the category.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an enemy archetype the host knows how to instantiate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchetypeId(String);

impl ArchetypeId {
    /// Creates an archetype identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name of the archetype.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an authored archetype set, unique within its category.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchetypeSetId(String);

impl ArchetypeSetId {
    /// Creates an archetype set identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name of the archetype set.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchetypeSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned to a discovered marker for the lifetime of a registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(u32);

impl MarkerId {
    /// Creates a new marker identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier assigned to a live spawner created from an activated marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpawnerId(u32);

impl SpawnerId {
    /// Creates a new spawner identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Host-side identity of a live entity, as reported by the entity census.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// World-space placement of a spawner or a spawn request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Position in world units.
    pub position: Vec3,
    /// Rotation around the vertical axis in degrees, within `[0, 360)`.
    pub yaw_degrees: f32,
}

/// Commands that express all permissible marker registry mutations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Converts a marker into a live spawner using the chosen archetype set.
    ActivateMarker {
        /// Marker to activate.
        marker: MarkerId,
        /// Spawner kind the marker becomes.
        kind: SpawnerKind,
        /// Archetype set the spawner draws its enemies from.
        archetype_set: ArchetypeSetId,
    },
    /// Destroys every live spawner and erases the persisted activation records.
    ResetActivations,
}

/// Events broadcast by the registry and the scheduling systems.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Confirms that a marker became a live spawner.
    MarkerActivated {
        /// Identifier of the new spawner.
        spawner: SpawnerId,
        /// Marker the spawner replaced.
        marker: MarkerId,
        /// Category of the marker.
        category: Category,
        /// Kind of spawner that was created.
        kind: SpawnerKind,
        /// Archetype set assigned to the spawner.
        archetype_set: ArchetypeSetId,
    },
    /// Confirms that all spawners were destroyed and persistence was cleared.
    ActivationsReset,
    /// Asks the host to instantiate an enemy. Placement may still fail host-side.
    SpawnRequested {
        /// Spawner that emitted the request.
        spawner: SpawnerId,
        /// Archetype to instantiate.
        archetype: ArchetypeId,
        /// Where and facing which way the enemy should appear.
        placement: Placement,
    },
    /// Reports that a spawner exhausted its quota for a level.
    SpawnerWaveFinished {
        /// Spawner that finished.
        spawner: SpawnerId,
        /// Level the finished wave belonged to.
        level: Level,
    },
    /// Announces a new wave together with the number of kills it requires.
    WaveStarted {
        /// Level of the wave.
        level: Level,
        /// Number of enemies every active spawner will emit in total.
        expected: u32,
    },
    /// Announces that every expected enemy of a wave was spawned and killed.
    WaveCompleted {
        /// Level that was cleared.
        level: Level,
        /// Set when the stall guard forced completion.
        forced: bool,
    },
    /// Announces that the final level was cleared.
    VictoryReached {
        /// Last level cleared.
        level: Level,
    },
    /// Announces that the scheduler observed a game state change.
    GameStateChanged {
        /// State that became active.
        state: GameState,
    },
}
