//! Tuning data for the scheduler and the read-only wave catalog built from it.

use std::{
    collections::{BTreeMap, HashSet},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::{
    record::contains_reserved, resolve_wave, wave_table::secs_to_duration, ArchetypeId,
    ArchetypeSetId, Category, Extrapolation, Level, ResolvedWave, SpawnerKind, WaveTable,
    MAX_ARCHETYPE_SLOTS,
};

/// Complete tuning surface of the scheduler.
#[derive(Clone, Debug, Deserialize)]
pub struct SiegeConfig {
    /// Growth rules for levels beyond the authored wave tables.
    #[serde(default)]
    pub extrapolation: Extrapolation,
    /// Per-spawner cadence settings.
    #[serde(default)]
    pub spawning: SpawningConfig,
    /// Level progression and kill tracking settings.
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    /// How scene objects are recognised as markers.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Ground snapping settings for activated markers.
    #[serde(default)]
    pub placement: PlacementConfig,
    /// Marker categories with their ramps, wave tables and archetype sets.
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

/// Per-spawner cadence settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpawningConfig {
    /// Fraction of the base interval used as symmetric jitter, within `[0, 1)`.
    pub interval_jitter: f64,
    /// Height added to the spawner position for each spawn request.
    pub spawn_height_offset: f32,
    /// Session seed from which every spawner's jitter stream is derived.
    pub seed: u64,
}

impl Default for SpawningConfig {
    fn default() -> Self {
        Self {
            interval_jitter: 0.25,
            spawn_height_offset: 0.5,
            seed: 0x51e9_e5ee_d000_0001,
        }
    }
}

/// Level progression and kill tracking settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Clearing this level ends the session in victory.
    pub max_level: u32,
    /// Seconds between two scans of the live entity census.
    pub poll_interval_secs: f64,
    /// Seconds without any spawn or kill after which a wave is forced to complete.
    pub stall_timeout_secs: f64,
    /// Tag the census is queried with.
    pub tracked_tag: String,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_level: 20,
            poll_interval_secs: 2.0,
            stall_timeout_secs: 180.0,
            tracked_tag: "Enemy".to_owned(),
        }
    }
}

impl OrchestrationConfig {
    /// Level whose completion wins the game.
    #[must_use]
    pub fn max_level(&self) -> Level {
        Level::new(self.max_level)
    }

    /// Interval between census scans.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        secs_to_duration(self.poll_interval_secs)
    }

    /// Inactivity period that forces a wave to complete.
    #[must_use]
    pub fn stall_timeout(&self) -> Duration {
        secs_to_duration(self.stall_timeout_secs)
    }
}

/// Attribute of a scene object matched against category marker patterns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerMatch {
    /// The object name contains the pattern.
    #[default]
    Name,
    /// The object tag equals the pattern.
    Tag,
}

/// How scene objects are recognised as markers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Attribute compared with each category's marker pattern.
    pub match_by: MarkerMatch,
}

/// Ground snapping settings for activated markers.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Maximum downward probe distance when looking for a supporting surface.
    pub probe_distance: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            probe_distance: 50.0,
        }
    }
}

/// Target of a ramp step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampTarget {
    /// A fixed number of active spawners.
    Count(u32),
    /// Every marker of the category.
    All,
}

impl RampTarget {
    /// Resolves the target against the number of markers available.
    #[must_use]
    pub fn resolve(self, available: u32) -> u32 {
        match self {
            Self::Count(count) => count.min(available),
            Self::All => available,
        }
    }

    fn rank(self) -> u64 {
        match self {
            Self::Count(count) => u64::from(count),
            Self::All => u64::MAX,
        }
    }
}

/// One step of a category's activation ramp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct RampStep {
    /// First level at which the step applies.
    pub from_level: u32,
    /// Active spawner target from that level on.
    pub target: RampTarget,
}

/// Authored archetype set a spawner may be assigned.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ArchetypeSetConfig {
    /// Identifier, unique within the category.
    pub id: ArchetypeSetId,
    /// Archetype spawned by each slot, in slot order.
    pub slots: Vec<ArchetypeId>,
}

/// Wave table and archetype sets of one spawner kind.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct KindConfig {
    /// Wave table indexed by level.
    #[serde(default)]
    pub waves: WaveTable,
    /// Archetype sets a newly activated spawner chooses from.
    #[serde(default)]
    pub archetype_sets: Vec<ArchetypeSetConfig>,
}

/// Miniboss spawner settings of a category.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MinibossConfig {
    /// First level at which the category's miniboss spawner is activated.
    pub unlock_level: u32,
    /// Wave table and archetype sets of the miniboss spawner.
    #[serde(flatten)]
    pub tables: KindConfig,
}

/// Marker category with its ramp, wave tables and archetype sets.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CategoryConfig {
    /// Category name, also written into persisted records.
    pub name: Category,
    /// Name substring or tag identifying markers of this category.
    pub marker_pattern: String,
    /// Active spawner targets by level for normal spawners.
    #[serde(default)]
    pub ramp: Vec<RampStep>,
    /// Normal spawner tables.
    #[serde(default)]
    pub normal: KindConfig,
    /// Optional miniboss spawner settings.
    #[serde(default)]
    pub miniboss: Option<MinibossConfig>,
}

impl CategoryConfig {
    /// Tables of the requested spawner kind, if the category defines it.
    #[must_use]
    pub fn tables(&self, kind: SpawnerKind) -> Option<&KindConfig> {
        match kind {
            SpawnerKind::Normal => Some(&self.normal),
            SpawnerKind::Miniboss => self.miniboss.as_ref().map(|miniboss| &miniboss.tables),
        }
    }

    /// Level from which the miniboss spawner is due, if the category has one.
    #[must_use]
    pub fn miniboss_unlock(&self) -> Option<Level> {
        self.miniboss
            .as_ref()
            .map(|miniboss| Level::new(miniboss.unlock_level))
    }

    /// Looks up an archetype set in either spawner kind.
    #[must_use]
    pub fn archetype_set(&self, id: &ArchetypeSetId) -> Option<(SpawnerKind, &ArchetypeSetConfig)> {
        [SpawnerKind::Normal, SpawnerKind::Miniboss]
            .into_iter()
            .filter_map(|kind| self.tables(kind).map(|tables| (kind, tables)))
            .find_map(|(kind, tables)| {
                tables
                    .archetype_sets
                    .iter()
                    .find(|set| &set.id == id)
                    .map(|set| (kind, set))
            })
    }
}

/// Configuration problems that prevent a session from starting.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// No category was configured, so nothing could ever spawn.
    #[error("no marker categories are configured")]
    NoCategories,
    /// Two categories share a name.
    #[error("category `{0}` is configured more than once")]
    DuplicateCategory(Category),
    /// A name contains a character reserved by the persisted record layout.
    #[error("{field} `{value}` must be non-empty and must not contain `|` or `;`")]
    InvalidName {
        /// Which kind of name was rejected.
        field: &'static str,
        /// The rejected name.
        value: String,
    },
    /// A category has no marker pattern to discover markers with.
    #[error("category `{0}` has an empty marker pattern")]
    EmptyMarkerPattern(Category),
    /// Ramp steps are out of order or their targets decrease.
    #[error("ramp of category `{0}` must have increasing levels and non-decreasing targets")]
    NonMonotonicRamp(Category),
    /// Two archetype sets of a category share an identifier.
    #[error("archetype set `{set}` is defined more than once in category `{category}`")]
    DuplicateArchetypeSet {
        /// Category containing the duplicate.
        category: Category,
        /// Duplicated identifier.
        set: ArchetypeSetId,
    },
    /// An archetype set lists more slots than a spawner has.
    #[error(
        "archetype set `{set}` in category `{category}` lists more than {max} slots",
        max = MAX_ARCHETYPE_SLOTS
    )]
    TooManySlots {
        /// Category containing the set.
        category: Category,
        /// Offending set.
        set: ArchetypeSetId,
    },
    /// A wave entry has a zero, negative or non-finite interval.
    #[error("wave {index} of the {kind:?} table in category `{category}` has an invalid interval")]
    InvalidWaveInterval {
        /// Category containing the table.
        category: Category,
        /// Spawner kind of the table.
        kind: SpawnerKind,
        /// One-based level of the entry.
        index: usize,
    },
    /// A miniboss unlock level of zero.
    #[error("miniboss of category `{0}` must unlock at level 1 or later")]
    InvalidUnlockLevel(Category),
    /// The campaign has no levels.
    #[error("max_level must be at least 1")]
    ZeroMaxLevel,
    /// Growth below one would shrink waves past the authored table.
    #[error("extrapolation growth {0} must be finite and at least 1")]
    InvalidGrowth(f64),
    /// Negative interval reduction.
    #[error("extrapolation reduction {0} must be finite and non-negative")]
    InvalidReduction(f64),
    /// Non-positive interval floor.
    #[error("min_interval_secs {0} must be finite and positive")]
    InvalidMinInterval(f64),
    /// Jitter outside `[0, 1)`.
    #[error("interval_jitter {0} must lie within [0, 1)")]
    InvalidJitter(f64),
    /// Non-positive poll interval or stall timeout.
    #[error("{field} {value} must be finite and positive")]
    InvalidPeriod {
        /// Which setting was rejected.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },
}

impl SiegeConfig {
    /// Checks the configuration, failing fast on anything that would leave the
    /// scheduler unable to run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }

        let extrapolation = &self.extrapolation;
        if !extrapolation.growth.is_finite() || extrapolation.growth < 1.0 {
            return Err(ConfigError::InvalidGrowth(extrapolation.growth));
        }
        if !extrapolation.reduction.is_finite() || extrapolation.reduction < 0.0 {
            return Err(ConfigError::InvalidReduction(extrapolation.reduction));
        }
        if !is_positive(extrapolation.min_interval_secs) {
            return Err(ConfigError::InvalidMinInterval(
                extrapolation.min_interval_secs,
            ));
        }

        let jitter = self.spawning.interval_jitter;
        if !(0.0..1.0).contains(&jitter) {
            return Err(ConfigError::InvalidJitter(jitter));
        }

        let orchestration = &self.orchestration;
        if orchestration.max_level == 0 {
            return Err(ConfigError::ZeroMaxLevel);
        }
        for (field, value) in [
            ("poll_interval_secs", orchestration.poll_interval_secs),
            ("stall_timeout_secs", orchestration.stall_timeout_secs),
        ] {
            if !is_positive(value) {
                return Err(ConfigError::InvalidPeriod { field, value });
            }
        }

        let mut names = HashSet::new();
        for category in &self.categories {
            validate_name("category name", category.name.as_str())?;
            if !names.insert(&category.name) {
                return Err(ConfigError::DuplicateCategory(category.name.clone()));
            }
            validate_category(category)?;
        }

        Ok(())
    }

    /// Builds the read-only wave catalog shared by spawners and the orchestrator.
    #[must_use]
    pub fn catalog(&self) -> WaveCatalog {
        WaveCatalog::new(self.categories.clone(), self.extrapolation)
    }
}

fn validate_category(category: &CategoryConfig) -> Result<(), ConfigError> {
    if category.marker_pattern.trim().is_empty() {
        return Err(ConfigError::EmptyMarkerPattern(category.name.clone()));
    }

    let mut previous: Option<RampStep> = None;
    for step in &category.ramp {
        let ordered = match previous {
            None => step.from_level >= 1,
            Some(prior) => {
                step.from_level > prior.from_level && step.target.rank() >= prior.target.rank()
            }
        };
        if !ordered {
            return Err(ConfigError::NonMonotonicRamp(category.name.clone()));
        }
        previous = Some(*step);
    }

    if let Some(miniboss) = &category.miniboss {
        if miniboss.unlock_level == 0 {
            return Err(ConfigError::InvalidUnlockLevel(category.name.clone()));
        }
    }

    let mut set_ids = HashSet::new();
    for kind in [SpawnerKind::Normal, SpawnerKind::Miniboss] {
        let Some(tables) = category.tables(kind) else {
            continue;
        };

        for (index, entry) in tables.waves.entries().iter().enumerate() {
            if !is_positive(entry.interval_secs()) {
                return Err(ConfigError::InvalidWaveInterval {
                    category: category.name.clone(),
                    kind,
                    index: index + 1,
                });
            }
        }

        if tables.archetype_sets.is_empty() {
            warn!(category = %category.name, ?kind, "category_without_archetype_sets");
        }

        for set in &tables.archetype_sets {
            validate_name("archetype set id", set.id.as_str())?;
            if !set_ids.insert(&set.id) {
                return Err(ConfigError::DuplicateArchetypeSet {
                    category: category.name.clone(),
                    set: set.id.clone(),
                });
            }
            if set.slots.len() > MAX_ARCHETYPE_SLOTS {
                return Err(ConfigError::TooManySlots {
                    category: category.name.clone(),
                    set: set.id.clone(),
                });
            }
        }
    }

    Ok(())
}

fn validate_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() || contains_reserved(value) {
        return Err(ConfigError::InvalidName {
            field,
            value: value.to_owned(),
        });
    }
    Ok(())
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Read-only access to every category's wave tables and archetype sets.
#[derive(Clone, Debug, Default)]
pub struct WaveCatalog {
    categories: BTreeMap<Category, CategoryConfig>,
    extrapolation: Extrapolation,
}

impl WaveCatalog {
    /// Creates a catalog from category settings and extrapolation rules.
    #[must_use]
    pub fn new(categories: Vec<CategoryConfig>, extrapolation: Extrapolation) -> Self {
        Self {
            categories: categories
                .into_iter()
                .map(|category| (category.name.clone(), category))
                .collect(),
            extrapolation,
        }
    }

    /// Categories in name order.
    pub fn categories(&self) -> impl Iterator<Item = &CategoryConfig> {
        self.categories.values()
    }

    /// Settings of a single category.
    #[must_use]
    pub fn category(&self, name: &Category) -> Option<&CategoryConfig> {
        self.categories.get(name)
    }

    /// Extrapolation rules applied past the authored tables.
    #[must_use]
    pub const fn extrapolation(&self) -> &Extrapolation {
        &self.extrapolation
    }

    /// Resolves the wave a spawner with the given archetype set runs at `level`.
    ///
    /// This is the one place spawn quotas are computed: spawners call it when a
    /// wave starts and the orchestrator calls it to predict how many kills a
    /// level requires. Slots the archetype set leaves empty resolve to zero.
    #[must_use]
    pub fn resolve(&self, category: &Category, set: &ArchetypeSetId, level: Level) -> ResolvedWave {
        let Some(config) = self.categories.get(category) else {
            warn!(%category, "wave_catalog_unknown_category");
            return ResolvedWave::EMPTY;
        };
        let Some((kind, archetypes)) = config.archetype_set(set) else {
            warn!(%category, %set, "wave_catalog_unknown_archetype_set");
            return ResolvedWave::EMPTY;
        };
        let Some(tables) = config.tables(kind) else {
            return ResolvedWave::EMPTY;
        };

        let resolved = resolve_wave(level, &tables.waves, &self.extrapolation);
        let masked = resolved.masked(archetypes.slots.len());
        if masked.total() != resolved.total() {
            warn!(
                %category,
                %set,
                level = level.get(),
                dropped = resolved.total() - masked.total(),
                "wave_counts_for_empty_slots_dropped"
            );
        }
        masked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WaveEntry;

    const SAMPLE: &str = r#"
        [extrapolation]
        growth = 1.15
        reduction = 0.05
        min_interval_secs = 0.2

        [orchestration]
        max_level = 12

        [[categories]]
        name = "spring"
        marker_pattern = "SpringSpawn"
        ramp = [
            { from_level = 1, target = { count = 2 } },
            { from_level = 2, target = { count = 5 } },
            { from_level = 6, target = "all" },
        ]

        [categories.normal]
        waves = [
            { counts = [2, 1, 0], interval = 1.0 },
            { counts = [3, 2, 1], interval = 0.8 },
        ]
        archetype_sets = [
            { id = "ghouls", slots = ["ghoul", "runner"] },
        ]

        [categories.miniboss]
        unlock_level = 3
        waves = [{ counts = [1], interval = 4.0 }]
        archetype_sets = [{ id = "brute", slots = ["brute"] }]
    "#;

    fn sample() -> SiegeConfig {
        toml::from_str(SAMPLE).expect("sample config parses")
    }

    #[test]
    fn sample_config_parses_and_validates() {
        let config = sample();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.orchestration.max_level(), Level::new(12));
        assert_eq!(config.spawning, SpawningConfig::default());
        let spring = &config.categories[0];
        assert_eq!(spring.ramp[2].target, RampTarget::All);
        assert_eq!(spring.miniboss_unlock(), Some(Level::new(3)));
    }

    #[test]
    fn empty_category_list_fails_fast() {
        let config: SiegeConfig = toml::from_str("").expect("parses");
        assert_eq!(config.validate(), Err(ConfigError::NoCategories));
    }

    #[test]
    fn decreasing_ramp_is_rejected() {
        let mut config = sample();
        config.categories[0].ramp[1].target = RampTarget::Count(1);
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonMonotonicRamp(Category::new("spring")))
        );
    }

    #[test]
    fn set_ids_must_be_unique_across_kinds() {
        let mut config = sample();
        if let Some(miniboss) = config.categories[0].miniboss.as_mut() {
            miniboss.tables.archetype_sets[0].id = ArchetypeSetId::new("ghouls");
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateArchetypeSet { .. })
        ));
    }

    #[test]
    fn reserved_characters_in_names_are_rejected() {
        let mut config = sample();
        config.categories[0].name = Category::new("spr|ng");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidName { .. })
        ));
    }

    #[test]
    fn jitter_must_stay_below_one() {
        let mut config = sample();
        config.spawning.interval_jitter = 1.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidJitter(1.0)));
    }

    #[test]
    fn catalog_resolves_through_the_chosen_set() {
        let catalog = sample().catalog();
        let spring = Category::new("spring");
        let normal = catalog.resolve(&spring, &ArchetypeSetId::new("ghouls"), Level::new(2));
        // Third slot is empty in the set, so its authored count is dropped.
        assert_eq!(normal.counts(), [3, 2, 0]);
        let boss = catalog.resolve(&spring, &ArchetypeSetId::new("brute"), Level::new(2));
        assert_eq!(boss.counts(), [1, 0, 0]);
    }

    #[test]
    fn catalog_yields_empty_wave_for_unknown_set() {
        let catalog = sample().catalog();
        let resolved = catalog.resolve(
            &Category::new("spring"),
            &ArchetypeSetId::new("missing"),
            Level::FIRST,
        );
        assert!(resolved.is_empty());
    }

    #[test]
    fn archetype_set_lookup_reports_kind() {
        let config = sample();
        let spring = &config.categories[0];
        let (kind, _) = spring
            .archetype_set(&ArchetypeSetId::new("brute"))
            .expect("brute set");
        assert_eq!(kind, SpawnerKind::Miniboss);
        assert_eq!(
            spring.normal.waves.entries()[0],
            WaveEntry::new([2, 1, 0], 1.0)
        );
    }
}
