#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Activation policy and planner for the Siege wave scheduler.
//!
//! The policy maps a level to the number of spawners each category should have
//! active. The planner compares those targets with a snapshot of the registry
//! and emits [`Command::ActivateMarker`] for the shortfall, choosing markers and
//! archetype sets at random. Activation only ever grows: nothing here
//! deactivates a spawner.

use std::collections::BTreeMap;

use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use siege_core::{
    ArchetypeSetId, Category, Command, Level, MarkerId, RampStep, SpawnerKind, WaveCatalog,
};
use tracing::{debug, warn};

const PLANNER_STREAM: u64 = 0x0ac7_1a7e;

/// Authored activation targets of every category.
#[derive(Clone, Debug, Default)]
pub struct ActivationPolicy {
    ramps: BTreeMap<Category, Vec<RampStep>>,
    miniboss_unlocks: BTreeMap<Category, Level>,
}

impl ActivationPolicy {
    /// Builds the policy from the ramps and unlock levels held by the catalog.
    #[must_use]
    pub fn from_catalog(catalog: &WaveCatalog) -> Self {
        let mut policy = Self::default();
        for category in catalog.categories() {
            let _ = policy
                .ramps
                .insert(category.name.clone(), category.ramp.clone());
            if let Some(unlock) = category.miniboss_unlock() {
                let _ = policy.miniboss_unlocks.insert(category.name.clone(), unlock);
            }
        }
        policy
    }

    /// Number of normal spawners `category` should have active at `level`.
    ///
    /// The last ramp step whose level has been reached decides the target, which is
    /// clamped to `total_available`. Levels before the first step target zero, as
    /// do categories without a ramp.
    #[must_use]
    pub fn target_active_count(&self, level: Level, category: &Category, total_available: u32) -> u32 {
        self.ramps
            .get(category)
            .and_then(|ramp| {
                ramp.iter()
                    .rev()
                    .find(|step| Level::new(step.from_level) <= level)
            })
            .map_or(0, |step| step.target.resolve(total_available))
    }

    /// Number of miniboss spawners `category` should have active at `level`: one
    /// once its unlock level is reached, zero before or without a miniboss.
    #[must_use]
    pub fn miniboss_target(&self, level: Level, category: &Category) -> u32 {
        match self.miniboss_unlocks.get(category) {
            Some(unlock) if level >= *unlock => 1,
            _ => 0,
        }
    }
}

/// Snapshot of one category's markers, taken from the registry before planning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryMarkers {
    /// Category the snapshot describes.
    pub category: Category,
    /// Markers discovered for the category, activated or not.
    pub total: u32,
    /// Active normal spawners.
    pub active_normal: u32,
    /// Active miniboss spawners.
    pub active_miniboss: u32,
    /// Markers that can still be activated.
    pub available: Vec<MarkerId>,
}

/// Turns activation targets into marker activation commands.
#[derive(Debug)]
pub struct ActivationPlanner {
    rng: ChaCha8Rng,
}

impl ActivationPlanner {
    /// Creates a planner whose marker and archetype choices derive from `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(PLANNER_STREAM);
        Self { rng }
    }

    /// Emits the activations needed for every category to meet its targets at `level`.
    ///
    /// Normal spawners are planned before the miniboss. When a category runs out of
    /// markers the shortfall is dropped; callers must tolerate under-delivery.
    pub fn plan(
        &mut self,
        level: Level,
        policy: &ActivationPolicy,
        catalog: &WaveCatalog,
        markers: &[CategoryMarkers],
        out: &mut Vec<Command>,
    ) {
        for snapshot in markers {
            let category = &snapshot.category;
            let mut pool = snapshot.available.clone();
            pool.shuffle(&mut self.rng);

            let normal_target = policy.target_active_count(level, category, snapshot.total);
            let miniboss_target = policy.miniboss_target(level, category);
            let demands = [
                (
                    SpawnerKind::Normal,
                    normal_target.saturating_sub(snapshot.active_normal),
                ),
                (
                    SpawnerKind::Miniboss,
                    miniboss_target.saturating_sub(snapshot.active_miniboss),
                ),
            ];

            for (kind, wanted) in demands {
                if wanted == 0 {
                    continue;
                }
                let Some(sets) = archetype_sets(catalog, category, kind) else {
                    warn!(%category, ?kind, "activation_skipped_without_archetype_sets");
                    continue;
                };

                let granted = (wanted as usize).min(pool.len());
                if granted < wanted as usize {
                    debug!(
                        %category,
                        ?kind,
                        wanted,
                        granted,
                        "activation_target_capped_by_markers"
                    );
                }

                for marker in pool.drain(..granted) {
                    let archetype_set = sets[self.rng.gen_range(0..sets.len())].clone();
                    out.push(Command::ActivateMarker {
                        marker,
                        kind,
                        archetype_set,
                    });
                }
            }
        }
    }
}

fn archetype_sets(
    catalog: &WaveCatalog,
    category: &Category,
    kind: SpawnerKind,
) -> Option<Vec<ArchetypeSetId>> {
    let sets: Vec<ArchetypeSetId> = catalog
        .category(category)?
        .tables(kind)?
        .archetype_sets
        .iter()
        .map(|set| set.id.clone())
        .collect();
    (!sets.is_empty()).then_some(sets)
}
