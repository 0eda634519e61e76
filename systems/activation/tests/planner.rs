use std::collections::BTreeSet;

use siege_core::{ArchetypeSetId, Category, Command, Level, MarkerId, SiegeConfig, SpawnerKind};
use siege_system_activation::{ActivationPlanner, ActivationPolicy, CategoryMarkers};

const CONFIG: &str = r#"
    [[categories]]
    name = "spring"
    marker_pattern = "SpringSpawn"
    ramp = [
        { from_level = 1, target = { count = 2 } },
        { from_level = 2, target = { count = 5 } },
        { from_level = 4, target = "all" },
    ]

    [categories.normal]
    archetype_sets = [
        { id = "ghouls", slots = ["ghoul", "runner"] },
        { id = "bats", slots = ["bat"] },
    ]

    [categories.miniboss]
    unlock_level = 3
    archetype_sets = [{ id = "brute", slots = ["brute"] }]

    [[categories]]
    name = "barren"
    marker_pattern = "BarrenSpawn"
    ramp = [{ from_level = 1, target = { count = 3 } }]
"#;

fn config() -> SiegeConfig {
    toml::from_str(CONFIG).expect("config parses")
}

/// Minimal stand-in for the registry: applies activations to per-category snapshots.
struct FakeRegistry {
    snapshots: Vec<CategoryMarkers>,
    activated: Vec<(Category, MarkerId, SpawnerKind, ArchetypeSetId)>,
}

impl FakeRegistry {
    fn new(markers: &[(&str, u32)]) -> Self {
        let mut next = 0;
        let snapshots = markers
            .iter()
            .map(|(name, total)| {
                let available = (next..next + total).map(MarkerId::new).collect();
                next += total;
                CategoryMarkers {
                    category: Category::new(*name),
                    total: *total,
                    active_normal: 0,
                    active_miniboss: 0,
                    available,
                }
            })
            .collect();
        Self {
            snapshots,
            activated: Vec::new(),
        }
    }

    fn apply(&mut self, commands: Vec<Command>) {
        for command in commands {
            let Command::ActivateMarker {
                marker,
                kind,
                archetype_set,
            } = command
            else {
                panic!("unexpected command {command:?}");
            };
            let snapshot = self
                .snapshots
                .iter_mut()
                .find(|snapshot| snapshot.available.contains(&marker))
                .expect("marker must still be available");
            snapshot.available.retain(|candidate| *candidate != marker);
            match kind {
                SpawnerKind::Normal => snapshot.active_normal += 1,
                SpawnerKind::Miniboss => snapshot.active_miniboss += 1,
            }
            self.activated
                .push((snapshot.category.clone(), marker, kind, archetype_set));
        }
    }

    fn active(&self, name: &str) -> u32 {
        self.snapshots
            .iter()
            .find(|snapshot| snapshot.category.as_str() == name)
            .map_or(0, |snapshot| snapshot.active_normal + snapshot.active_miniboss)
    }
}

fn run_levels(seed: u64, levels: u32, markers: &[(&str, u32)]) -> FakeRegistry {
    let config = config();
    let catalog = config.catalog();
    let policy = ActivationPolicy::from_catalog(&catalog);
    let mut planner = ActivationPlanner::new(seed);
    let mut registry = FakeRegistry::new(markers);

    for level in 1..=levels {
        let mut commands = Vec::new();
        planner.plan(
            Level::new(level),
            &policy,
            &catalog,
            &registry.snapshots,
            &mut commands,
        );
        registry.apply(commands);
    }
    registry
}

#[test]
fn active_count_never_decreases_nor_exceeds_total() {
    let config = config();
    let catalog = config.catalog();
    let policy = ActivationPolicy::from_catalog(&catalog);
    let mut planner = ActivationPlanner::new(7);
    let mut registry = FakeRegistry::new(&[("spring", 9)]);
    let mut previous = 0;

    for level in 1..=8 {
        let mut commands = Vec::new();
        planner.plan(
            Level::new(level),
            &policy,
            &catalog,
            &registry.snapshots,
            &mut commands,
        );
        registry.apply(commands);
        let active = registry.active("spring");
        assert!(active >= previous, "level {level} lowered active count");
        assert!(active <= 9, "level {level} exceeded available markers");
        previous = active;
    }
    assert_eq!(previous, 9);
}

#[test]
fn second_level_adds_only_the_difference() {
    let first = run_levels(11, 1, &[("spring", 10)]);
    assert_eq!(first.active("spring"), 2);

    let second = run_levels(11, 2, &[("spring", 10)]);
    assert_eq!(second.active("spring"), 5);
    assert_eq!(&second.activated[..2], &first.activated[..]);
}

#[test]
fn miniboss_is_activated_once_after_unlock() {
    let registry = run_levels(3, 6, &[("spring", 20)]);
    let minibosses: Vec<_> = registry
        .activated
        .iter()
        .filter(|(_, _, kind, _)| *kind == SpawnerKind::Miniboss)
        .collect();
    assert_eq!(minibosses.len(), 1);
    assert_eq!(minibosses[0].3, ArchetypeSetId::new("brute"));
}

#[test]
fn shortfall_is_absorbed_when_markers_run_out() {
    let registry = run_levels(5, 3, &[("spring", 3)]);
    assert_eq!(registry.active("spring"), 3);
    let markers: BTreeSet<MarkerId> = registry
        .activated
        .iter()
        .map(|(_, marker, _, _)| *marker)
        .collect();
    assert_eq!(markers.len(), 3);
}

#[test]
fn category_without_archetype_sets_activates_nothing() {
    let registry = run_levels(5, 2, &[("barren", 4)]);
    assert_eq!(registry.active("barren"), 0);
}

#[test]
fn same_seed_plans_same_activations() {
    let first = run_levels(99, 5, &[("spring", 12)]);
    let second = run_levels(99, 5, &[("spring", 12)]);
    assert_eq!(first.activated, second.activated);
}
