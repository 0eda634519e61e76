#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative marker registry for the Siege wave scheduler.
//!
//! The registry owns every discovered spawn marker, the live spawners created
//! from activated markers, and the persisted activation records that let a
//! reloaded scene rebuild exactly the same spawners. All mutations flow through
//! [`apply`]; read access goes through the [`query`] module.

mod discovery;
mod persistence;
mod placement;

pub use discovery::SceneObject;
pub use persistence::{ActivationStore, FileActivationStore, MemoryActivationStore, StoreError};
pub use placement::{FallbackSurface, FlatGround, SurfaceProbe, Terrain};

use std::collections::{BTreeMap, HashMap};

use glam::{Quat, Vec3};
use siege_core::{
    decode_records, encode_records, ActivationRecord, ArchetypeSetId, Category, Command, Event,
    MarkerId, MarkerKey, Placement, SiegeConfig, SpawnerId, SpawnerKind, WaveCatalog,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Authored location eligible to become a spawner.
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub(crate) id: MarkerId,
    pub(crate) category: Category,
    pub(crate) name: String,
    pub(crate) key: MarkerKey,
    pub(crate) position: Vec3,
    pub(crate) orientation: Quat,
}

impl Marker {
    /// Identifier assigned at discovery.
    #[must_use]
    pub const fn id(&self) -> MarkerId {
        self.id
    }

    /// Category the marker was classified into.
    #[must_use]
    pub fn category(&self) -> &Category {
        &self.category
    }

    /// Name of the scene object the marker came from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable identity used by persisted records.
    #[must_use]
    pub fn key(&self) -> &MarkerKey {
        &self.key
    }

    /// Authored world-space position.
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Authored world-space orientation.
    #[must_use]
    pub const fn orientation(&self) -> Quat {
        self.orientation
    }
}

/// Live spawner that replaced an activated marker.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveSpawner {
    id: SpawnerId,
    marker: MarkerId,
    category: Category,
    kind: SpawnerKind,
    archetype_set: ArchetypeSetId,
    placement: Placement,
}

impl ActiveSpawner {
    /// Identifier of the spawner.
    #[must_use]
    pub const fn id(&self) -> SpawnerId {
        self.id
    }

    /// Marker the spawner was created from.
    #[must_use]
    pub const fn marker(&self) -> MarkerId {
        self.marker
    }

    /// Category of the originating marker.
    #[must_use]
    pub fn category(&self) -> &Category {
        &self.category
    }

    /// Normal or miniboss.
    #[must_use]
    pub const fn kind(&self) -> SpawnerKind {
        self.kind
    }

    /// Archetype set chosen when the marker was activated.
    #[must_use]
    pub fn archetype_set(&self) -> &ArchetypeSetId {
        &self.archetype_set
    }

    /// Ground-snapped position and facing.
    #[must_use]
    pub const fn placement(&self) -> Placement {
        self.placement
    }
}

/// Failures surfaced by registry mutations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The command referenced a marker the registry never discovered.
    #[error("marker {0:?} is not known to the registry")]
    UnknownMarker(MarkerId),
    /// The activation records could not be loaded or written through.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Authoritative state of every marker and live spawner in one scene.
#[derive(Debug)]
pub struct Registry {
    scene: String,
    markers: Vec<Marker>,
    by_key: HashMap<MarkerKey, MarkerId>,
    spawners: BTreeMap<SpawnerId, ActiveSpawner>,
    activated: HashMap<MarkerId, SpawnerId>,
    records: Vec<ActivationRecord>,
    next_spawner: u32,
    store: Box<dyn ActivationStore>,
    terrain: Terrain,
    probe_distance: f32,
}

impl Registry {
    /// Scans the authored scene objects and builds a registry for `scene`.
    ///
    /// Nothing is activated yet; call [`Registry::restore`] before gameplay starts
    /// to rebuild spawners persisted by a previous run.
    #[must_use]
    pub fn discover(
        scene: impl Into<String>,
        objects: &[SceneObject],
        config: &SiegeConfig,
        store: Box<dyn ActivationStore>,
        terrain: Terrain,
    ) -> Self {
        let scene = scene.into();
        let mut markers = Vec::new();
        let mut by_key = HashMap::new();
        for candidate in discovery::classify(objects, config) {
            if by_key.contains_key(&candidate.key) {
                warn!(key = %candidate.key, "duplicate_marker_key_skipped");
                continue;
            }
            let id = MarkerId::new(markers.len() as u32);
            let _ = by_key.insert(candidate.key.clone(), id);
            markers.push(Marker {
                id,
                category: candidate.category,
                name: candidate.name,
                key: candidate.key,
                position: candidate.position,
                orientation: candidate.orientation,
            });
        }

        info!(scene = %scene, markers = markers.len(), "markers_discovered");
        Self {
            scene,
            markers,
            by_key,
            spawners: BTreeMap::new(),
            activated: HashMap::new(),
            records: Vec::new(),
            next_spawner: 0,
            store,
            terrain,
            probe_distance: config.placement.probe_distance,
        }
    }

    /// Converts a marker into a live spawner.
    ///
    /// Activating an already activated marker returns the existing spawner and
    /// leaves the persisted records untouched. When the write-through fails the
    /// spawner still exists in memory and the store error is returned.
    pub fn activate(
        &mut self,
        marker: MarkerId,
        kind: SpawnerKind,
        archetype_set: ArchetypeSetId,
        out_events: &mut Vec<Event>,
    ) -> Result<SpawnerId, RegistryError> {
        if let Some(existing) = self.activated.get(&marker) {
            return Ok(*existing);
        }
        if self.marker(marker).is_none() {
            return Err(RegistryError::UnknownMarker(marker));
        }

        let spawner = self.create_spawner(marker, kind, archetype_set, out_events);
        self.persist()?;
        Ok(spawner)
    }

    /// Rebuilds the spawners persisted for this scene.
    ///
    /// Records that no longer decode, point at a marker missing from the scene,
    /// disagree with the marker's category, or name an unknown archetype set are
    /// dropped, and the store is rewritten without them.
    pub fn restore(
        &mut self,
        catalog: &WaveCatalog,
        out_events: &mut Vec<Event>,
    ) -> Result<Vec<SpawnerId>, RegistryError> {
        let encoded = self.store.load(&self.scene).map_err(|error| {
            warn!(scene = %self.scene, error = %error, "activation_store_read_failed");
            error
        })?;
        let Some(encoded) = encoded else {
            return Ok(Vec::new());
        };

        let decoded = decode_records(&encoded);
        let mut dirty = !decoded.rejected.is_empty();
        for error in &decoded.rejected {
            warn!(scene = %self.scene, error = %error, "activation_record_malformed");
        }

        let mut restored = Vec::new();
        for record in decoded.records {
            let Some(marker) = self.by_key.get(record.key()).copied() else {
                warn!(record = %record, "stale_activation_record_dropped");
                dirty = true;
                continue;
            };
            if self.activated.contains_key(&marker) {
                warn!(record = %record, "duplicate_activation_record_dropped");
                dirty = true;
                continue;
            }
            let category_matches = self
                .marker(marker)
                .is_some_and(|found| found.category == *record.category());
            let kind = catalog
                .category(record.category())
                .and_then(|config| config.archetype_set(record.archetype_set()))
                .map(|(kind, _)| kind);
            let (true, Some(kind)) = (category_matches, kind) else {
                warn!(record = %record, "stale_activation_record_dropped");
                dirty = true;
                continue;
            };

            let set = record.archetype_set().clone();
            restored.push(self.create_spawner(marker, kind, set, out_events));
        }

        info!(scene = %self.scene, restored = restored.len(), "activations_restored");
        if dirty {
            self.persist()?;
        }
        Ok(restored)
    }

    /// Destroys every spawner and erases the persisted records of this scene.
    ///
    /// Markers become available for activation again.
    pub fn reset(&mut self, out_events: &mut Vec<Event>) -> Result<(), RegistryError> {
        self.spawners.clear();
        self.activated.clear();
        self.records.clear();
        out_events.push(Event::ActivationsReset);
        info!(scene = %self.scene, "activations_reset");
        self.persist()
    }

    fn create_spawner(
        &mut self,
        marker_id: MarkerId,
        kind: SpawnerKind,
        archetype_set: ArchetypeSetId,
        out_events: &mut Vec<Event>,
    ) -> SpawnerId {
        let index = marker_id.get() as usize;
        let marker = &self.markers[index];
        let placement = self.terrain.place(marker, self.probe_distance);
        let category = marker.category.clone();
        let record = ActivationRecord::new(category.clone(), marker.key.clone(), archetype_set.clone());

        let id = SpawnerId::new(self.next_spawner);
        self.next_spawner = self.next_spawner.saturating_add(1);
        let _ = self.spawners.insert(
            id,
            ActiveSpawner {
                id,
                marker: marker_id,
                category: category.clone(),
                kind,
                archetype_set: archetype_set.clone(),
                placement,
            },
        );
        let _ = self.activated.insert(marker_id, id);
        self.records.push(record);

        debug!(
            spawner = id.get(),
            marker = marker_id.get(),
            category = %category,
            ?kind,
            set = %archetype_set,
            "marker_activated"
        );
        out_events.push(Event::MarkerActivated {
            spawner: id,
            marker: marker_id,
            category,
            kind,
            archetype_set,
        });
        id
    }

    fn persist(&mut self) -> Result<(), RegistryError> {
        let encoded = encode_records(&self.records);
        self.store.save(&self.scene, &encoded).map_err(|error| {
            warn!(scene = %self.scene, error = %error, "activation_store_write_failed");
            RegistryError::Store(error)
        })
    }

    fn marker(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(id.get() as usize)
    }
}

/// Applies the provided command to the registry, broadcasting resulting events.
///
/// Failures are logged; the in-memory state keeps whatever the command achieved.
pub fn apply(registry: &mut Registry, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::ActivateMarker {
            marker,
            kind,
            archetype_set,
        } => {
            if let Err(error) = registry.activate(marker, kind, archetype_set, out_events) {
                warn!(marker = marker.get(), error = %error, "activate_marker_failed");
            }
        }
        Command::ResetActivations => {
            if let Err(error) = registry.reset(out_events) {
                warn!(error = %error, "reset_activations_failed");
            }
        }
    }
}

/// Read-only queries over the registry.
pub mod query {
    use std::collections::BTreeMap;

    use siege_core::{ActivationRecord, Category, MarkerId, SpawnerId, SpawnerKind};

    use super::{ActiveSpawner, Marker, Registry};

    /// Scene the registry was built for.
    #[must_use]
    pub fn scene(registry: &Registry) -> &str {
        &registry.scene
    }

    /// Markers that have not been activated yet, grouped by category in discovery order.
    #[must_use]
    pub fn available_markers(registry: &Registry) -> BTreeMap<Category, Vec<MarkerId>> {
        let mut available: BTreeMap<Category, Vec<MarkerId>> = BTreeMap::new();
        for marker in &registry.markers {
            if !registry.activated.contains_key(&marker.id) {
                available
                    .entry(marker.category.clone())
                    .or_default()
                    .push(marker.id);
            }
        }
        available
    }

    /// Looks up a discovered marker.
    #[must_use]
    pub fn marker(registry: &Registry, id: MarkerId) -> Option<&Marker> {
        registry.marker(id)
    }

    /// Number of markers discovered for `category`, activated or not.
    #[must_use]
    pub fn count_total(registry: &Registry, category: &Category) -> u32 {
        registry
            .markers
            .iter()
            .filter(|marker| &marker.category == category)
            .count() as u32
    }

    /// Number of live spawners of `category`, of either kind.
    #[must_use]
    pub fn count_active(registry: &Registry, category: &Category) -> u32 {
        registry
            .spawners
            .values()
            .filter(|spawner| &spawner.category == category)
            .count() as u32
    }

    /// Number of live spawners of `category` and `kind`.
    #[must_use]
    pub fn count_active_of_kind(registry: &Registry, category: &Category, kind: SpawnerKind) -> u32 {
        registry
            .spawners
            .values()
            .filter(|spawner| &spawner.category == category && spawner.kind == kind)
            .count() as u32
    }

    /// Live spawners ordered by identifier.
    pub fn spawners(registry: &Registry) -> impl Iterator<Item = &ActiveSpawner> {
        registry.spawners.values()
    }

    /// Looks up a live spawner.
    #[must_use]
    pub fn spawner(registry: &Registry, id: SpawnerId) -> Option<&ActiveSpawner> {
        registry.spawners.get(&id)
    }

    /// Activation records in activation order, as last written through.
    #[must_use]
    pub fn records(registry: &Registry) -> &[ActivationRecord] {
        &registry.records
    }
}
