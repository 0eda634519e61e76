//! Classification of authored scene objects into spawn markers.

use glam::{Quat, Vec3};
use serde::Deserialize;
use siege_core::{contains_reserved, Category, MarkerKey, MarkerMatch, SiegeConfig};
use tracing::{debug, warn};

/// Object placed in an authored scene, as reported by the host at startup.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SceneObject {
    /// Display name of the object.
    pub name: String,
    /// Optional tag attached to the object.
    #[serde(default)]
    pub tag: Option<String>,
    /// Stable path of the object inside the scene hierarchy.
    pub hierarchy_path: String,
    /// World-space position.
    pub position: Vec3,
    /// World-space orientation.
    #[serde(default)]
    pub orientation: Quat,
}

/// Marker recognised during discovery, before ids are assigned.
#[derive(Debug)]
pub(crate) struct Candidate {
    pub(crate) category: Category,
    pub(crate) name: String,
    pub(crate) key: MarkerKey,
    pub(crate) position: Vec3,
    pub(crate) orientation: Quat,
}

/// Picks every object matching a category pattern, first category in
/// configuration order winning.
pub(crate) fn classify(objects: &[SceneObject], config: &SiegeConfig) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for object in objects {
        let Some(category) = config
            .categories
            .iter()
            .find(|category| matches(object, &category.marker_pattern, config.discovery.match_by))
        else {
            continue;
        };

        if contains_reserved(&object.hierarchy_path) {
            warn!(
                path = %object.hierarchy_path,
                category = %category.name,
                "marker_path_contains_reserved_character"
            );
            continue;
        }

        debug!(path = %object.hierarchy_path, category = %category.name, "marker_discovered");
        candidates.push(Candidate {
            category: category.name.clone(),
            name: object.name.clone(),
            key: MarkerKey::new(object.hierarchy_path.clone(), object.position),
            position: object.position,
            orientation: object.orientation,
        });
    }
    candidates
}

fn matches(object: &SceneObject, pattern: &str, strategy: MarkerMatch) -> bool {
    match strategy {
        MarkerMatch::Name => object.name.contains(pattern),
        MarkerMatch::Tag => object.tag.as_deref() == Some(pattern),
    }
}
