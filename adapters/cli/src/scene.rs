//! Loading of configuration and authored scene files.

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use siege_core::SiegeConfig;
use siege_world::SceneObject;

const SUPPORTED_SCENE_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
struct SceneFile {
    version: u32,
    #[serde(default)]
    ground_height: f32,
    #[serde(default)]
    objects: Vec<SceneObject>,
}

/// Objects of an authored scene plus the height of its flat ground.
#[derive(Debug)]
pub(crate) struct AuthoredScene {
    pub(crate) ground_height: f32,
    pub(crate) objects: Vec<SceneObject>,
}

/// Reads and validates the scheduler configuration.
pub(crate) fn load_config(path: &Path) -> Result<SiegeConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration at {}", path.display()))?;
    let config: SiegeConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse configuration at {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid configuration at {}", path.display()))?;
    Ok(config)
}

/// Reads the objects placed in an authored scene.
pub(crate) fn load_scene(path: &Path) -> Result<AuthoredScene> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene markers at {}", path.display()))?;
    parse_scene(&contents).with_context(|| format!("invalid scene file {}", path.display()))
}

fn parse_scene(contents: &str) -> Result<AuthoredScene> {
    let file: SceneFile = toml::from_str(contents).context("failed to parse scene toml contents")?;
    if file.version != SUPPORTED_SCENE_VERSION {
        bail!(
            "unsupported scene file version {}; expected {}",
            file.version,
            SUPPORTED_SCENE_VERSION
        );
    }
    Ok(AuthoredScene {
        ground_height: file.ground_height,
        objects: file.objects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_objects_with_default_orientation() {
        let scene = parse_scene(
            r#"
            version = 1
            ground_height = -0.5

            [[objects]]
            name = "SpringSpawn (1)"
            hierarchy_path = "Arena/Spawns/SpringSpawn (1)"
            position = [1.0, 3.0, -2.0]
            "#,
        )
        .expect("scene parses");
        assert_eq!(scene.ground_height, -0.5);
        assert_eq!(scene.objects.len(), 1);
        assert_eq!(scene.objects[0].tag, None);
    }

    #[test]
    fn bundled_demo_assets_load() {
        let assets = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets");
        let config = load_config(&assets.join("siege.toml")).expect("demo config is valid");
        assert_eq!(config.categories.len(), 2);
        let scene = load_scene(&assets.join("arena_markers.toml")).expect("demo scene parses");
        assert_eq!(scene.objects.len(), 9);
    }

    #[test]
    fn rejects_unknown_version() {
        let error = parse_scene("version = 2").expect_err("version 2 is unsupported");
        assert!(error.to_string().contains("unsupported scene file version"));
    }
}
