//! Ground-snapped placement of activated markers.

use std::fmt;

use glam::{EulerRot, Vec3};
use sha2::{Digest, Sha256};
use siege_core::{MarkerKey, Placement};
use tracing::debug;

use crate::Marker;

const FULL_TURN_MILLIDEGREES: u64 = 360_000;

/// Finds the surface below a point, the way a downward ray cast would.
pub trait SurfaceProbe: fmt::Debug {
    /// Returns the first supporting point at most `max_distance` below `origin`.
    fn probe_down(&self, origin: Vec3, max_distance: f32) -> Option<Vec3>;
}

/// Supplies a surface point when the probe misses.
pub trait FallbackSurface: fmt::Debug {
    /// Returns a surface point near `near`.
    fn sample(&self, near: Vec3) -> Vec3;
}

/// Infinite horizontal plane at a fixed height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlatGround {
    height: f32,
}

impl FlatGround {
    /// Creates a plane at the provided height.
    #[must_use]
    pub const fn new(height: f32) -> Self {
        Self { height }
    }
}

impl SurfaceProbe for FlatGround {
    fn probe_down(&self, origin: Vec3, max_distance: f32) -> Option<Vec3> {
        let drop = origin.y - self.height;
        if (0.0..=max_distance).contains(&drop) {
            Some(Vec3::new(origin.x, self.height, origin.z))
        } else {
            None
        }
    }
}

impl FallbackSurface for FlatGround {
    fn sample(&self, near: Vec3) -> Vec3 {
        Vec3::new(near.x, self.height, near.z)
    }
}

/// Surface queries used to place spawners on the ground.
#[derive(Debug)]
pub struct Terrain {
    probe: Box<dyn SurfaceProbe>,
    fallback: Box<dyn FallbackSurface>,
}

impl Terrain {
    /// Combines a probe with the fallback used when it misses.
    #[must_use]
    pub fn new(probe: Box<dyn SurfaceProbe>, fallback: Box<dyn FallbackSurface>) -> Self {
        Self { probe, fallback }
    }

    /// Terrain made of a single flat plane.
    #[must_use]
    pub fn flat(height: f32) -> Self {
        Self::new(
            Box::new(FlatGround::new(height)),
            Box::new(FlatGround::new(height)),
        )
    }

    pub(crate) fn place(&self, marker: &Marker, probe_distance: f32) -> Placement {
        let position = match self.probe.probe_down(marker.position, probe_distance) {
            Some(hit) => hit,
            None => {
                debug!(marker = marker.id.get(), "placement_probe_missed");
                self.fallback.sample(marker.position)
            }
        };

        let (marker_yaw, _, _) = marker.orientation.to_euler(EulerRot::YXZ);
        let yaw_degrees = wrap_degrees(marker_yaw.to_degrees() + variety_yaw(&marker.key));

        Placement {
            position,
            yaw_degrees,
        }
    }
}

/// Wraps an angle into `[0, 360)`.
fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    // Tiny negative inputs round up to exactly one full turn.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Yaw offset derived from the marker key, so a restored spawner faces the same
/// way it did before the reload.
fn variety_yaw(key: &MarkerKey) -> f32 {
    let mut hasher = Sha256::new();
    hasher.update(key.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    let millidegrees = u64::from_le_bytes(bytes) % FULL_TURN_MILLIDEGREES;
    millidegrees as f32 / 1_000.0
}
