// src/terrain/surface.rs
//! The downward surface query the formation code relies on for terrain snapping
//! and obstacle classification.

use bevy::prelude::*;

use crate::geometry::{LayerMask, SurfaceLayer};

/// How far above a candidate point the downward query starts.
pub const RAY_HEIGHT: f32 = 1000.0;

/// First surface a downward query touched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceHit {
    pub point: Vec3,
    pub layer: SurfaceLayer,
}

impl SurfaceHit {
    pub fn is_terrain(&self) -> bool {
        self.layer == SurfaceLayer::Terrain
    }
}

/// Vertical ray query against the world's surfaces (required).
pub trait SurfaceQuery: Send + Sync + 'static {
    /// Casts straight down from `origin`, considering only surfaces whose layer
    /// passes `filter`. Returns the highest surface at or below `origin.y`.
    fn cast_down(&self, origin: Vec3, filter: LayerMask) -> Option<SurfaceHit>;
}

/// Casts down from high above `point`.
#[inline]
pub fn probe_surface(
    surface: &dyn SurfaceQuery,
    point: Vec3,
    filter: LayerMask,
) -> Option<SurfaceHit> {
    surface.cast_down(point + Vec3::Y * RAY_HEIGHT, filter)
}

/// Infinite terrain plane at a fixed height. Handy for tests and bare demos.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatSurface {
    pub height: f32,
}

impl SurfaceQuery for FlatSurface {
    fn cast_down(&self, origin: Vec3, filter: LayerMask) -> Option<SurfaceHit> {
        if !filter.includes(SurfaceLayer::Terrain) || origin.y < self.height {
            return None;
        }
        Some(SurfaceHit {
            point: Vec3::new(origin.x, self.height, origin.z),
            layer: SurfaceLayer::Terrain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_surface_respects_filter() {
        let flat = FlatSurface { height: 2.0 };
        let hit = probe_surface(&flat, Vec3::new(3.0, 0.0, -1.0), LayerMask::TERRAIN).unwrap();
        assert_eq!(hit.point, Vec3::new(3.0, 2.0, -1.0));
        assert!(hit.is_terrain());
        assert!(probe_surface(&flat, Vec3::ZERO, LayerMask::OBSTACLE).is_none());
    }
}
