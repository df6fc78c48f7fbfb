// src/terrain/heightfield.rs
//! In-memory heightfield with obstacle footprints. Implements `SurfaceQuery`
//! for the demo and for tests.

use bevy::math::{UVec2, Vec2};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::surface::{SurfaceHit, SurfaceQuery};
use crate::config::ConfigError;
use crate::geometry::{LayerMask, SurfaceLayer};

// ---------- Obstacles ----------

/// XZ footprint of an obstacle, in world space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Footprint {
    /// Circle around `center` with radius `r`.
    Circle { center: Vec2, r: f32 },
    /// Axis-aligned rectangle with half-extents `half`.
    Rect { center: Vec2, half: Vec2 },
}

impl Footprint {
    pub fn contains_xz(&self, p: Vec2) -> bool {
        match self {
            Footprint::Circle { center, r } => p.distance_squared(*center) <= r * r,
            Footprint::Rect { center, half } => {
                let d = (p - *center).abs();
                d.x <= half.x && d.y <= half.y
            }
        }
    }
}

/// Something followers cannot stand on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub footprint: Footprint,
    /// World Y of the obstacle's top surface.
    pub top: f32,
}

// ---------- Heightfield ----------

/// Row-major height grid spanning `origin .. origin + size` on XZ.
#[derive(Clone, Debug)]
pub struct HeightfieldTerrain {
    /// World-space origin of the terrain (min X, min Z)
    pub origin: Vec2,
    /// Size of the terrain in world units (X, Z)
    pub size: Vec2,
    /// Grid samples along X and Z (at least 2x2); fixed with `heights`.
    resolution: UVec2,
    heights: Vec<f32>,
    obstacles: Vec<Obstacle>,
}

impl HeightfieldTerrain {
    /// Level terrain at `height`.
    pub fn flat(origin: Vec2, size: Vec2, height: f32) -> Self {
        Self {
            origin,
            size,
            resolution: UVec2::splat(2),
            heights: vec![height; 4],
            obstacles: Vec::new(),
        }
    }

    pub fn from_heights(
        origin: Vec2,
        size: Vec2,
        resolution: UVec2,
        heights: Vec<f32>,
    ) -> Result<Self, ConfigError> {
        if resolution.x < 2 || resolution.y < 2 {
            return Err(ConfigError::Invalid(format!(
                "heightfield resolution must be at least 2x2, got {}x{}",
                resolution.x, resolution.y
            )));
        }
        let expected = (resolution.x * resolution.y) as usize;
        if heights.len() != expected {
            return Err(ConfigError::Invalid(format!(
                "heightfield expects {} samples, got {}",
                expected,
                heights.len()
            )));
        }
        if size.x <= 0.0 || size.y <= 0.0 {
            return Err(ConfigError::Invalid("heightfield size must be positive".into()));
        }
        Ok(Self { origin, size, resolution, heights, obstacles: Vec::new() })
    }

    /// Samples `f(x, z)` at every grid vertex.
    pub fn from_fn(
        origin: Vec2,
        size: Vec2,
        resolution: UVec2,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<Self, ConfigError> {
        let res = resolution.max(UVec2::splat(2));
        let step = size / (res - UVec2::ONE).as_vec2();
        let mut heights = Vec::with_capacity((res.x * res.y) as usize);
        for j in 0..res.y {
            for i in 0..res.x {
                let x = origin.x + i as f32 * step.x;
                let z = origin.y + j as f32 * step.y;
                heights.push(f(x, z));
            }
        }
        Self::from_heights(origin, size, res, heights)
    }

    pub fn with_obstacles(mut self, obstacles: impl IntoIterator<Item = Obstacle>) -> Self {
        self.obstacles.extend(obstacles);
        self
    }

    pub fn add_obstacle(&mut self, obstacle: Obstacle) {
        self.obstacles.push(obstacle);
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn resolution(&self) -> UVec2 {
        self.resolution
    }

    #[inline]
    fn get_clamped(&self, x: i32, z: i32) -> f32 {
        let xi = x.clamp(0, self.resolution.x as i32 - 1) as u32;
        let zi = z.clamp(0, self.resolution.y as i32 - 1) as u32;
        self.heights[(zi * self.resolution.x + xi) as usize]
    }

    /// Bilinear ground height at world (x, z). `None` outside the terrain.
    pub fn sample_height(&self, world_x: f32, world_z: f32) -> Option<f32> {
        let lx = world_x - self.origin.x;
        let lz = world_z - self.origin.y;
        if lx < 0.0 || lz < 0.0 || lx > self.size.x || lz > self.size.y {
            return None;
        }

        let max_x = self.resolution.x as i32 - 1;
        let max_z = self.resolution.y as i32 - 1;
        let px = (lx / self.size.x).clamp(0.0, 1.0) * max_x as f32;
        let pz = (lz / self.size.y).clamp(0.0, 1.0) * max_z as f32;

        let x0 = px.floor() as i32;
        let z0 = pz.floor() as i32;
        let x1 = (x0 + 1).min(max_x);
        let z1 = (z0 + 1).min(max_z);
        let dx = px - x0 as f32;
        let dz = pz - z0 as f32;

        let a = self.get_clamped(x0, z0) * (1.0 - dx) + self.get_clamped(x1, z0) * dx;
        let b = self.get_clamped(x0, z1) * (1.0 - dx) + self.get_clamped(x1, z1) * dx;
        Some(a * (1.0 - dz) + b * dz)
    }
}

impl SurfaceQuery for HeightfieldTerrain {
    fn cast_down(&self, origin: Vec3, filter: LayerMask) -> Option<SurfaceHit> {
        let xz = Vec2::new(origin.x, origin.z);
        let mut best: Option<SurfaceHit> = None;
        let mut consider = |y: f32, layer: SurfaceLayer| {
            if y > origin.y {
                return;
            }
            if best.map_or(true, |b| y > b.point.y) {
                best = Some(SurfaceHit { point: Vec3::new(origin.x, y, origin.z), layer });
            }
        };

        if filter.includes(SurfaceLayer::Terrain) {
            if let Some(h) = self.sample_height(origin.x, origin.z) {
                consider(h, SurfaceLayer::Terrain);
            }
        }
        if filter.includes(SurfaceLayer::Obstacle) {
            for obstacle in self.obstacles.iter().filter(|o| o.footprint.contains_xz(xz)) {
                consider(obstacle.top, SurfaceLayer::Obstacle);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::surface::probe_surface;

    fn ramp() -> HeightfieldTerrain {
        // height = x / 10 over a 100 x 100 field
        HeightfieldTerrain::from_fn(Vec2::ZERO, Vec2::splat(100.0), UVec2::new(11, 11), |x, _| x / 10.0)
            .unwrap()
    }

    #[test]
    fn bilinear_sampling_matches_linear_ramp() {
        let t = ramp();
        assert_eq!(t.resolution(), UVec2::new(11, 11));
        assert!((t.sample_height(0.0, 50.0).unwrap() - 0.0).abs() < 1e-4);
        assert!((t.sample_height(35.0, 12.0).unwrap() - 3.5).abs() < 1e-4);
        assert!((t.sample_height(100.0, 100.0).unwrap() - 10.0).abs() < 1e-4);
        assert!(t.sample_height(-0.5, 5.0).is_none());
        assert!(t.sample_height(5.0, 100.5).is_none());
    }

    #[test]
    fn wrong_sample_count_is_rejected() {
        let err = HeightfieldTerrain::from_heights(Vec2::ZERO, Vec2::ONE, UVec2::new(3, 3), vec![0.0; 8]);
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn obstacle_classification_depends_on_filter() {
        let t = HeightfieldTerrain::flat(Vec2::ZERO, Vec2::splat(20.0), 0.0).with_obstacles([Obstacle {
            footprint: Footprint::Circle { center: Vec2::new(10.0, 10.0), r: 2.0 },
            top: 3.0,
        }]);

        let on_rock = Vec3::new(10.5, 0.0, 10.0);
        let hit = probe_surface(&t, on_rock, LayerMask::TERRAIN_AND_OBSTACLES).unwrap();
        assert_eq!(hit.layer, SurfaceLayer::Obstacle);
        assert!((hit.point.y - 3.0).abs() < 1e-6);

        let ground = probe_surface(&t, on_rock, LayerMask::TERRAIN).unwrap();
        assert!(ground.is_terrain());
        assert!(ground.point.y.abs() < 1e-6);

        let open = probe_surface(&t, Vec3::new(1.0, 0.0, 1.0), LayerMask::TERRAIN_AND_OBSTACLES).unwrap();
        assert!(open.is_terrain());

        assert!(probe_surface(&t, Vec3::new(30.0, 0.0, 1.0), LayerMask::TERRAIN_AND_OBSTACLES).is_none());
    }

    #[test]
    fn rect_footprint_contains() {
        let f = Footprint::Rect { center: Vec2::new(1.0, 1.0), half: Vec2::new(2.0, 0.5) };
        assert!(f.contains_xz(Vec2::new(2.9, 1.4)));
        assert!(!f.contains_xz(Vec2::new(1.0, 1.6)));
    }
}
