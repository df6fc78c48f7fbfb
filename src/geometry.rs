// src/geometry.rs
//! Stateless vector helpers shared by the formation code.
//!
//! Conventions: heading is a yaw in radians about +Y, heading 0 faces +Z, and a
//! positive lateral offset lands on the right-hand side of the direction of travel.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::terrain::surface::{probe_surface, SurfaceQuery};

// ---------- Layers ----------

/// Which kind of surface a downward query hit. Every surface belongs to exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceLayer {
    Terrain,
    Obstacle,
    Other,
}

impl SurfaceLayer {
    pub const fn mask(self) -> LayerMask {
        match self {
            SurfaceLayer::Terrain => LayerMask::TERRAIN,
            SurfaceLayer::Obstacle => LayerMask::OBSTACLE,
            SurfaceLayer::Other => LayerMask::OTHER,
        }
    }
}

/// Bitmask filter over `SurfaceLayer`s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: Self = Self(0);
    pub const TERRAIN: Self = Self(1 << 0);
    pub const OBSTACLE: Self = Self(1 << 1);
    pub const OTHER: Self = Self(1 << 2);
    pub const TERRAIN_AND_OBSTACLES: Self = Self(Self::TERRAIN.0 | Self::OBSTACLE.0);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// True if `layer` passes this filter.
    pub fn includes(self, layer: SurfaceLayer) -> bool {
        self.contains(layer.mask())
    }
}

// ---------- Vectors ----------

/// Perpendicular on the XZ plane, clockwise seen from above. Drops Y.
#[inline]
pub fn rotate_90_cw(dir: Vec3) -> Vec3 {
    Vec3::new(dir.z, 0.0, -dir.x)
}

/// Perpendicular on the XZ plane, counter-clockwise seen from above. Drops Y.
#[inline]
pub fn rotate_90_ccw(dir: Vec3) -> Vec3 {
    Vec3::new(-dir.z, 0.0, dir.x)
}

/// Unit forward vector for a heading.
#[inline]
pub fn heading_forward(heading: f32) -> Vec3 {
    Quat::from_rotation_y(heading) * Vec3::Z
}

/// Turns a 2D shape offset (x = lateral, y = forward) into a world-space
/// displacement for an origin facing `heading`.
#[inline]
pub fn rotate_offset(offset: Vec2, heading: f32) -> Vec3 {
    Quat::from_rotation_y(heading) * Vec3::new(offset.x, 0.0, offset.y)
}

/// Rigid placement of `offset` relative to an origin pose, ignoring terrain.
#[inline]
pub fn rigid_offset_position(origin: Vec3, heading: f32, offset: Vec2) -> Vec3 {
    origin + rotate_offset(offset, heading)
}

/// Rigid offset placement snapped onto whatever `mask` lets the query hit.
/// Returns `None` when nothing is below the offset point.
pub fn offset_position_on_surface(
    origin: Vec3,
    heading: f32,
    offset: Vec2,
    surface: &dyn SurfaceQuery,
    mask: LayerMask,
) -> Option<Vec3> {
    let candidate = rigid_offset_position(origin, heading, offset);
    probe_surface(surface, candidate, mask).map(|hit| hit.point)
}

/// Heading that looks from `from` to `to` about the vertical axis only.
/// `None` when the two points coincide on the XZ plane.
pub fn yaw_towards(from: Vec3, to: Vec3) -> Option<f32> {
    let d = to - from;
    if d.x.abs() < f32::EPSILON && d.z.abs() < f32::EPSILON {
        return None;
    }
    Some(d.x.atan2(d.z))
}

/// Rotates `dir` about +Y by `degrees`.
#[inline]
pub fn rotate_about_y_deg(dir: Vec3, degrees: f32) -> Vec3 {
    Quat::from_rotation_y(degrees.to_radians()) * dir
}
