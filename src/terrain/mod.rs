// src/terrain/mod.rs

pub mod heightfield;
pub mod surface;

pub use heightfield::{Footprint, HeightfieldTerrain, Obstacle};
pub use surface::{probe_surface, FlatSurface, SurfaceHit, SurfaceQuery, RAY_HEIGHT};
