// src/config.rs
//! Formation settings and the demo scenario description, both RON.

use std::path::Path;

use bevy::math::{UVec2, Vec2};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::formation::follower::FollowerSettings;
use crate::formation::shape::{JitterSettings, ShapeKind, ShapeSpec};
use crate::formation::triggers::FormationTrigger;
use crate::terrain::heightfield::{HeightfieldTerrain, Obstacle};

// ---------- Formation settings ----------

/// Everything a formation needs at build time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormationSettings {
    #[serde(default = "default_shape")]
    pub shape: ShapeSpec,
    #[serde(default)]
    pub jitter: JitterSettings,
    #[serde(default)]
    pub follower: FollowerSettings,
    /// Fixed simulation step in seconds.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: f32,
    /// Root seed for jitter and evasion randomness.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// History covers `safety * deepest slot / tick` samples.
    #[serde(default = "default_history_safety_factor")]
    pub history_safety_factor: f32,
}

fn default_shape() -> ShapeSpec {
    ShapeSpec::new(ShapeKind::SingleFile, 2.0, 0)
}
fn default_tick_seconds() -> f32 {
    0.02
}
fn default_seed() -> u64 {
    1337
}
fn default_history_safety_factor() -> f32 {
    3.0
}

impl Default for FormationSettings {
    fn default() -> Self {
        Self {
            shape: default_shape(),
            jitter: JitterSettings::default(),
            follower: FollowerSettings::default(),
            tick_seconds: default_tick_seconds(),
            seed: default_seed(),
            history_safety_factor: default_history_safety_factor(),
        }
    }
}

impl FormationSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_seconds.is_finite() && self.tick_seconds > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tick_seconds must be positive, got {}",
                self.tick_seconds
            )));
        }
        if !(self.shape.spacing.is_finite() && self.shape.spacing > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "shape spacing must be positive, got {}",
                self.shape.spacing
            )));
        }
        if self.jitter.strength < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "jitter strength cannot be negative, got {}",
                self.jitter.strength
            )));
        }
        if self.history_safety_factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "history_safety_factor must be at least 1, got {}",
                self.history_safety_factor
            )));
        }
        if self.follower.catch_up_multiplier <= 0.0 || self.follower.max_evasion_duration <= 0.0 {
            return Err(ConfigError::Invalid(
                "catch_up_multiplier and max_evasion_duration must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ---------- Scenario ----------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GroundDef {
    Flat {
        origin: Vec2,
        size: Vec2,
        #[serde(default)]
        height: f32,
    },
    /// Row-major samples, `resolution.x` per row.
    Heights {
        origin: Vec2,
        size: Vec2,
        resolution: UVec2,
        heights: Vec<f32>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainConfig {
    pub ground: GroundDef,
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
}

impl TerrainConfig {
    pub fn build(&self) -> Result<HeightfieldTerrain, ConfigError> {
        let terrain = match &self.ground {
            GroundDef::Flat { origin, size, height } => {
                if size.x <= 0.0 || size.y <= 0.0 {
                    return Err(ConfigError::Invalid("flat terrain size must be positive".into()));
                }
                HeightfieldTerrain::flat(*origin, *size, *height)
            }
            GroundDef::Heights { origin, size, resolution, heights } => {
                HeightfieldTerrain::from_heights(*origin, *size, *resolution, heights.clone())?
            }
        };
        Ok(terrain.with_obstacles(self.obstacles.iter().cloned()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaderConfig {
    pub start: Vec3,
    /// World units per second.
    #[serde(default = "default_leader_speed")]
    pub speed: f32,
    /// Collision-free waypoints, supplied by whatever plans paths.
    pub route: Vec<Vec3>,
}

fn default_leader_speed() -> f32 {
    1.0
}

/// A complete headless run.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub settings: FormationSettings,
    pub leader: LeaderConfig,
    pub terrain: TerrainConfig,
    pub followers: u32,
    /// Place followers into their slots before the first tick.
    #[serde(default = "default_reposition")]
    pub reposition: bool,
    #[serde(default)]
    pub triggers: Vec<FormationTrigger>,
    /// Safety stop for the run.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u32,
}

fn default_reposition() -> bool {
    true
}
fn default_max_ticks() -> u32 {
    10_000
}

impl ScenarioConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_ron(&text)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::de::from_str(text).map_err(|e| ConfigError::Ron(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        if !(self.leader.speed.is_finite() && self.leader.speed > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "leader speed must be positive, got {}",
                self.leader.speed
            )));
        }
        if self.max_ticks == 0 {
            return Err(ConfigError::Invalid("max_ticks cannot be zero".into()));
        }
        for (i, trigger) in self.triggers.iter().enumerate() {
            if trigger.radius <= 0.0 {
                return Err(ConfigError::Invalid(format!("trigger {} has a non-positive radius", i)));
            }
        }
        Ok(())
    }
}

// ---------- Errors ----------

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O while reading scenario: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
