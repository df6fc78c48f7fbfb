// src/lib.rs
//! Leader/follower formation movement for RTS-style groups.

pub mod config;
pub mod formation;
pub mod geometry;
pub mod setup;
pub mod terrain;

pub use config::{ConfigError, FormationSettings, ScenarioConfig};
pub use formation::{FormationPlugin, FormationSim};
