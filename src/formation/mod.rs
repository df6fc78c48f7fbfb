// src/formation/mod.rs
//! Leader/follower formation movement: shapes, leader history, grid points,
//! follower motion and the loop that ties them together.

pub mod components;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod follower;
pub mod grid_point;
pub mod history;
pub mod leader;
pub mod locomotion;
pub mod shape;
pub mod sim;
pub mod triggers;

mod plugin;
mod systems;

pub use components::{FollowerBody, LeaderBody, Locomotion};
pub use coordinator::Formation;
pub use error::FormationError;
pub use events::FormationEvent;
pub use follower::{Follower, FollowerId, FollowerSettings, FollowerStatus, StuckMode};
pub use grid_point::{GridPoint, GridPointId};
pub use history::{LeaderHistory, LeaderSample};
pub use leader::{LeaderMotionSource, LeaderPose, LeaderTracker, WaypointRoute};
pub use locomotion::LocomotionCue;
pub use plugin::FormationPlugin;
pub use shape::{ShapeKind, ShapeSpec, JitterSettings};
pub use sim::FormationSim;
pub use triggers::{FormationTrigger, TriggerAction};
